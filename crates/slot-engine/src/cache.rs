//! Date-keyed occurrence cache refreshed in bulk.
//!
//! `sync` fans out one task per date, joins them all, then writes every
//! successful date under a single write-lock acquisition. No lock is held while
//! the store is being queried. Dates whose fetch failed keep their previous
//! entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::Result;
use crate::event::Occurrence;
use crate::fetcher::CalendarFetcher;

/// Outcome of one [`AvailabilityCache::sync`] round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Dates whose entry was replaced, ascending.
    pub refreshed: Vec<NaiveDate>,
    /// Dates that kept their previous entry, with the failure reason.
    pub failed: Vec<(NaiveDate, String)>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct AvailabilityCache {
    entries: RwLock<HashMap<NaiveDate, Vec<Occurrence>>>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh `dates` from `fetcher`. Never fails; per-date errors are logged
    /// and reported.
    pub async fn sync(&self, fetcher: &Arc<CalendarFetcher>, dates: &[NaiveDate]) -> SyncReport {
        let fetcher = Arc::clone(fetcher);
        self.sync_with(dates, move |date| {
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch_day(date).await }
        })
        .await
    }

    async fn sync_with<F, Fut>(&self, dates: &[NaiveDate], fetch: F) -> SyncReport
    where
        F: Fn(NaiveDate) -> Fut,
        Fut: Future<Output = Result<Vec<Occurrence>>> + Send + 'static,
    {
        let mut pending: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        let mut tasks = JoinSet::new();

        for &date in &pending {
            let fetched = fetch(date);
            tasks.spawn(async move { (date, fetched.await) });
        }

        let mut fetched = Vec::new();
        let mut report = SyncReport::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((date, Ok(mut occurrences))) => {
                    pending.remove(&date);
                    occurrences.sort_by(|a, b| {
                        (a.start, a.end, &a.uid).cmp(&(b.start, b.end, &b.uid))
                    });
                    fetched.push((date, occurrences));
                }
                Ok((date, Err(e))) => {
                    pending.remove(&date);
                    warn!("Error loading events for date {}: {}", date, e);
                    report.failed.push((date, e.to_string()));
                }
                Err(e) => warn!("Date sync task failed: {}", e),
            }
        }

        // Whatever is still pending belongs to a task that panicked or was cancelled.
        for date in pending {
            report.failed.push((date, "sync task did not complete".to_string()));
        }

        {
            let mut entries = self.entries.write().await;
            for (date, occurrences) in fetched {
                entries.insert(date, occurrences);
                report.refreshed.push(date);
            }
        }

        report.refreshed.sort();
        report.failed.sort();
        info!(
            "Synced {} dates ({} failed)",
            report.refreshed.len(),
            report.failed.len()
        );
        report
    }

    /// Cached occurrences for `date`; empty when the date was never synced.
    pub async fn get(&self, date: NaiveDate) -> Vec<Occurrence> {
        self.entries
            .read()
            .await
            .get(&date)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn contains(&self, date: NaiveDate) -> bool {
        self.entries.read().await.contains_key(&date)
    }

    /// Ordered copy of the whole cache.
    pub async fn snapshot(&self) -> BTreeMap<NaiveDate, Vec<Occurrence>> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(date, occurrences)| (*date, occurrences.clone()))
            .collect()
    }
}
