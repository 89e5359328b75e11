//! Concurrent per-calendar fetch for one target day.
//!
//! Every configured calendar is queried in its own task over a window padded a
//! year each side of the day, so recurring masters anchored far away are still
//! returned. The raw events are then expanded against the day itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Months, NaiveDate, Utc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::event::{Event, Occurrence};
use crate::expander;
use crate::store::CalendarStore;

/// Padding applied on each side of the target day when querying.
pub const SEARCH_PADDING: Months = Months::new(12);

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// `[00:00, 00:00 + 24h)` of `day` in UTC.
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::hours(24))
}

/// The day window widened by [`SEARCH_PADDING`] on both sides.
pub fn search_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start, end) = day_window(day);
    (
        start.checked_sub_months(SEARCH_PADDING).unwrap_or(start),
        end.checked_add_months(SEARCH_PADDING).unwrap_or(end),
    )
}

/// Queries a fixed set of calendars in parallel.
pub struct CalendarFetcher {
    store: Arc<dyn CalendarStore>,
    calendars: Vec<String>,
    timeout: Duration,
}

impl CalendarFetcher {
    pub fn new(store: Arc<dyn CalendarStore>, calendars: Vec<String>) -> Self {
        Self {
            store,
            calendars,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn calendars(&self) -> &[String] {
        &self.calendars
    }

    /// Raw (unexpanded) events for `day` from all calendars.
    ///
    /// Failed or timed-out calendars are logged and skipped. An error is
    /// returned only when no events were collected and at least one calendar
    /// failed.
    pub async fn fetch_raw(&self, day: NaiveDate) -> Result<Vec<Event>> {
        let (start, end) = search_window(day);
        let mut tasks = JoinSet::new();

        for calendar in &self.calendars {
            let store = Arc::clone(&self.store);
            let calendar = calendar.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(
                    timeout,
                    store.query_events(&calendar, start, end),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Fetch {
                        calendar: calendar.clone(),
                        reason: format!("timed out after {:?}", timeout),
                    }),
                };
                (calendar, result)
            });
        }

        let mut events = Vec::new();
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((calendar, Ok(found))) => {
                    debug!("Calendar {} returned {} events for {}", calendar, found.len(), day);
                    events.extend(found);
                    continue;
                }
                Ok((calendar, Err(e))) => {
                    warn!("Error querying calendar {}: {}", calendar, e);
                    e
                }
                Err(e) => {
                    warn!("Calendar query task failed: {}", e);
                    EngineError::Fetch {
                        calendar: "<task>".to_string(),
                        reason: e.to_string(),
                    }
                }
            };
            first_error.get_or_insert(failure);
        }

        match first_error {
            Some(e) if events.is_empty() => Err(e),
            _ => Ok(events),
        }
    }

    /// Occurrences starting on `day` across all calendars.
    pub async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Occurrence>> {
        let raw = self.fetch_raw(day).await?;
        let (start, end) = day_window(day);
        let occurrences = expander::expand_all(&raw, start, end);
        debug!(
            "Loaded {} raw events, expanded to {} occurrences for {}",
            raw.len(),
            occurrences.len(),
            day
        );
        Ok(occurrences)
    }
}
