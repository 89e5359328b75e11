//! The remote calendar store seen by the engine, plus an in-memory implementation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::event::Event;

/// Result of a create call that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The store acknowledged the new object.
    Confirmed,
    /// The request went out but no acknowledgement came back.
    Unconfirmed,
}

/// Request/response access to a calendar server.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Raw events of `calendar` relevant to `[start, end)`. Recurring events
    /// are returned unexpanded.
    async fn query_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Collection path new bookings are written under, or `None` when the
    /// server exposes no calendar.
    async fn resolve_calendar_path(&self) -> Result<Option<String>>;

    async fn create_event(&self, path: &str, event: &Event) -> Result<CreateOutcome>;

    async fn delete_event(&self, path: &str) -> Result<()>;
}

/// Store backed by process memory. Used for offline runs and tests; supports
/// injected failures and latency per calendar.
pub struct InMemoryStore {
    calendars: RwLock<HashMap<String, Vec<Event>>>,
    objects: RwLock<BTreeMap<String, Event>>,
    failing: HashSet<String>,
    latency: HashMap<String, Duration>,
    calendar_path: Option<String>,
    path_lookup_fails: bool,
    create_outcome: Option<CreateOutcome>,
    delete_fails: bool,
    queries: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            calendars: RwLock::new(HashMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            failing: HashSet::new(),
            latency: HashMap::new(),
            calendar_path: Some("/calendars/default/".to_string()),
            path_lookup_fails: false,
            create_outcome: Some(CreateOutcome::Confirmed),
            delete_fails: false,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_calendar(mut self, name: impl Into<String>, events: Vec<Event>) -> Self {
        self.calendars.get_mut().insert(name.into(), events);
        self
    }

    /// Every query against `name` fails.
    pub fn with_failing_calendar(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Every query against `name` sleeps for `delay` first.
    pub fn with_latency(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.latency.insert(name.into(), delay);
        self
    }

    pub fn with_calendar_path(mut self, path: Option<String>) -> Self {
        self.calendar_path = path;
        self
    }

    pub fn with_failing_path_lookup(mut self) -> Self {
        self.path_lookup_fails = true;
        self
    }

    /// `None` makes every create fail.
    pub fn with_create_outcome(mut self, outcome: Option<CreateOutcome>) -> Self {
        self.create_outcome = outcome;
        self
    }

    pub fn with_failing_deletes(mut self) -> Self {
        self.delete_fails = true;
        self
    }

    /// Replace the contents of a calendar while the store is shared.
    pub async fn set_events(&self, calendar: &str, events: Vec<Event>) {
        self.calendars
            .write()
            .await
            .insert(calendar.to_string(), events);
    }

    /// Object created at `path` through [`CalendarStore::create_event`].
    pub async fn object(&self, path: &str) -> Option<Event> {
        self.objects.read().await.get(path).cloned()
    }

    pub async fn object_paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Number of `query_events` calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Like a CalDAV time-range filter: recurring masters always match.
fn matches_range(event: &Event, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    event.rule.is_some() || event.overlaps(start, end)
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn query_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.latency.get(calendar) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(calendar) {
            return Err(EngineError::Fetch {
                calendar: calendar.to_string(),
                reason: "calendar unavailable".to_string(),
            });
        }

        let mut events: Vec<Event> = self
            .calendars
            .read()
            .await
            .get(calendar)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| matches_range(e, start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let objects = self.objects.read().await;
        events.extend(
            objects
                .iter()
                .filter(|(path, e)| path.starts_with(calendar) && matches_range(e, start, end))
                .map(|(_, e)| e.clone()),
        );

        Ok(events)
    }

    async fn resolve_calendar_path(&self) -> Result<Option<String>> {
        if self.path_lookup_fails {
            return Err(EngineError::Fetch {
                calendar: "*".to_string(),
                reason: "calendar discovery failed".to_string(),
            });
        }
        Ok(self.calendar_path.clone())
    }

    async fn create_event(&self, path: &str, event: &Event) -> Result<CreateOutcome> {
        let Some(outcome) = self.create_outcome else {
            return Err(EngineError::RemoteMutation(format!(
                "store rejected object {}",
                path
            )));
        };
        self.objects
            .write()
            .await
            .insert(path.to_string(), event.clone());
        Ok(outcome)
    }

    async fn delete_event(&self, path: &str) -> Result<()> {
        if self.delete_fails {
            return Err(EngineError::RemoteMutation(format!(
                "store refused to delete {}",
                path
            )));
        }
        self.objects.write().await.remove(path);
        Ok(())
    }
}
