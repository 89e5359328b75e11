//! Calendar events and their concrete occurrences.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::rule::RecurrenceRule;

/// Properties the engine carries but never interprets (SUMMARY, DESCRIPTION,
/// STATUS, ...). Values are unescaped text.
pub type Properties = BTreeMap<String, String>;

/// A calendar event as fetched from a store, possibly recurring.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub uid: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rule: Option<RecurrenceRule>,
    pub properties: Properties,
}

/// One concrete instance of an [`Event`] inside an expansion window.
///
/// Occurrences are independent copies: changing one never touches its source
/// or its siblings.
pub type Occurrence = Event;

/// Length assumed for events that carry no end.
pub fn default_duration() -> Duration {
    Duration::hours(1)
}

impl Event {
    /// Create an event; a missing `end` defaults to one hour after `start`.
    pub fn new(uid: impl Into<String>, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            uid: uid.into(),
            start,
            end: end.unwrap_or_else(|| saturating_add(start, default_duration())),
            rule: None,
            properties: Properties::new(),
        }
    }

    pub fn with_rule(mut self, rule: RecurrenceRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn summary(&self) -> Option<&str> {
        self.property("SUMMARY")
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    /// Half-open overlap with `[start, end)`; touching intervals do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    /// Copy of this event moved to `start`, keeping its duration.
    pub fn occurrence_at(&self, start: DateTime<Utc>) -> Occurrence {
        let duration = self.duration();
        Event {
            start,
            end: saturating_add(start, duration),
            ..self.clone()
        }
    }
}

fn saturating_add(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
