//! Lenient RRULE parsing.
//!
//! Only the subset the expander understands is extracted: FREQ, INTERVAL,
//! COUNT, UNTIL and BYDAY. A malformed field falls back to its default instead
//! of rejecting the whole rule, so one bad value never drops an event.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};

/// Recurrence frequency. Unrecognised FREQ values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Unknown(String),
}

impl Frequency {
    fn from_value(value: &str) -> Self {
        match value {
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            "YEARLY" => Frequency::Yearly,
            other => Frequency::Unknown(other.to_string()),
        }
    }
}

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Always >= 1.
    pub interval: u32,
    /// 0 means unbounded.
    pub count: u32,
    pub until: Option<DateTime<Utc>>,
    /// Weekday filter for WEEKLY rules, in rule order without duplicates.
    pub by_day: Vec<Weekday>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            frequency: Frequency::Unknown(String::new()),
            interval: 1,
            count: 0,
            until: None,
            by_day: Vec::new(),
        }
    }
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_by_day(mut self, days: &[Weekday]) -> Self {
        self.by_day.clear();
        for day in days {
            if !self.by_day.contains(day) {
                self.by_day.push(*day);
            }
        }
        self
    }

    /// Render back to `FREQ=...;...` form (without the `RRULE:` tag).
    pub fn to_rrule_string(&self) -> String {
        let freq = match &self.frequency {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
            Frequency::Unknown(raw) => raw.as_str(),
        };
        let mut parts = vec![format!("FREQ={}", freq)];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if self.count > 0 {
            parts.push(format!("COUNT={}", self.count));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
        }
        if !self.by_day.is_empty() {
            let days: Vec<&str> = self.by_day.iter().map(|d| weekday_code(*d)).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        parts.join(";")
    }
}

/// Parse a recurrence rule such as `RRULE:FREQ=WEEKLY;BYDAY=MO,WE`.
///
/// Returns `None` for empty input: the event is then treated as non-recurring.
/// Unknown keys are ignored and malformed values keep their defaults.
pub fn parse_rule(text: &str) -> Option<RecurrenceRule> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let body = text.strip_prefix("RRULE:").unwrap_or(text);

    let mut rule = RecurrenceRule::default();
    for part in body.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "FREQ" => rule.frequency = Frequency::from_value(value),
            "INTERVAL" => {
                if let Ok(interval) = value.parse::<u32>() {
                    if interval >= 1 {
                        rule.interval = interval;
                    }
                }
            }
            "COUNT" => {
                if let Ok(count) = value.parse::<u32>() {
                    rule.count = count;
                }
            }
            "UNTIL" => rule.until = parse_until(value),
            "BYDAY" => {
                let days: Vec<Weekday> = value.split(',').filter_map(weekday_from_code).collect();
                rule = rule.with_by_day(&days);
            }
            _ => {}
        }
    }

    Some(rule)
}

/// UNTIL accepts a UTC timestamp (`20241231T235959Z`) or a bare date (`20241231`).
fn parse_until(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Map a two-letter weekday code (case-insensitive) to a [`Weekday`].
pub fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code.trim().to_ascii_uppercase().as_str() {
        "SU" => Some(Weekday::Sun),
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "SU",
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
    }
}
