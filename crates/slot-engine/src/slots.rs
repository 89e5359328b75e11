//! Hourly free-slot grid over working hours.
//!
//! A slot `[HH:00, HH+1:00)` is free unless some occurrence overlaps it with a
//! strict half-open test: an occurrence ending exactly at the slot start, or
//! starting exactly at the slot end, leaves it free.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::cache::AvailabilityCache;
use crate::event::Occurrence;
use crate::fetcher::CalendarFetcher;

/// Free hour labels (`"HH:00"`) keyed by `YYYY-MM-DD`.
pub type AvailabilityGrid = BTreeMap<String, Vec<String>>;

/// UTC working hours, `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl WorkingHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour: end_hour.min(24),
        }
    }

    pub fn hours(&self) -> impl Iterator<Item = u32> {
        self.start_hour..self.end_hour
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self::new(8, 19)
    }
}

/// Bookable dates: `today` and the following `days_ahead - 1` days, minus
/// every `non_working` weekday.
pub fn business_days(today: NaiveDate, days_ahead: u32, non_working: Weekday) -> Vec<NaiveDate> {
    today
        .iter_days()
        .take(days_ahead as usize)
        .filter(|d| d.weekday() != non_working)
        .collect()
}

pub fn hour_label(hour: u32) -> String {
    format!("{:02}:00", hour)
}

/// `[date hour:00, +1h)` in UTC.
pub fn slot_bounds(date: NaiveDate, hour: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc() + Duration::hours(i64::from(hour));
    (start, start + Duration::hours(1))
}

pub fn is_slot_free(occurrences: &[Occurrence], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    !occurrences.iter().any(|o| o.overlaps(start, end))
}

/// Free hour labels on `date`, in ascending order.
pub fn free_hours(date: NaiveDate, occurrences: &[Occurrence], hours: WorkingHours) -> Vec<String> {
    hours
        .hours()
        .filter(|&hour| {
            let (start, end) = slot_bounds(date, hour);
            is_slot_free(occurrences, start, end)
        })
        .map(hour_label)
        .collect()
}

/// Sync `dates` into `cache`, then build the grid from the cached occurrences.
/// Dates without any free hour are left out.
pub async fn compute_availability(
    cache: &AvailabilityCache,
    fetcher: &Arc<CalendarFetcher>,
    dates: &[NaiveDate],
    hours: WorkingHours,
) -> AvailabilityGrid {
    cache.sync(fetcher, dates).await;

    let mut grid = AvailabilityGrid::new();
    for &date in dates {
        let occurrences = cache.get(date).await;
        let free = free_hours(date, &occurrences, hours);
        if !free.is_empty() {
            grid.insert(date.format("%Y-%m-%d").to_string(), free);
        }
    }
    grid
}
