//! Recurrence expansion -- turns events into concrete occurrences inside a window.
//!
//! Expansion walks forward from the event's own start one candidate at a time,
//! so rules anchored long before the window still land on the right days.
//! Clipping is on occurrence *start*: an occurrence that begins before the
//! window but runs into it is not returned, one that begins inside the window
//! and runs past its end is.
//!
//! MONTHLY and YEARLY rules count months from the event's start and clamp to
//! the end of short months: a rule starting Jan 31 lands on Feb 29 and then
//! Mar 31, never on Mar 2. A step that would leave chrono's date range ends
//! the expansion.

use chrono::{DateTime, Datelike, Duration, Months, Utc, Weekday};

use crate::event::{Event, Occurrence};
use crate::rule::{Frequency, RecurrenceRule};

/// Safety valve for rules that never leave the window or never advance.
pub const MAX_ITERATIONS: usize = 1000;

/// Expand one event into its occurrences whose start lies in `[window_start, window_end)`.
///
/// Non-recurring events yield themselves at most once. Recurring events stop at
/// the first of: COUNT emitted occurrences, a candidate after UNTIL, a candidate
/// after `window_end`, a candidate that fails to advance, or [`MAX_ITERATIONS`].
pub fn expand_event(
    event: &Event,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Occurrence> {
    let in_window = |t: DateTime<Utc>| t >= window_start && t < window_end;

    let Some(rule) = &event.rule else {
        return if in_window(event.start) {
            vec![event.clone()]
        } else {
            Vec::new()
        };
    };

    let mut occurrences = Vec::new();
    let mut current = event.start;
    let mut emitted: u32 = 0;

    for step in 1..=MAX_ITERATIONS {
        if rule.count > 0 && emitted >= rule.count {
            break;
        }
        if rule.until.is_some_and(|until| current > until) {
            break;
        }
        if current > window_end {
            break;
        }

        if in_window(current) {
            occurrences.push(event.occurrence_at(current));
            emitted += 1;
        }

        match next_start(rule, event.start, current, step) {
            Some(next) if next > current => current = next,
            _ => break,
        }
    }

    occurrences
}

/// Expand every event against the same window and concatenate the results.
pub fn expand_all(
    events: &[Event],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Occurrence> {
    events
        .iter()
        .flat_map(|event| expand_event(event, window_start, window_end))
        .collect()
}

/// Candidate start after `current`, or `None` once the step leaves the
/// representable range.
///
/// `step` is the 1-based index of the candidate being produced. MONTHLY and
/// YEARLY count whole months from `anchor` and clamp to the month's last day,
/// so Jan 31 steps to Feb 29 then Mar 31 rather than rolling over into March.
fn next_start(
    rule: &RecurrenceRule,
    anchor: DateTime<Utc>,
    current: DateTime<Utc>,
    step: usize,
) -> Option<DateTime<Utc>> {
    let interval = rule.interval.max(1);
    match rule.frequency {
        Frequency::Daily => add_days(current, i64::from(interval)),
        Frequency::Weekly if rule.by_day.is_empty() => add_weeks(current, interval),
        Frequency::Weekly => next_weekly_by_day(current, &rule.by_day, interval),
        Frequency::Monthly => add_months(anchor, u32::try_from(step).ok()?.checked_mul(interval)?),
        Frequency::Yearly => add_months(
            anchor,
            u32::try_from(step).ok()?.checked_mul(interval)?.checked_mul(12)?,
        ),
        Frequency::Unknown(_) => None,
    }
}

fn add_months(anchor: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    anchor.checked_add_months(Months::new(months))
}

fn add_days(t: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    t.checked_add_signed(Duration::try_days(days)?)
}

fn add_weeks(t: DateTime<Utc>, weeks: u32) -> Option<DateTime<Utc>> {
    t.checked_add_signed(Duration::try_weeks(i64::from(weeks))?)
}

/// Next day after `current` whose weekday is in `by_day`; falls back to
/// `interval` whole weeks.
fn next_weekly_by_day(
    current: DateTime<Utc>,
    by_day: &[Weekday],
    interval: u32,
) -> Option<DateTime<Utc>> {
    // Every weekday occurs within seven days.
    let mut next = current;
    for _ in 0..7 {
        next = add_days(next, 1)?;
        if by_day.contains(&next.weekday()) {
            return Some(next);
        }
    }
    add_weeks(current, interval)
}
