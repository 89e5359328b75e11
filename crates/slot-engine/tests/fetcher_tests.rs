//! Tests for the concurrent calendar fetcher.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use slot_engine::fetcher::{day_window, search_window};
use slot_engine::{parse_rule, CalendarFetcher, EngineError, Event, InMemoryStore};

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn hour_event(uid: &str, start: DateTime<Utc>) -> Event {
    Event::new(uid, start, Some(start + Duration::hours(1)))
}

fn fetcher(store: InMemoryStore, calendars: &[&str]) -> CalendarFetcher {
    CalendarFetcher::new(
        Arc::new(store),
        calendars.iter().map(|c| c.to_string()).collect(),
    )
}

fn uids(events: &[Event]) -> Vec<String> {
    let mut uids: Vec<String> = events.iter().map(|e| e.uid.clone()).collect();
    uids.sort();
    uids
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

#[test]
fn day_window_is_24_hours_from_midnight() {
    let (start, end) = day_window(date(2024, 6, 3));
    assert_eq!(start, at(2024, 6, 3, 0));
    assert_eq!(end, at(2024, 6, 4, 0));
}

#[test]
fn search_window_pads_a_year_each_side() {
    let (start, end) = search_window(date(2024, 6, 3));
    assert_eq!(start, at(2023, 6, 3, 0));
    assert_eq!(end, at(2025, 6, 4, 0));
}

// ---------------------------------------------------------------------------
// Merging and partial failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_from_all_calendars_are_merged() {
    let store = InMemoryStore::new()
        .with_calendar("work", vec![hour_event("w1", at(2024, 6, 3, 10))])
        .with_calendar("home", vec![hour_event("h1", at(2024, 6, 3, 15))]);
    let fetcher = fetcher(store, &["work", "home"]);

    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();
    assert_eq!(uids(&occurrences), vec!["h1", "w1"]);
}

#[tokio::test]
async fn surviving_calendar_wins_over_failures() {
    let store = InMemoryStore::new()
        .with_calendar("ok", vec![hour_event("kept", at(2024, 6, 3, 10))])
        .with_failing_calendar("down-1")
        .with_failing_calendar("down-2");
    let fetcher = fetcher(store, &["down-1", "ok", "down-2"]);

    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();
    assert_eq!(uids(&occurrences), vec!["kept"]);
}

#[tokio::test]
async fn all_calendars_failing_is_an_error() {
    let store = InMemoryStore::new()
        .with_failing_calendar("a")
        .with_failing_calendar("b");
    let fetcher = fetcher(store, &["a", "b"]);

    let err = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap_err();
    assert!(matches!(err, EngineError::Fetch { .. }));
}

#[tokio::test]
async fn failure_with_empty_survivor_is_an_error() {
    let store = InMemoryStore::new()
        .with_calendar("empty", vec![])
        .with_failing_calendar("down");
    let fetcher = fetcher(store, &["empty", "down"]);

    assert!(fetcher.fetch_raw(date(2024, 6, 3)).await.is_err());
}

#[tokio::test]
async fn all_calendars_empty_is_ok() {
    let store = InMemoryStore::new()
        .with_calendar("a", vec![])
        .with_calendar("b", vec![]);
    let fetcher = fetcher(store, &["a", "b"]);

    assert!(fetcher.fetch_day(date(2024, 6, 3)).await.unwrap().is_empty());
}

#[tokio::test]
async fn no_calendars_configured_is_ok_and_empty() {
    let fetcher = fetcher(InMemoryStore::new(), &[]);
    assert!(fetcher.fetch_day(date(2024, 6, 3)).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Expansion against the target day
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recurring_master_is_expanded_onto_the_day() {
    let standup = hour_event("standup", at(2024, 1, 8, 9))
        .with_rule(parse_rule("FREQ=DAILY").unwrap());
    let store = InMemoryStore::new().with_calendar("work", vec![standup]);
    let fetcher = fetcher(store, &["work"]);

    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].start, at(2024, 6, 3, 9));
    assert_eq!(occurrences[0].end, at(2024, 6, 3, 10));
}

#[tokio::test]
async fn raw_fetch_returns_neighbouring_days_that_expansion_drops() {
    let store = InMemoryStore::new().with_calendar(
        "work",
        vec![
            hour_event("today", at(2024, 6, 3, 10)),
            hour_event("tomorrow", at(2024, 6, 4, 10)),
            hour_event("next-year", at(2025, 5, 1, 10)),
        ],
    );
    let fetcher = fetcher(store, &["work"]);

    let raw = fetcher.fetch_raw(date(2024, 6, 3)).await.unwrap();
    assert_eq!(uids(&raw), vec!["next-year", "today", "tomorrow"]);

    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();
    assert_eq!(uids(&occurrences), vec!["today"]);
}

// ---------------------------------------------------------------------------
// Timeouts and concurrency
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_calendar_times_out_and_is_skipped() {
    let store = InMemoryStore::new()
        .with_calendar("fast", vec![hour_event("fast", at(2024, 6, 3, 10))])
        .with_calendar("slow", vec![hour_event("slow", at(2024, 6, 3, 11))])
        .with_latency("slow", StdDuration::from_secs(60));
    let fetcher = fetcher(store, &["fast", "slow"]).with_timeout(StdDuration::from_secs(1));

    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();
    assert_eq!(uids(&occurrences), vec!["fast"]);
}

#[tokio::test(start_paused = true)]
async fn calendars_are_queried_concurrently() {
    let delay = StdDuration::from_secs(5);
    let store = InMemoryStore::new()
        .with_calendar("a", vec![hour_event("a", at(2024, 6, 3, 9))])
        .with_calendar("b", vec![hour_event("b", at(2024, 6, 3, 10))])
        .with_calendar("c", vec![hour_event("c", at(2024, 6, 3, 11))])
        .with_latency("a", delay)
        .with_latency("b", delay)
        .with_latency("c", delay);
    let fetcher = fetcher(store, &["a", "b", "c"]).with_timeout(StdDuration::from_secs(8));

    let started = tokio::time::Instant::now();
    let occurrences = fetcher.fetch_day(date(2024, 6, 3)).await.unwrap();

    assert_eq!(occurrences.len(), 3);
    // Sequential queries would need 15s and trip the 8s timeout.
    assert!(started.elapsed() < StdDuration::from_secs(8));
}
