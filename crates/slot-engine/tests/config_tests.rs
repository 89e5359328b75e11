//! Tests for configuration loading, environment overrides and validation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Weekday;
use slot_engine::{EngineConfig, EngineError, PathPolicy, WorkingHours};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

// ---------------------------------------------------------------------------
// Defaults and TOML
// ---------------------------------------------------------------------------

#[test]
fn defaults_match_documented_values() {
    let config = EngineConfig::default();
    assert_eq!(config.days_available, 28);
    assert_eq!(config.working_hours(), WorkingHours::new(8, 19));
    assert_eq!(config.non_working_weekday().unwrap(), Weekday::Sun);
    assert_eq!(config.path_policy, PathPolicy::Lenient);
    assert_eq!(config.caldav.timeout(), Duration::from_secs(10));
    assert!(config.caldav.calendars().is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn toml_overrides_only_what_it_names() {
    let config = EngineConfig::from_toml_str(
        r#"
        days_available = 14
        path_policy = "strict"

        [caldav]
        server_url = "https://dav.example.com/"
        calendar = "/calendars/alex/work/"
        additional_calendars = ["/calendars/alex/home/", "  "]
        "#,
    )
    .unwrap();

    assert_eq!(config.days_available, 14);
    assert_eq!(config.work_start_hour, 8);
    assert_eq!(config.path_policy, PathPolicy::Strict);
    assert_eq!(config.caldav.timeout_secs, 10);
    assert_eq!(
        config.caldav.calendars(),
        vec!["/calendars/alex/work/", "/calendars/alex/home/"]
    );
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = EngineConfig::from_toml_str("days_available = \"lots\"").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = EngineConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[test]
fn environment_wins_over_file_values() {
    let mut config = EngineConfig::from_toml_str("days_available = 14\nwork_end_hour = 17").unwrap();
    config.apply_env(env(&[
        ("DAYS_AVAILABLE", "7"),
        ("WORKDAY_START", "9"),
        ("CALDAV_SERVER_URL", "https://dav.example.com"),
        ("CALDAV_USERNAME", "alex"),
        ("CALDAV_PASSWORD", "secret"),
        ("CALDAV_CALENDAR", "/cal/main/"),
        ("CALDAV_ADDITIONAL_CALENDARS", "/cal/a/, /cal/b/ ,"),
        ("CALDAV_TIMEOUT_SECS", "3"),
        ("NON_WORKING_DAY", "sa"),
        ("STRICT_CALENDAR_PATH", "true"),
    ]));

    assert_eq!(config.days_available, 7);
    assert_eq!(config.working_hours(), WorkingHours::new(9, 17));
    assert_eq!(config.caldav.username, "alex");
    assert_eq!(config.caldav.calendars(), vec!["/cal/main/", "/cal/a/", "/cal/b/"]);
    assert_eq!(config.caldav.timeout(), Duration::from_secs(3));
    assert_eq!(config.non_working_weekday().unwrap(), Weekday::Sat);
    assert_eq!(config.path_policy, PathPolicy::Strict);
}

#[test]
fn unparsable_integers_keep_previous_value() {
    let mut config = EngineConfig::default();
    config.apply_env(env(&[
        ("DAYS_AVAILABLE", "a month"),
        ("WORKDAY_START", "-1"),
        ("WORKDAY_END", ""),
    ]));
    assert_eq!(config.days_available, 28);
    assert_eq!(config.working_hours(), WorkingHours::new(8, 19));
}

#[test]
fn strict_flag_accepts_only_truthy_values() {
    let mut config = EngineConfig::default();
    config.apply_env(env(&[("STRICT_CALENDAR_PATH", "no")]));
    assert_eq!(config.path_policy, PathPolicy::Lenient);
    config.apply_env(env(&[("STRICT_CALENDAR_PATH", "1")]));
    assert_eq!(config.path_policy, PathPolicy::Strict);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn inverted_hours_are_rejected() {
    let config = EngineConfig {
        work_start_hour: 19,
        work_end_hour: 8,
        ..EngineConfig::default()
    };
    assert!(matches!(config.validate(), Err(EngineError::Config(_))));
}

#[test]
fn end_past_midnight_is_rejected() {
    let config = EngineConfig {
        work_end_hour: 25,
        ..EngineConfig::default()
    };
    assert!(matches!(config.validate(), Err(EngineError::Config(_))));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut config = EngineConfig::default();
    config.caldav.timeout_secs = 0;
    assert!(matches!(config.validate(), Err(EngineError::Config(_))));
}

#[test]
fn unknown_weekday_code_is_rejected() {
    let config = EngineConfig {
        non_working_day: "Sunday".to_string(),
        ..EngineConfig::default()
    };
    assert!(matches!(config.validate(), Err(EngineError::Config(_))));
}
