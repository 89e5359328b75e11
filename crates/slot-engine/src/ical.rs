//! VEVENT mapping on top of the `icalendar` crate.
//!
//! The crate handles line unfolding, parameters and nested components. This
//! module keeps what the engine needs (UID, DTSTART, DTEND/DURATION, RRULE),
//! normalises every date-time to UTC and stores the remaining top-level
//! VEVENT properties in the event's property bag.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, Component, Property};
use tracing::{debug, warn};

use crate::event::{Event, Properties};
use crate::rule;

const HANDLED: &[&str] = &["UID", "DTSTART", "DTEND", "DURATION", "RRULE", "DTSTAMP"];

/// Parse every VEVENT in an iCalendar document. VEVENTs without a usable
/// DTSTART are skipped; a document the parser rejects yields nothing.
pub fn parse_calendar(text: &str) -> Vec<Event> {
    let calendar: Calendar = match text.parse() {
        Ok(calendar) => calendar,
        Err(e) => {
            warn!("Skipping unparseable iCalendar document: {}", e);
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(vevent) => {
                let event = parse_event(vevent);
                if event.is_none() {
                    debug!("Skipping VEVENT without a usable DTSTART");
                }
                event
            }
            _ => None,
        })
        .collect()
}

fn parse_event(vevent: &icalendar::Event) -> Option<Event> {
    let mut uid = String::new();
    let mut start = None;
    let mut end = None;
    let mut duration = None;
    let mut rule_text = None;
    let mut properties = Properties::new();

    let singles = vevent.properties().values();
    let multis = vevent.multi_properties().values().flatten();
    for prop in singles.chain(multis) {
        let name = prop.key().to_ascii_uppercase();
        match name.as_str() {
            "UID" => uid = prop.value().trim().to_string(),
            "DTSTART" => start = parse_date_time(prop),
            "DTEND" => end = parse_date_time(prop),
            "DURATION" => duration = parse_duration(prop.value()),
            "RRULE" => rule_text = Some(prop.value().to_string()),
            handled if HANDLED.contains(&handled) => {}
            other => {
                properties
                    .entry(other.to_string())
                    .or_insert_with(|| unescape(prop.value()));
            }
        }
    }

    let start = start?;
    let end = end.or_else(|| duration.and_then(|d| start.checked_add_signed(d)));

    let mut event = Event::new(uid, start, end);
    event.rule = rule_text.as_deref().and_then(rule::parse_rule);
    event.properties = properties;
    Some(event)
}

fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params()
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, p)| p.value().trim_matches('"'))
}

/// DTSTART/DTEND in any of the three RFC 5545 forms, as UTC.
fn parse_date_time(prop: &Property) -> Option<DateTime<Utc>> {
    let value = prop.value().trim();

    if param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'))
    {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| dt.and_utc());
    }

    let local = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match param(prop, "TZID").map(str::parse::<Tz>) {
        Some(Ok(tz)) => tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Err(_)) => {
            debug!("Unknown TZID on {}, reading {} as UTC", prop.key(), value);
            Some(local.and_utc())
        }
        None => Some(local.and_utc()),
    }
}

/// `P1W`, `P2D`, `PT1H30M`, `P1DT2H` and friends. Negative durations and
/// values outside chrono's range are rejected.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    let body = text.strip_prefix('P')?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut seen_unit = false;

    for c in body.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => None,
                }?;
                total = total.checked_add(&part)?;
                seen_unit = true;
            }
        }
    }

    (seen_unit && number.is_empty()).then_some(total)
}

/// TEXT unescaping (`\n`, `\,`, `\;`, `\\`).
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Render `event` as a standalone VCALENDAR document.
pub fn render_event(event: &Event) -> String {
    let mut vevent = icalendar::Event::new();
    vevent
        .uid(&event.uid)
        .add_property("DTSTAMP", format_utc(Utc::now()))
        .add_property("DTSTART", format_utc(event.start))
        .add_property("DTEND", format_utc(event.end));
    if let Some(rule) = &event.rule {
        vevent.add_property("RRULE", rule.to_rrule_string());
    }
    for (name, value) in &event.properties {
        vevent.add_property(name, escape(value));
    }

    let mut calendar = Calendar::new();
    calendar.push(vevent);
    calendar.to_string()
}
