//! # slot-engine
//!
//! Hourly meeting availability over one or more remote calendars.
//!
//! Raw events (one-off and recurring) are fetched concurrently per date and per
//! calendar, expanded into concrete occurrences, cached by date and folded
//! into a grid of free `HH:00` slots inside UTC working hours. Bookings create
//! one event in the remote store and hand back a short cancellation code.
//!
//! ## Modules
//!
//! - [`rule`]: lenient RRULE text → [`RecurrenceRule`]
//! - [`expander`]: event + window → concrete occurrences
//! - [`fetcher`]: parallel per-calendar queries for one day
//! - [`cache`]: date-keyed occurrence cache with bulk `sync`
//! - [`slots`]: free hourly slots within working hours
//! - [`booking`]: booking/cancellation and the code ledger
//! - [`store`]: the calendar store trait and an in-memory store
//! - [`caldav`]: CalDAV store over HTTP
//! - [`ical`]: iCalendar VEVENT parsing and rendering
//! - [`config`]: TOML + environment configuration
//! - [`engine`]: [`SlotEngine`], the facade over all of the above
//! - [`error`]: Error types

pub mod booking;
pub mod cache;
pub mod caldav;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod expander;
pub mod fetcher;
pub mod ical;
pub mod rule;
pub mod slots;
pub mod store;

pub use booking::{BookingLedger, BookingRequest, BookingResponse, BookingService};
pub use cache::{AvailabilityCache, SyncReport};
pub use caldav::CalDavStore;
pub use config::{CalDavConfig, EngineConfig, PathPolicy};
pub use engine::SlotEngine;
pub use error::EngineError;
pub use event::{Event, Occurrence};
pub use expander::{expand_all, expand_event};
pub use fetcher::CalendarFetcher;
pub use rule::{parse_rule, Frequency, RecurrenceRule};
pub use slots::{AvailabilityGrid, WorkingHours};
pub use store::{CalendarStore, CreateOutcome, InMemoryStore};
