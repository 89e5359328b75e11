//! `slots` CLI: expand recurring events, list free hourly slots and book them.
//!
//! ## Usage
//!
//! ```sh
//! # Occurrences of every event in a file over a date range
//! slots expand -i work.ics --from 2024-06-03 --to 2024-06-09
//!
//! # Free slots from offline calendars (one calendar per file)
//! slots available --ics work.ics --ics home.ics --today 2024-06-03
//!
//! # Free slots from the CalDAV server in config / environment
//! slots available --config slots.toml
//!
//! # Book a slot
//! slots book --date 2024-06-03 --time 14:00 --topic "Intro" --name "Sam" --contact sam@example.com
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for per-calendar detail. A `.env`
//! file in the working directory is loaded first, so it may set `RUST_LOG` too.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use slot_engine::fetcher::day_window;
use slot_engine::{
    ical, BookingRequest, BookingResponse, CalDavStore, CalendarStore, EngineConfig,
    InMemoryStore, Occurrence, SlotEngine,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "slots",
    version,
    about = "Hourly meeting availability and bookings over CalDAV"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand every event in an iCalendar file over a date range
    Expand {
        /// Input .ics file
        #[arg(short, long)]
        input: PathBuf,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },
    /// Print free hourly slots for every bookable date
    Available {
        /// Offline calendar file; repeat for several calendars
        #[arg(long = "ics")]
        ics: Vec<PathBuf>,
        /// First bookable date (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// TOML configuration file
        #[arg(short, long, env = "SLOTS_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Book one hourly slot
    Book {
        /// Slot date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Slot start, UTC (HH:MM)
        #[arg(long)]
        time: String,
        #[arg(long)]
        topic: String,
        /// Full name of the person booking
        #[arg(long)]
        name: String,
        /// Email address or phone number
        #[arg(long)]
        contact: String,
        /// Book against offline calendars instead of CalDAV
        #[arg(long = "ics")]
        ics: Vec<PathBuf>,
        /// TOML configuration file
        #[arg(short, long, env = "SLOTS_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// JSON shape of one expanded occurrence.
#[derive(Serialize)]
struct OccurrenceOut<'a> {
    uid: &'a str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
}

impl<'a> From<&'a Occurrence> for OccurrenceOut<'a> {
    fn from(o: &'a Occurrence) -> Self {
        Self {
            uid: &o.uid,
            start: o.start,
            end: o.end,
            summary: o.summary(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before the subscriber so RUST_LOG can come from `.env`.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Expand { input, from, to } => {
            if to < from {
                anyhow::bail!("--to ({}) is before --from ({})", to, from);
            }
            let text = read_file(&input)?;
            let events = ical::parse_calendar(&text);
            let (start, _) = day_window(from);
            let (_, end) = day_window(to);

            let mut occurrences = slot_engine::expand_all(&events, start, end);
            occurrences.sort_by(|a, b| (a.start, &a.uid).cmp(&(b.start, &b.uid)));
            let out: Vec<OccurrenceOut<'_>> = occurrences.iter().map(OccurrenceOut::from).collect();
            print_json(&out)?;
        }
        Commands::Available { ics, today, config } => {
            let config = EngineConfig::load(config.as_deref()).context("Failed to load configuration")?;
            let engine = build_engine(config, &ics).await?;
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let grid = engine
                .available_slots_from(today)
                .await
                .context("Failed to compute availability")?;
            print_json(&grid)?;
        }
        Commands::Book {
            date,
            time,
            topic,
            name,
            contact,
            ics,
            config,
        } => {
            let config = EngineConfig::load(config.as_deref()).context("Failed to load configuration")?;
            let engine = build_engine(config, &ics).await?;
            let request = BookingRequest {
                date,
                time,
                topic,
                full_name: name,
                contact_info: contact,
            };
            let response = BookingResponse::from(engine.book(&request).await);
            print_json(&response)?;
            if !response.success {
                process::exit(1);
            }
        }
    }

    Ok(())
}

/// Engine over offline `.ics` calendars when any are given, CalDAV otherwise.
async fn build_engine(mut config: EngineConfig, ics: &[PathBuf]) -> Result<SlotEngine> {
    let store: Arc<dyn CalendarStore> = if ics.is_empty() {
        if config.caldav.server_url.trim().is_empty() {
            anyhow::bail!("No calendars: pass --ics FILE or set CALDAV_SERVER_URL");
        }
        let store = CalDavStore::connect(config.caldav.clone())
            .await
            .context("Failed to connect to the CalDAV server")?;
        Arc::new(store)
    } else {
        let (store, names) = offline_store(ics)?;
        config.caldav.calendar = String::new();
        config.caldav.additional_calendars = names;
        Arc::new(store)
    };

    SlotEngine::new(config, store).context("Invalid configuration")
}

/// One in-memory calendar per file, named after the file stem.
fn offline_store(paths: &[PathBuf]) -> Result<(InMemoryStore, Vec<String>)> {
    let mut store = InMemoryStore::new();
    let mut names = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file: {}", path.display()))?;
        let events = ical::parse_calendar(&read_file(path)?);
        tracing::debug!("Loaded {} events from {}", events.len(), path.display());
        store = store.with_calendar(name.clone(), events);
        names.push(name);
    }
    Ok((store, names))
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn ics_flag_repeats() {
        let cli = Cli::try_parse_from(["slots", "available", "--ics", "a.ics", "--ics", "b.ics"]).unwrap();
        match cli.command {
            Commands::Available { ics, today, .. } => {
                assert_eq!(ics, vec![PathBuf::from("a.ics"), PathBuf::from("b.ics")]);
                assert_eq!(today, None);
            }
            _ => panic!("expected available"),
        }
    }
}
