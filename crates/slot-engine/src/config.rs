//! Engine configuration.
//!
//! Resolution order, highest first:
//! 1. environment variables (`DAYS_AVAILABLE`, `WORKDAY_START`, `CALDAV_*`, ...)
//! 2. a TOML file, when one is given
//! 3. built-in defaults
//!
//! Integer variables that fail to parse keep the lower-priority value.

use std::path::Path;
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::rule;
use crate::slots::WorkingHours;

/// What to do when the writable calendar cannot be resolved while booking or
/// cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Log and report success; the booking table is still updated.
    #[default]
    Lenient,
    /// Fail the request with a remote mutation error.
    Strict,
}

/// CalDAV connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalDavConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    /// Primary calendar path, always queried.
    pub calendar: String,
    /// Extra calendars whose events also block slots.
    pub additional_calendars: Vec<String>,
    /// Connect and whole-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            password: String::new(),
            calendar: String::new(),
            additional_calendars: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl CalDavConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Primary calendar followed by the additional ones, blanks dropped.
    pub fn calendars(&self) -> Vec<String> {
        std::iter::once(&self.calendar)
            .chain(&self.additional_calendars)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many days, starting today, can be booked.
    pub days_available: u32,
    /// First bookable hour (UTC).
    pub work_start_hour: u32,
    /// Hour at which the working day ends (UTC, exclusive).
    pub work_end_hour: u32,
    /// Two-letter weekday code of the day that is never offered.
    pub non_working_day: String,
    pub path_policy: PathPolicy,
    /// Domain part of booking UIDs (`<code>@<domain>`).
    pub uid_domain: String,
    pub caldav: CalDavConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            days_available: 28,
            work_start_hour: 8,
            work_end_hour: 19,
            non_working_day: "SU".to_string(),
            path_policy: PathPolicy::Lenient,
            uid_domain: "slot-engine".to_string(),
            caldav: CalDavConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// File (if any), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `lookup`, typically `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let int = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok());

        if let Some(days) = int("DAYS_AVAILABLE") {
            self.days_available = days;
        }
        if let Some(hour) = int("WORKDAY_START") {
            self.work_start_hour = hour;
        }
        if let Some(hour) = int("WORKDAY_END") {
            self.work_end_hour = hour;
        }
        if let Some(day) = lookup("NON_WORKING_DAY") {
            self.non_working_day = day.trim().to_string();
        }
        if let Some(strict) = lookup("STRICT_CALENDAR_PATH") {
            self.path_policy = match strict.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => PathPolicy::Strict,
                _ => PathPolicy::Lenient,
            };
        }
        if let Some(url) = lookup("CALDAV_SERVER_URL") {
            self.caldav.server_url = url;
        }
        if let Some(user) = lookup("CALDAV_USERNAME") {
            self.caldav.username = user;
        }
        if let Some(password) = lookup("CALDAV_PASSWORD") {
            self.caldav.password = password;
        }
        if let Some(calendar) = lookup("CALDAV_CALENDAR") {
            self.caldav.calendar = calendar;
        }
        if let Some(extra) = lookup("CALDAV_ADDITIONAL_CALENDARS") {
            self.caldav.additional_calendars = extra
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = lookup("CALDAV_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.caldav.timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.work_end_hour > 24 {
            return Err(EngineError::Config(format!(
                "work_end_hour must be at most 24, got {}",
                self.work_end_hour
            )));
        }
        if self.work_start_hour >= self.work_end_hour {
            return Err(EngineError::Config(format!(
                "work_start_hour ({}) must be before work_end_hour ({})",
                self.work_start_hour, self.work_end_hour
            )));
        }
        if self.caldav.timeout_secs == 0 {
            return Err(EngineError::Config("caldav.timeout_secs must be positive".to_string()));
        }
        self.non_working_weekday()?;
        Ok(())
    }

    pub fn non_working_weekday(&self) -> Result<Weekday> {
        rule::weekday_from_code(&self.non_working_day).ok_or_else(|| {
            EngineError::Config(format!("unknown weekday code {:?}", self.non_working_day))
        })
    }

    pub fn working_hours(&self) -> WorkingHours {
        WorkingHours::new(self.work_start_hour, self.work_end_hour)
    }
}
