//! Error types for slot-engine operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed booking date/time, config value or iCalendar payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A single calendar query failed or timed out.
    #[error("Fetch error for calendar {calendar}: {reason}")]
    Fetch { calendar: String, reason: String },

    /// Creating or deleting an event in the remote store failed.
    #[error("Remote mutation failed: {0}")]
    RemoteMutation(String),

    /// Unknown cancellation code, or an event with no booking attached.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parsing error: {0}")]
    Xml(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
