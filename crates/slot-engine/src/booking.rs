//! Booking lifecycle: create one remote event per booking and track its
//! cancellation code.
//!
//! The ledger only changes after the remote store has accepted the change,
//! except when the create was sent but never acknowledged, or when path
//! resolution fails under [`PathPolicy::Lenient`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::PathPolicy;
use crate::error::{EngineError, Result};
use crate::event::{default_duration, Event};
use crate::store::{CalendarStore, CreateOutcome};

/// A booking as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`, UTC
    pub time: String,
    pub topic: String,
    pub full_name: String,
    pub contact_info: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<()> {
        let required = [&self.topic, &self.full_name, &self.contact_info];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(EngineError::Parse("all fields are required".to_string()));
        }
        Ok(())
    }

    /// Slot start as UTC.
    pub fn start(&self) -> Result<chrono::DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&format!("{} {}", self.date, self.time), "%Y-%m-%d %H:%M")
            .map(|dt| dt.and_utc())
            .map_err(|_| EngineError::Parse("invalid date or time format".to_string()))
    }

    /// Identifier the ledger stores for this slot.
    pub fn event_id(&self) -> String {
        format!("{}-{}", self.date, self.time)
    }
}

/// JSON reply for booking and cancellation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BookingResponse {
    pub fn booked(code: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(code.into()),
            error: None,
        }
    }

    pub fn ok() -> Self {
        Self {
            success: true,
            code: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<String>> for BookingResponse {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(code) => Self::booked(code),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

impl From<Result<()>> for BookingResponse {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerMaps {
    by_code: HashMap<String, String>,
    by_event: HashMap<String, Vec<String>>,
}

/// In-memory code <-> event id index, kept in both directions.
///
/// A slot booked twice keeps both codes, oldest first; each code cancels its
/// own remote object.
#[derive(Debug, Default)]
pub struct BookingLedger {
    maps: RwLock<LedgerMaps>,
}

impl BookingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, code: &str, event_id: &str) {
        let mut maps = self.maps.write().await;
        if let Some(old_event) = maps.by_code.insert(code.to_string(), event_id.to_string()) {
            detach(&mut maps.by_event, &old_event, code);
        }
        maps.by_event
            .entry(event_id.to_string())
            .or_default()
            .push(code.to_string());
    }

    pub async fn event_for(&self, code: &str) -> Option<String> {
        self.maps.read().await.by_code.get(code).cloned()
    }

    /// Codes booked for `event_id`, oldest first.
    pub async fn codes_for(&self, event_id: &str) -> Vec<String> {
        self.maps
            .read()
            .await
            .by_event
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop `code`; returns its event id if the code existed.
    pub async fn remove(&self, code: &str) -> Option<String> {
        let mut maps = self.maps.write().await;
        let event_id = maps.by_code.remove(code)?;
        detach(&mut maps.by_event, &event_id, code);
        Some(event_id)
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.by_code.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn detach(by_event: &mut HashMap<String, Vec<String>>, event_id: &str, code: &str) {
    if let Some(codes) = by_event.get_mut(event_id) {
        codes.retain(|c| c != code);
        if codes.is_empty() {
            by_event.remove(event_id);
        }
    }
}

/// Short opaque cancellation code.
pub fn generate_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Books and cancels slots against a [`CalendarStore`].
pub struct BookingService {
    store: Arc<dyn CalendarStore>,
    ledger: Arc<BookingLedger>,
    policy: PathPolicy,
    uid_domain: String,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        ledger: Arc<BookingLedger>,
        policy: PathPolicy,
        uid_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            policy,
            uid_domain: uid_domain.into(),
        }
    }

    pub fn ledger(&self) -> &Arc<BookingLedger> {
        &self.ledger
    }

    /// Event written to the store for `request`.
    pub fn booking_event(&self, request: &BookingRequest, code: &str) -> Result<Event> {
        let start = request.start()?;
        let description = format!(
            "Who are you?: {}\nContact method: {}\nCancellation code: {}",
            request.full_name, request.contact_info, code
        );
        Ok(Event::new(
            format!("{}@{}", code, self.uid_domain),
            start,
            Some(start + default_duration()),
        )
        .with_property("SUMMARY", request.topic.clone())
        .with_property("DESCRIPTION", description)
        .with_property("STATUS", "CONFIRMED"))
    }

    /// Create the remote event and record the code. Returns the code.
    pub async fn book(&self, request: &BookingRequest) -> Result<String> {
        request.validate()?;
        let code = generate_code();
        let event = self.booking_event(request, &code)?;
        info!("Creating booking {} for {} {}", code, request.date, request.time);

        if let Some(base) = self.calendar_path("booking").await? {
            let path = object_path(&base, &code);
            debug!("Creating event at path {}", path);
            match self.store.create_event(&path, &event).await? {
                CreateOutcome::Confirmed => info!("Event {} created at {}", event.uid, path),
                CreateOutcome::Unconfirmed => {
                    warn!("Event {} sent but not confirmed by the store", event.uid)
                }
            }
        }

        let event_id = request.event_id();
        self.ledger.insert(&code, &event_id).await;
        info!("Booking created with code {} for event {}", code, event_id);
        Ok(code)
    }

    /// Cancel the booking behind `code`.
    pub async fn cancel(&self, code: &str) -> Result<()> {
        if self.ledger.event_for(code).await.is_none() {
            return Err(EngineError::NotFound("invalid cancellation code".to_string()));
        }
        self.delete_code(code).await
    }

    /// Delete every remote event booked for `event_id` (`YYYY-MM-DD-HH:MM`)
    /// and forget their codes. Stops at the first failed delete; codes already
    /// deleted stay forgotten.
    pub async fn delete_booking_event(&self, event_id: &str) -> Result<()> {
        info!("Deleting booking event {}", event_id);
        let codes = self.ledger.codes_for(event_id).await;
        if codes.is_empty() {
            return Err(EngineError::NotFound(format!(
                "no booking found for event {}",
                event_id
            )));
        }
        for code in codes {
            self.delete_code(&code).await?;
        }
        Ok(())
    }

    /// Remote delete for `code`, then drop it from the ledger.
    async fn delete_code(&self, code: &str) -> Result<()> {
        if let Some(base) = self.calendar_path("cancellation").await? {
            let path = object_path(&base, code);
            debug!("Deleting event at path {}", path);
            self.store.delete_event(&path).await.map_err(|e| {
                error!("Error deleting event {}: {}", path, e);
                e
            })?;
        }

        self.ledger.remove(code).await;
        info!("Booking {} cancelled", code);
        Ok(())
    }

    /// Writable collection, or `None` when the lenient policy swallowed a
    /// lookup failure.
    async fn calendar_path(&self, action: &str) -> Result<Option<String>> {
        let failure = match self.store.resolve_calendar_path().await {
            Ok(Some(path)) => return Ok(Some(path)),
            Ok(None) => format!("no calendar available for {}", action),
            Err(e) => format!("calendar lookup failed during {}: {}", action, e),
        };
        match self.policy {
            PathPolicy::Strict => {
                error!("{}", failure);
                Err(EngineError::RemoteMutation(failure))
            }
            PathPolicy::Lenient => {
                warn!("{}; continuing without the remote store", failure);
                Ok(None)
            }
        }
    }
}

/// `<collection>/<code>.ics`
pub fn object_path(base: &str, code: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}.ics", base, code)
    } else {
        format!("{}/{}.ics", base, code)
    }
}
