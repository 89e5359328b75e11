//! Top-level engine tying the store, cache, slot grid and bookings together.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::booking::{BookingLedger, BookingRequest, BookingService};
use crate::cache::AvailabilityCache;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::fetcher::CalendarFetcher;
use crate::slots::{self, AvailabilityGrid};
use crate::store::CalendarStore;

/// Owns every piece of mutable state; build a fresh one per test or per process.
pub struct SlotEngine {
    config: EngineConfig,
    fetcher: Arc<CalendarFetcher>,
    cache: Arc<AvailabilityCache>,
    bookings: BookingService,
}

impl SlotEngine {
    /// Engine over `store` with an empty cache and booking table.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if `config` does not validate.
    pub fn new(config: EngineConfig, store: Arc<dyn CalendarStore>) -> Result<Self> {
        Self::with_state(
            config,
            store,
            Arc::new(AvailabilityCache::new()),
            Arc::new(BookingLedger::new()),
        )
    }

    /// Engine sharing an existing cache and booking table.
    pub fn with_state(
        config: EngineConfig,
        store: Arc<dyn CalendarStore>,
        cache: Arc<AvailabilityCache>,
        ledger: Arc<BookingLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(
            CalendarFetcher::new(Arc::clone(&store), config.caldav.calendars())
                .with_timeout(config.caldav.timeout()),
        );
        let bookings = BookingService::new(store, ledger, config.path_policy, config.uid_domain.clone());
        Ok(Self {
            config,
            fetcher,
            cache,
            bookings,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AvailabilityCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<BookingLedger> {
        self.bookings.ledger()
    }

    pub fn fetcher(&self) -> &Arc<CalendarFetcher> {
        &self.fetcher
    }

    /// Dates offered starting at `today`.
    pub fn bookable_dates(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        Ok(slots::business_days(
            today,
            self.config.days_available,
            self.config.non_working_weekday()?,
        ))
    }

    /// Free hourly slots for every bookable date starting at `today`.
    pub async fn available_slots_from(&self, today: NaiveDate) -> Result<AvailabilityGrid> {
        let dates = self.bookable_dates(today)?;
        Ok(slots::compute_availability(
            &self.cache,
            &self.fetcher,
            &dates,
            self.config.working_hours(),
        )
        .await)
    }

    /// Free hourly slots starting today (UTC).
    pub async fn available_slots(&self) -> Result<AvailabilityGrid> {
        self.available_slots_from(Utc::now().date_naive()).await
    }

    pub async fn book(&self, request: &BookingRequest) -> Result<String> {
        self.bookings.book(request).await
    }

    pub async fn cancel(&self, code: &str) -> Result<()> {
        self.bookings.cancel(code).await
    }

    pub async fn delete_booking_event(&self, event_id: &str) -> Result<()> {
        self.bookings.delete_booking_event(event_id).await
    }
}
