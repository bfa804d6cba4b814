//! Availability monitor
//!
//! One long-lived task owns the polling loop and everything it mutates:
//! the pending-registrant list, the last constraint window and the last
//! availability snapshot. Probe and submission workers only return results;
//! the monitor applies them after joining.
//!
//! ```text
//!              pending > 0                 slots found
//!  ┌─────────┐ ───────────▶ ┌─────────┐ ──────────────▶ ┌─────────────┐
//!  │ STANDBY │              │ ACTIVE  │                 │ REGISTERING │
//!  └─────────┘ ◀─────────── └─────────┘ ◀────────────── └─────────────┘
//!              pending = 0        │      burst finished (no wait)
//!                                 │
//!        stop signal (any state)  ▼
//!                           ┌─────────┐
//!                           │ STOPPED │
//!                           └─────────┘
//! ```
//!
//! Stats are the only state shared with the outside, behind one mutex.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use super::dates::{apply_same_day_cutoff, candidate_dates, site_now, target_months};
use super::distribution::{distribute, Assignment};
use super::error::{SchedulerError, SchedulerResult};
use super::snapshot::{AvailabilityChange, AvailabilitySnapshot};
use crate::config::Config;
use crate::crawler::AvailabilitySource;
use crate::error::{Error, SlotwatchErrorTrait};
use crate::metrics;
use crate::models::{DatepickerConstraints, Registrant, ReservationRecord, Slot};
use crate::notifications::{EventKind, EventPriority, EventQueue, MonitorEvent};
use crate::registration::{AttemptOutcome, RegistrationSubmitter, SubmissionResult};
use crate::storage::SharedRegistrantStore;
use crate::utils::error::FetchError;

// ============================================================================
// State and Settings
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Standby,
    Active,
    Registering,
    Stopped,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Active => "active",
            Self::Registering => "registering",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timing and behaviour knobs for one monitor run
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub room: String,
    /// Wait between active cycles that found nothing
    pub poll_interval: Duration,
    /// Wait between registrant checks while in standby
    pub standby_recheck: Duration,
    /// How often the pending list is refreshed while active
    pub registrant_recheck: Duration,
    pub probe_workers: usize,
    pub same_day_buffer: chrono::Duration,
    pub auto_registration: bool,
    pub timezone: Tz,
    pub results_dir: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            room: "A1".to_string(),
            poll_interval: Duration::from_millis(500),
            standby_recheck: Duration::from_secs(600),
            registrant_recheck: Duration::from_secs(10),
            probe_workers: 8,
            same_day_buffer: chrono::Duration::minutes(180),
            auto_registration: true,
            timezone: chrono_tz::Europe::Warsaw,
            results_dir: None,
        }
    }
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> SchedulerResult<Self> {
        let timezone: Tz = config
            .site
            .timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone {
                tz: config.site.timezone.clone(),
            })?;

        let settings = Self {
            room: config.site.room.clone(),
            poll_interval: Duration::from_millis(config.monitor.poll_interval_ms),
            standby_recheck: Duration::from_secs(config.monitor.standby_recheck_secs),
            registrant_recheck: Duration::from_secs(config.monitor.registrant_recheck_secs),
            probe_workers: config.monitor.probe_workers,
            same_day_buffer: chrono::Duration::minutes(config.monitor.same_day_buffer_mins),
            auto_registration: config.monitor.auto_registration,
            timezone,
            results_dir: config.monitor.results_dir.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.room.chars().count() != 2 {
            return Err(SchedulerError::invalid_config(
                "room",
                format!("'{}' must be exactly 2 characters", self.room),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::invalid_config("poll_interval", "must be > 0"));
        }
        if self.probe_workers == 0 {
            return Err(SchedulerError::invalid_config("probe_workers", "must be > 0"));
        }
        if self.same_day_buffer < chrono::Duration::zero() {
            return Err(SchedulerError::invalid_config(
                "same_day_buffer",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters and last-known state, readable while the monitor runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStats {
    pub state: MonitorState,
    pub room: String,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub cycles: u64,
    /// Per-date probes issued
    pub checks_performed: u64,
    pub probe_errors: u64,
    pub slots_found: u64,
    pub registration_attempts: u64,
    pub registrations_succeeded: u64,
    pub registrations_failed: u64,
    pub captcha_attempts: u64,
    pub pending_registrants: usize,
    /// Bookings the site confirmed that the store has not recorded yet
    pub unsaved_reservations: usize,
    pub target_months: Vec<u32>,
    pub constraints: Option<DatepickerConstraints>,
    pub current_availability: AvailabilitySnapshot,
    pub last_error: Option<String>,
}

impl MonitorStats {
    pub fn uptime(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.stopped_at.unwrap_or_else(Utc::now) - start)
    }
}

pub type SharedStats = Arc<Mutex<MonitorStats>>;

fn lock_stats(stats: &Mutex<MonitorStats>) -> MutexGuard<'_, MonitorStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}

/// Copy of the current statistics
pub fn read_stats(stats: &SharedStats) -> MonitorStats {
    lock_stats(stats).clone()
}

// ============================================================================
// Monitor
// ============================================================================

/// Why a wait ended
enum Wake {
    Elapsed,
    Refresh,
    Stop,
}

/// Reason the monitor is running on degraded data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Degraded {
    FallbackWindow,
    StaleWindow,
    NoWindow,
    StaleRegistrants,
}

pub struct AvailabilityMonitor {
    source: Arc<dyn AvailabilitySource>,
    store: SharedRegistrantStore,
    submitter: Arc<dyn RegistrationSubmitter>,
    events: Arc<EventQueue>,
    settings: MonitorSettings,
    stats: SharedStats,
    refresh: Arc<Notify>,

    state: MonitorState,
    pending: Vec<Registrant>,
    /// Site-confirmed bookings waiting for a successful store write, by registrant
    unsaved: HashMap<i64, ReservationRecord>,
    constraints: Option<DatepickerConstraints>,
    snapshot: AvailabilitySnapshot,
    last_registrant_check: Option<Instant>,
    degraded: Option<Degraded>,
}

impl AvailabilityMonitor {
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        store: SharedRegistrantStore,
        submitter: Arc<dyn RegistrationSubmitter>,
        events: Arc<EventQueue>,
        settings: MonitorSettings,
    ) -> Self {
        let stats = MonitorStats {
            room: settings.room.clone(),
            ..Default::default()
        };

        Self {
            source,
            store,
            submitter,
            events,
            settings,
            stats: Arc::new(Mutex::new(stats)),
            refresh: Arc::new(Notify::new()),
            state: MonitorState::Standby,
            pending: Vec::new(),
            unsaved: HashMap::new(),
            constraints: None,
            snapshot: AvailabilitySnapshot::new(),
            last_registrant_check: None,
            degraded: None,
        }
    }

    pub fn stats_handle(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// Notifying this wakes the monitor and forces a registrant re-check
    pub fn refresh_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run until `shutdown` carries `true` (or its sender is dropped)
    ///
    /// Returns the final statistics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MonitorStats {
        info!(
            room = %self.settings.room,
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            workers = self.settings.probe_workers,
            auto_registration = self.settings.auto_registration,
            "Availability monitor started"
        );
        self.update_stats(|s| s.started_at = Some(Utc::now()));

        self.refresh_registrants().await;
        let initial = if self.pending.is_empty() {
            MonitorState::Standby
        } else {
            MonitorState::Active
        };
        self.set_state(initial);

        while !*shutdown.borrow() {
            match self.state {
                MonitorState::Standby => {
                    if let Wake::Stop = self.wait(self.settings.standby_recheck, &mut shutdown).await {
                        break;
                    }
                    self.refresh_registrants().await;
                    if !self.pending.is_empty() {
                        self.emit(MonitorEvent::status(format!(
                            "{} pending registrant(s), resuming polling",
                            self.pending.len()
                        )));
                        self.set_state(MonitorState::Active);
                    }
                }
                MonitorState::Active | MonitorState::Registering => {
                    if self.registrant_check_due() {
                        self.refresh_registrants().await;
                        if self.pending.is_empty() {
                            self.emit(MonitorEvent::status(
                                "No pending registrants, entering standby",
                            ));
                            self.set_state(MonitorState::Standby);
                            continue;
                        }
                    }

                    let slots = self.run_cycle(&shutdown).await;
                    if *shutdown.borrow() {
                        break;
                    }

                    if !slots.is_empty() && self.settings.auto_registration {
                        self.set_state(MonitorState::Registering);
                        let attempted = self.register_burst(&slots).await;
                        self.set_state(MonitorState::Active);
                        if attempted > 0 {
                            continue;
                        }
                    }

                    match self.wait(self.settings.poll_interval, &mut shutdown).await {
                        Wake::Stop => break,
                        Wake::Refresh => self.last_registrant_check = None,
                        Wake::Elapsed => {}
                    }
                }
                MonitorState::Stopped => break,
            }
        }

        self.finish().await
    }

    // ------------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------------

    async fn wait(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> Wake {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
            _ = self.refresh.notified() => {
                debug!("Forced refresh requested");
                Wake::Refresh
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    Wake::Stop
                } else {
                    Wake::Elapsed
                }
            }
        }
    }

    fn registrant_check_due(&self) -> bool {
        self.last_registrant_check
            .map_or(true, |at| at.elapsed() >= self.settings.registrant_recheck)
    }

    // ------------------------------------------------------------------------
    // Registrants
    // ------------------------------------------------------------------------

    async fn refresh_registrants(&mut self) {
        self.last_registrant_check = Some(Instant::now());
        self.retry_unsaved().await;

        match self.store.list_pending(None).await {
            Ok(mut pending) => {
                // Booked on the site already, only the store write is missing
                pending.retain(|r| !self.unsaved.contains_key(&r.id));
                if self.degraded == Some(Degraded::StaleRegistrants) {
                    self.recover("Registrant store reachable again");
                }
                debug!(count = pending.len(), "Pending registrants loaded");
                self.pending = pending;
            }
            Err(e) => {
                error!(error = %e, "Failed to load pending registrants");
                let message = format!("Registrant store unavailable, keeping last known list: {e}");
                let priority = Error::from(e).event_priority();
                self.degrade(Degraded::StaleRegistrants, message, priority);
            }
        }

        let months: Vec<u32> = target_months(&self.pending).into_iter().collect();
        let pending = self.pending.len();
        self.update_stats(|s| {
            s.pending_registrants = pending;
            s.target_months = months;
        });
    }

    // ------------------------------------------------------------------------
    // Polling cycle
    // ------------------------------------------------------------------------

    /// One ACTIVE cycle; returns the slots that may be booked now
    async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Vec<Slot> {
        let months = target_months(&self.pending);
        let now = site_now(self.settings.timezone);
        let today = now.date();

        let Some(constraints) = self.refresh_constraints(today).await else {
            self.finish_cycle(0, 0, 0);
            return Vec::new();
        };

        let dates = candidate_dates(&constraints, today, &months);
        if dates.is_empty() {
            debug!(months = ?months, "No candidate dates this cycle");
            self.finish_cycle(0, 0, 0);
            return Vec::new();
        }

        debug!(count = dates.len(), "Probing candidate dates");
        let results = self.probe_all(dates, shutdown).await;

        let mut fresh = AvailabilitySnapshot::new();
        let mut failed = Vec::new();
        let mut probes = 0;

        for (date, result) in results {
            match result {
                None => {}
                Some(Ok(times)) => {
                    probes += 1;
                    let times =
                        apply_same_day_cutoff(times, date, now, self.settings.same_day_buffer);
                    fresh.insert(date, times);
                }
                Some(Err(e)) => {
                    probes += 1;
                    warn!(date = %date, error = %e, "Probe failed");
                    failed.push(date);
                }
            }
        }

        let slots = fresh.slots(&self.settings.room);

        let mut observed = fresh;
        observed.carry_over(&self.snapshot, &failed);
        let changes = self.snapshot.diff(&observed);
        self.report_changes(&changes);
        self.snapshot = observed;

        self.finish_cycle(probes, failed.len() as u64, slots.len() as u64);
        if !slots.is_empty() {
            info!(slots = slots.len(), "Slots available");
        }
        slots
    }

    /// Probe all dates through the bounded pool
    ///
    /// A date whose probe had not started when the stop signal arrived
    /// yields `None`.
    async fn probe_all(
        &self,
        dates: Vec<NaiveDate>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<(NaiveDate, Option<Result<Vec<NaiveTime>, FetchError>>)> {
        let workers = self.settings.probe_workers.max(1);

        stream::iter(dates)
            .map(|date| {
                let source = Arc::clone(&self.source);
                let shutdown = shutdown.clone();
                async move {
                    if *shutdown.borrow() {
                        return (date, None);
                    }
                    let started = Instant::now();
                    let result = source.probe_date(date).await;
                    let label = match &result {
                        Ok(times) if times.is_empty() => "empty",
                        Ok(_) => "slots",
                        Err(_) => "error",
                    };
                    metrics::record_probe(label, started.elapsed().as_secs_f64());
                    (date, Some(result))
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    /// Fetch the site window, falling back when it cannot be read
    async fn refresh_constraints(&mut self, today: NaiveDate) -> Option<DatepickerConstraints> {
        let fetched = match self.source.fetch_constraints().await {
            Ok(constraints) => constraints,
            Err(e @ Error::Parse(_)) => {
                warn!(error = %e, "Datepicker window not found, using fallback window");
                self.degrade(
                    Degraded::FallbackWindow,
                    format!("Booking page changed ({e}); probing fallback window"),
                    e.event_priority(),
                );
                return Some(DatepickerConstraints::fallback(today));
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch booking page");
                return match self.constraints.clone() {
                    Some(previous) => {
                        self.degrade(
                            Degraded::StaleWindow,
                            format!("Booking page unreachable, reusing last window: {e}"),
                            e.event_priority(),
                        );
                        Some(previous)
                    }
                    None => {
                        self.degrade(
                            Degraded::NoWindow,
                            format!("Booking page unreachable, skipping cycle: {e}"),
                            e.event_priority(),
                        );
                        None
                    }
                };
            }
        };

        if self.degraded.is_some_and(|d| d != Degraded::StaleRegistrants) {
            self.recover("Booking page window readable again");
        }

        if let Some(previous) = &self.constraints {
            let changes = previous.diff(&fetched);
            if !changes.is_empty() {
                let summary = changes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                info!(changes = %summary, "Site window changed");
                self.emit(
                    MonitorEvent::new(
                        EventKind::ConfigurationChanged,
                        format!("Site window changed: {summary}"),
                    )
                    .with_payload(serde_json::json!({ "changes": changes })),
                );
            }
        }

        self.constraints = Some(fetched.clone());
        let snapshot = fetched.clone();
        self.update_stats(|s| s.constraints = Some(snapshot));
        Some(fetched)
    }

    fn report_changes(&self, changes: &[AvailabilityChange]) {
        for change in changes {
            info!(date = %change.date(), "{change}");

            let event = match change {
                AvailabilityChange::NewlyAvailable { date, times } => MonitorEvent::new(
                    EventKind::SlotFound,
                    format!("{} slot(s) on {date}", times.len()),
                ),
                AvailabilityChange::Updated { added, .. } if !added.is_empty() => {
                    MonitorEvent::new(EventKind::SlotFound, change.to_string())
                }
                _ => MonitorEvent::status(change.to_string()),
            };

            let payload = serde_json::to_value(change).unwrap_or_default();
            self.emit(event.with_payload(payload));
        }
    }

    fn finish_cycle(&self, probes: u64, probe_errors: u64, slots: u64) {
        metrics::record_cycle(slots as usize);
        let availability = self.snapshot.clone();
        self.update_stats(|s| {
            s.cycles += 1;
            s.checks_performed += probes;
            s.probe_errors += probe_errors;
            s.slots_found += slots;
            s.last_check = Some(Utc::now());
            s.current_availability = availability;
        });
    }

    // ------------------------------------------------------------------------
    // Registration burst
    // ------------------------------------------------------------------------

    /// Distribute slots and submit every assignment concurrently
    ///
    /// Returns the number of attempts made.
    async fn register_burst(&mut self, slots: &[Slot]) -> usize {
        let assignments = distribute(slots, &self.pending);
        if assignments.is_empty() {
            debug!(slots = slots.len(), "No registrant matches the open slots");
            return 0;
        }

        info!(assignments = assignments.len(), "Starting registration burst");
        self.emit(MonitorEvent::new(
            EventKind::SlotFound,
            format!(
                "{} slot(s) open, submitting {} registration(s)",
                slots.len(),
                assignments.len()
            ),
        ));

        let submitter = Arc::clone(&self.submitter);
        let results = futures::future::join_all(assignments.into_iter().map(|assignment| {
            let submitter = Arc::clone(&submitter);
            async move {
                let result = submitter
                    .register(&assignment.registrant, &assignment.slot)
                    .await;
                (assignment, result)
            }
        }))
        .await;

        let attempted = results.len();
        for (assignment, result) in results {
            self.apply_result(assignment, result).await;
        }
        attempted
    }

    async fn apply_result(&mut self, assignment: Assignment, result: SubmissionResult) {
        let Assignment { registrant, slot } = assignment;
        metrics::record_registration(result.label(), result.attempts);

        let attempts = u64::from(result.attempts);
        self.update_stats(|s| {
            s.registration_attempts += 1;
            s.captcha_attempts += attempts;
        });

        let Some(record) = result.reservation().cloned() else {
            self.update_stats(|s| s.registrations_failed += 1);
            let message = format!(
                "{} ({}) not booked for {slot}: {}",
                registrant.full_name(),
                registrant.id,
                result.describe()
            );
            let payload = serde_json::json!({
                "registrant_id": registrant.id,
                "slot": slot,
                "outcome": result.label(),
                "attempts": result.attempts,
            });
            let event = match &result.outcome {
                Ok(AttemptOutcome::Unclassified(_)) => {
                    MonitorEvent::error(message, EventPriority::High)
                }
                _ => MonitorEvent::new(EventKind::RegistrationFailed, message),
            };
            self.emit(event.with_payload(payload));
            return;
        };

        // The site holds the booking now; never submit this registrant again
        self.pending.retain(|r| r.id != registrant.id);
        self.update_stats(|s| {
            s.registrations_succeeded += 1;
            s.pending_registrants = s.pending_registrants.saturating_sub(1);
        });

        match self.persist(registrant.id, &record).await {
            Ok(true) => {
                self.reservation_stored(registrant.id, &record);
                self.emit(
                    MonitorEvent::new(
                        EventKind::RegistrationSuccess,
                        format!(
                            "{} booked {} {} (code {})",
                            registrant.full_name(),
                            record.date,
                            record.time.format("%H:%M"),
                            record.id
                        ),
                    )
                    .with_payload(serde_json::json!({
                        "registrant_id": registrant.id,
                        "reservation": record,
                        "attempts": result.attempts,
                    })),
                );
            }
            Ok(false) => {
                warn!(
                    registrant_id = registrant.id,
                    reservation = %record.id,
                    "Registrant already held a reservation"
                );
                self.emit(MonitorEvent::error(
                    format!(
                        "Reservation {} made but registrant {} already had one",
                        record.id, registrant.id
                    ),
                    EventPriority::High,
                ));
            }
            Err(e) => {
                error!(registrant_id = registrant.id, error = %e, "Failed to store reservation");
                self.emit(
                    MonitorEvent::error(
                        format!(
                            "Reservation {} for registrant {} not stored, will retry: {e}",
                            record.id, registrant.id
                        ),
                        EventPriority::Critical,
                    )
                    .with_payload(serde_json::json!({ "reservation": record })),
                );
                self.unsaved.insert(registrant.id, record);
                let unsaved = self.unsaved.len();
                self.update_stats(|s| s.unsaved_reservations = unsaved);
            }
        }
    }

    /// Write bookings that an earlier store failure left unrecorded
    async fn retry_unsaved(&mut self) {
        if self.unsaved.is_empty() {
            return;
        }

        let waiting: Vec<(i64, ReservationRecord)> = self
            .unsaved
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();

        for (registrant_id, record) in waiting {
            match self.persist(registrant_id, &record).await {
                Ok(stored) => {
                    self.unsaved.remove(&registrant_id);
                    if stored {
                        info!(registrant_id, reservation = %record.id, "Delayed reservation write succeeded");
                        self.reservation_stored(registrant_id, &record);
                    } else {
                        warn!(
                            registrant_id,
                            reservation = %record.id,
                            "Registrant already held a reservation"
                        );
                        self.emit(MonitorEvent::error(
                            format!(
                                "Reservation {} made but registrant {registrant_id} already had one",
                                record.id
                            ),
                            EventPriority::High,
                        ));
                    }
                }
                Err(e) => {
                    debug!(registrant_id, reservation = %record.id, error = %e, "Reservation still not stored");
                }
            }
        }

        let unsaved = self.unsaved.len();
        self.update_stats(|s| s.unsaved_reservations = unsaved);
    }

    fn reservation_stored(&self, registrant_id: i64, record: &ReservationRecord) {
        self.emit(
            MonitorEvent::new(
                EventKind::DatabaseUpdate,
                format!("Reservation {} stored for registrant {registrant_id}", record.id),
            )
            .with_payload(serde_json::json!({
                "registrant_id": registrant_id,
                "reservation_id": record.id,
            })),
        );
    }

    async fn persist(
        &self,
        registrant_id: i64,
        record: &ReservationRecord,
    ) -> crate::storage::StoreResult<bool> {
        if !self.store.create_reservation(record).await? {
            debug!(reservation = %record.id, "Reservation record already present");
        }
        self.store.assign_reservation(registrant_id, &record.id).await
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    async fn finish(mut self) -> MonitorStats {
        self.retry_unsaved().await;
        if !self.unsaved.is_empty() {
            let codes: Vec<&str> = self.unsaved.values().map(|r| r.id.as_str()).collect();
            error!(reservations = ?codes, "Stopping with reservations missing from the store");
            let records: Vec<&ReservationRecord> = self.unsaved.values().collect();
            self.emit(
                MonitorEvent::error(
                    format!(
                        "{} booked reservation(s) never reached the store: {}",
                        codes.len(),
                        codes.join(", ")
                    ),
                    EventPriority::Critical,
                )
                .with_payload(serde_json::json!({ "reservations": records })),
            );
        }

        self.set_state(MonitorState::Stopped);
        self.update_stats(|s| s.stopped_at = Some(Utc::now()));
        let stats = read_stats(&self.stats);

        if let Some(dir) = &self.settings.results_dir {
            match write_results(dir, &stats).await {
                Ok(path) => info!(path = %path.display(), "Final availability written"),
                Err(e) => warn!(error = %e, "Failed to write final availability"),
            }
        }

        info!(
            cycles = stats.cycles,
            probes = stats.checks_performed,
            slots = stats.slots_found,
            succeeded = stats.registrations_succeeded,
            failed = stats.registrations_failed,
            "Availability monitor stopped"
        );

        self.emit(
            MonitorEvent::new(
                EventKind::MonitorStopped,
                format!(
                    "Monitor stopped after {} cycle(s), {} booking(s)",
                    stats.cycles, stats.registrations_succeeded
                ),
            )
            .with_payload(serde_json::to_value(&stats).unwrap_or_default()),
        );

        stats
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn set_state(&mut self, state: MonitorState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Monitor state change");
        }
        self.state = state;
        metrics::set_monitor_state(state.as_str());
        self.update_stats(|s| s.state = state);
    }

    fn update_stats(&self, f: impl FnOnce(&mut MonitorStats)) {
        f(&mut lock_stats(&self.stats));
    }

    fn emit(&self, event: MonitorEvent) {
        self.events.emit(event);
    }

    /// Report entering a degraded mode once, not every cycle
    fn degrade(&mut self, reason: Degraded, message: String, priority: EventPriority) {
        let text = message.clone();
        self.update_stats(|s| s.last_error = Some(text));
        if self.degraded != Some(reason) {
            self.degraded = Some(reason);
            self.emit(MonitorEvent::error(message, priority));
        }
    }

    fn recover(&mut self, message: &str) {
        if self.degraded.take().is_some() {
            info!("{message}");
            self.emit(MonitorEvent::status(message));
        }
    }
}

async fn write_results(dir: &Path, stats: &MonitorStats) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "availability_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let json = serde_json::to_vec_pretty(stats)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}
