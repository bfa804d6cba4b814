//! Integration tests for the availability monitor loop
//!
//! The site and the submitter are in-process fakes; the store is the
//! in-memory implementation, optionally wrapped to fail reservation writes.

mod common;

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use slotwatch::crawler::AvailabilitySource;
use slotwatch::error::{Error, Result};
use slotwatch::models::{
    DatepickerConstraints, NewRegistrant, Registrant, ReservationRecord, Slot, StoreStatistics,
};
use slotwatch::notifications::{EventKind, EventPriority, EventQueue, MonitorEvent};
use slotwatch::registration::{AttemptOutcome, RegistrationSubmitter, SubmissionResult};
use slotwatch::scheduler::{
    candidate_dates, is_business_day, read_stats, site_now, AvailabilityMonitor, MonitorSettings,
    MonitorState, MonitorStats, SharedStats,
};
use slotwatch::storage::{
    create_memory_store, RegistrantStore, SharedRegistrantStore, StoreResult,
};
use slotwatch::utils::error::{FetchError, ParseError, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone, Copy)]
enum WindowMode {
    Ok,
    Unparseable,
    Unreachable,
}

/// Site whose open times shrink as bookings succeed
struct FakeSite {
    window: Mutex<DatepickerConstraints>,
    mode: WindowMode,
    open: Arc<Mutex<BTreeMap<NaiveDate, Vec<NaiveTime>>>>,
    probes: AtomicUsize,
    probed: Mutex<BTreeSet<NaiveDate>>,
}

impl FakeSite {
    fn new(window: DatepickerConstraints) -> Self {
        Self {
            window: Mutex::new(window),
            mode: WindowMode::Ok,
            open: Arc::new(Mutex::new(BTreeMap::new())),
            probes: AtomicUsize::new(0),
            probed: Mutex::new(BTreeSet::new()),
        }
    }

    fn with_mode(mut self, mode: WindowMode) -> Self {
        self.mode = mode;
        self
    }

    fn open_times(&self, date: NaiveDate, times: &[&str]) {
        self.open
            .lock()
            .unwrap()
            .insert(date, times.iter().map(|t| common::time(t)).collect());
    }

    /// The site moves its booking window
    fn set_window(&self, window: DatepickerConstraints) {
        *self.window.lock().unwrap() = window;
    }

    fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvailabilitySource for FakeSite {
    fn room(&self) -> &str {
        "A1"
    }

    async fn fetch_constraints(&self) -> Result<DatepickerConstraints> {
        match self.mode {
            WindowMode::Ok => Ok(self.window.lock().unwrap().clone()),
            WindowMode::Unparseable => Err(Error::Parse(ParseError::DatepickerConfig(
                "minDate".into(),
            ))),
            WindowMode::Unreachable => Err(Error::Fetch(FetchError::Timeout)),
        }
    }

    async fn probe_date(&self, date: NaiveDate) -> std::result::Result<Vec<NaiveTime>, FetchError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probed.lock().unwrap().insert(date);
        Ok(self.open.lock().unwrap().get(&date).cloned().unwrap_or_default())
    }
}

/// Books every slot it is given and takes it off the fake site
struct BookingSubmitter {
    open: Arc<Mutex<BTreeMap<NaiveDate, Vec<NaiveTime>>>>,
    calls: Mutex<Vec<(i64, Slot)>>,
}

impl BookingSubmitter {
    fn new(site: &FakeSite) -> Self {
        Self {
            open: Arc::clone(&site.open),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(i64, Slot)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistrationSubmitter for BookingSubmitter {
    async fn register(&self, registrant: &Registrant, slot: &Slot) -> SubmissionResult {
        self.calls.lock().unwrap().push((registrant.id, slot.clone()));

        if let Some(times) = self.open.lock().unwrap().get_mut(&slot.date) {
            times.retain(|t| *t != slot.time);
        }

        SubmissionResult {
            outcome: Ok(AttemptOutcome::Success(ReservationRecord {
                id: format!("CODE{}", registrant.id),
                date: slot.date,
                time: slot.time,
                room: slot.room.clone(),
                confirmed: None,
                created_at: Utc::now(),
            })),
            attempts: 1,
        }
    }
}

/// Memory store whose reservation writes fail while `down` is set
struct FlakyStore {
    inner: SharedRegistrantStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: create_memory_store(),
            down: AtomicBool::new(true),
        }
    }

    fn heal(&self) {
        self.down.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistrantStore for FlakyStore {
    async fn add(&self, registrant: NewRegistrant) -> StoreResult<Registrant> {
        self.inner.add(registrant).await
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Registrant>> {
        self.inner.get(id).await
    }

    async fn list_pending(&self, month: Option<u32>) -> StoreResult<Vec<Registrant>> {
        self.inner.list_pending(month).await
    }

    async fn list_all(&self) -> StoreResult<Vec<Registrant>> {
        self.inner.list_all().await
    }

    async fn create_reservation(&self, record: &ReservationRecord) -> StoreResult<bool> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.create_reservation(record).await
    }

    async fn assign_reservation(
        &self,
        registrant_id: i64,
        reservation_id: &str,
    ) -> StoreResult<bool> {
        self.inner.assign_reservation(registrant_id, reservation_id).await
    }

    async fn get_reservation(&self, id: &str) -> StoreResult<Option<ReservationRecord>> {
        self.inner.get_reservation(id).await
    }

    async fn delete(&self, registrant_id: i64) -> StoreResult<bool> {
        self.inner.delete(registrant_id).await
    }

    async fn statistics(&self) -> StoreResult<StoreStatistics> {
        self.inner.statistics().await
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn today() -> NaiveDate {
    site_now(chrono_tz::Europe::Warsaw).date()
}

/// A business day comfortably inside the window, away from month edges
fn target_date() -> NaiveDate {
    let mut date = today() + ChronoDuration::days(10);
    while !is_business_day(date) {
        date += ChronoDuration::days(1);
    }
    date
}

fn window() -> DatepickerConstraints {
    DatepickerConstraints {
        min_date: today() + ChronoDuration::days(1),
        max_date: today() + ChronoDuration::days(60),
        disabled: BTreeSet::new(),
    }
}

fn settings(results_dir: Option<std::path::PathBuf>) -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_millis(10),
        standby_recheck: Duration::from_millis(20),
        registrant_recheck: Duration::from_millis(10),
        probe_workers: 4,
        results_dir,
        ..Default::default()
    }
}

async fn seed(store: &SharedRegistrantStore, months: &[u32]) -> Vec<Registrant> {
    let mut added = Vec::new();
    for (n, month) in months.iter().enumerate() {
        added.push(store.add(common::intake(n, *month)).await.unwrap());
    }
    added
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<MonitorStats>,
    stats: SharedStats,
}

impl Running {
    fn start(monitor: AvailabilityMonitor) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let stats = monitor.stats_handle();
        let handle = tokio::spawn(monitor.run(rx));
        Self { shutdown, handle, stats }
    }

    fn state(&self) -> MonitorState {
        read_stats(&self.stats).state
    }

    async fn stop(self) -> MonitorStats {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("monitor should stop promptly")
            .unwrap()
    }
}

async fn run_for(monitor: AvailabilityMonitor, duration: Duration) -> MonitorStats {
    let running = Running::start(monitor);
    tokio::time::sleep(duration).await;
    running.stop().await
}

fn statuses(events: &EventQueue) -> Vec<String> {
    events
        .snapshot()
        .into_iter()
        .filter(|e| e.kind == EventKind::StatusUpdate)
        .map(|e| e.message)
        .collect()
}

fn kinds(events: &EventQueue) -> Vec<EventKind> {
    events.snapshot().iter().map(|e| e.kind).collect()
}

fn errors(events: &EventQueue) -> Vec<MonitorEvent> {
    events
        .snapshot()
        .into_iter()
        .filter(|e| e.kind == EventKind::Error)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_no_pending_registrants_means_no_probes() {
    let site = Arc::new(FakeSite::new(window()));
    let submitter = Arc::new(BookingSubmitter::new(&site));
    let events = Arc::new(EventQueue::new(100));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        create_memory_store(),
        submitter.clone(),
        events.clone(),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(150)).await;

    assert_eq!(site.probe_count(), 0);
    assert!(submitter.calls().is_empty());
    assert_eq!(stats.state, MonitorState::Stopped);
    assert_eq!(stats.cycles, 0);
    assert_eq!(kinds(&events).last(), Some(&EventKind::MonitorStopped));
}

#[tokio::test]
async fn test_probes_only_target_month_candidates() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    let store = create_memory_store();
    seed(&store, &[target.month()]).await;

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        Arc::new(EventQueue::new(1000)),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(150)).await;

    let months = BTreeSet::from([target.month()]);
    let expected: BTreeSet<NaiveDate> = candidate_dates(&window(), today(), &months)
        .into_iter()
        .collect();

    let probed = site.probed.lock().unwrap().clone();
    assert!(!probed.is_empty());
    assert_eq!(probed, expected);
    assert!(probed.iter().all(|d| d.month() == target.month() && is_business_day(*d)));
    assert!(stats.cycles >= 1);
    assert_eq!(stats.checks_performed as usize, site.probe_count());
}

#[tokio::test]
async fn test_slots_booked_by_priority_without_double_booking() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["11:00", "10:00"]);

    let store = create_memory_store();
    let registrants = seed(&store, &[target.month(), target.month(), target.month()]).await;
    let submitter = Arc::new(BookingSubmitter::new(&site));
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        submitter.clone(),
        events.clone(),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(300)).await;

    // Two slots, three registrants: the two lowest ids win, earliest first
    let calls = submitter.calls();
    assert_eq!(calls.len(), 2, "each slot submitted exactly once: {calls:?}");
    assert_eq!(calls[0].0, registrants[0].id);
    assert_eq!(calls[0].1.time, common::time("10:00"));
    assert_eq!(calls[1].0, registrants[1].id);
    assert_eq!(calls[1].1.time, common::time("11:00"));

    let first = store.get(registrants[0].id).await.unwrap().unwrap();
    assert_eq!(first.reservation_id.as_deref(), Some(format!("CODE{}", registrants[0].id).as_str()));
    let pending = store.list_pending(None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, registrants[2].id);

    assert_eq!(stats.registrations_succeeded, 2);
    assert_eq!(stats.registrations_failed, 0);
    assert_eq!(stats.pending_registrants, 1);

    let kinds = kinds(&events);
    assert!(kinds.contains(&EventKind::SlotFound));
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::RegistrationSuccess).count(),
        2
    );
}

#[tokio::test]
async fn test_auto_registration_disabled_only_reports() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["10:00"]);

    let store = create_memory_store();
    seed(&store, &[target.month()]).await;
    let submitter = Arc::new(BookingSubmitter::new(&site));
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        submitter.clone(),
        events.clone(),
        MonitorSettings {
            auto_registration: false,
            ..settings(None)
        },
    );

    let stats = run_for(monitor, Duration::from_millis(150)).await;

    assert!(submitter.calls().is_empty());
    assert_eq!(store.list_pending(None).await.unwrap().len(), 1);
    assert!(stats.slots_found >= 1);
    assert_eq!(stats.current_availability.times(target), Some(&[common::time("10:00")][..]));

    // The slot is reported once, not every cycle
    let found = events
        .snapshot()
        .into_iter()
        .filter(|e| e.kind == EventKind::SlotFound)
        .count();
    assert_eq!(found, 1);
}

#[tokio::test]
async fn test_unparseable_window_falls_back_and_reports_once() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()).with_mode(WindowMode::Unparseable));
    let store = create_memory_store();
    seed(&store, &[target.month()]).await;
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(200)).await;

    assert!(stats.cycles > 1);
    assert!(site.probe_count() > 0, "fallback window should still be probed");

    let errors = errors(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].priority, EventPriority::Critical);
    // The fallback is never remembered as the site's window
    assert!(stats.constraints.is_none());
}

#[tokio::test]
async fn test_unreachable_site_skips_cycle() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()).with_mode(WindowMode::Unreachable));
    let store = create_memory_store();
    seed(&store, &[target.month()]).await;
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(150)).await;

    assert_eq!(site.probe_count(), 0);
    assert!(stats.last_error.is_some());
    assert_eq!(errors(&events).len(), 1);
}

#[tokio::test]
async fn test_stop_writes_results_snapshot() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["09:00"]);

    let store = create_memory_store();
    seed(&store, &[target.month()]).await;
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        MonitorSettings {
            auto_registration: false,
            ..settings(Some(dir.path().to_path_buf()))
        },
    );

    let stats = run_for(monitor, Duration::from_millis(100)).await;

    let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(written.len(), 1);
    let path = written[0].as_ref().unwrap().path();
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("availability_"));

    let saved: MonitorStats = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(saved.cycles, stats.cycles);

    let stopped = events
        .snapshot()
        .into_iter()
        .find(|e| e.kind == EventKind::MonitorStopped)
        .expect("stop event");
    assert_eq!(stopped.payload["cycles"], stats.cycles);
}

#[tokio::test]
async fn test_unsaved_booking_not_submitted_again() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["09:00", "10:00", "11:00", "12:00"]);

    let flaky = Arc::new(FlakyStore::new());
    let store: SharedRegistrantStore = flaky.clone();
    let registrants = seed(&store, &[target.month()]).await;
    let submitter = Arc::new(BookingSubmitter::new(&site));
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        submitter.clone(),
        events.clone(),
        settings(None),
    );

    let stats = run_for(monitor, Duration::from_millis(300)).await;

    // The store still lists the registrant, but the site already booked them
    let calls = submitter.calls();
    assert_eq!(calls.len(), 1, "booked registrant resubmitted: {calls:?}");
    assert_eq!(calls[0].0, registrants[0].id);
    assert_eq!(store.list_pending(None).await.unwrap().len(), 1);

    assert_eq!(stats.registrations_succeeded, 1);
    assert_eq!(stats.unsaved_reservations, 1);
    assert_eq!(stats.pending_registrants, 0);

    let critical: Vec<_> = errors(&events)
        .into_iter()
        .filter(|e| e.priority == EventPriority::Critical)
        .collect();
    assert!(critical.iter().any(|e| e.message.contains("never reached the store")));
    assert!(!kinds(&events).contains(&EventKind::DatabaseUpdate));
}

#[tokio::test]
async fn test_unsaved_booking_written_once_store_recovers() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["09:00", "10:00"]);

    let flaky = Arc::new(FlakyStore::new());
    let store: SharedRegistrantStore = flaky.clone();
    let registrants = seed(&store, &[target.month()]).await;
    let submitter = Arc::new(BookingSubmitter::new(&site));
    let events = Arc::new(EventQueue::new(1000));

    let running = Running::start(AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        submitter.clone(),
        events.clone(),
        settings(None),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    flaky.heal();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let stats = running.stop().await;

    assert_eq!(submitter.calls().len(), 1);
    let stored = store.get(registrants[0].id).await.unwrap().unwrap();
    let code = format!("CODE{}", registrants[0].id);
    assert_eq!(stored.reservation_id.as_deref(), Some(code.as_str()));
    assert!(store.get_reservation(&code).await.unwrap().is_some());
    assert_eq!(stats.unsaved_reservations, 0);

    let updates: Vec<_> = events
        .snapshot()
        .into_iter()
        .filter(|e| e.kind == EventKind::DatabaseUpdate)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].payload["reservation_id"], code.as_str());
}

#[tokio::test]
async fn test_stored_booking_reports_database_update() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    site.open_times(target, &["10:00"]);

    let store = create_memory_store();
    let registrants = seed(&store, &[target.month()]).await;
    let events = Arc::new(EventQueue::new(1000));

    let monitor = AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    );

    run_for(monitor, Duration::from_millis(150)).await;

    let update = events
        .snapshot()
        .into_iter()
        .find(|e| e.kind == EventKind::DatabaseUpdate)
        .expect("database update event");
    assert_eq!(update.priority, EventPriority::Low);
    assert_eq!(update.payload["registrant_id"], registrants[0].id);
}

#[tokio::test]
async fn test_registrant_added_during_standby_resumes_polling() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    let store = create_memory_store();
    let events = Arc::new(EventQueue::new(1000));

    let running = Running::start(AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(running.state(), MonitorState::Standby);
    assert_eq!(site.probe_count(), 0);

    seed(&store, &[target.month()]).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(running.state(), MonitorState::Active);
    assert!(site.probe_count() > 0);
    let stats = running.stop().await;
    assert!(stats.cycles >= 1);
    assert_eq!(stats.pending_registrants, 1);

    assert!(statuses(&events)
        .iter()
        .any(|m| m == "1 pending registrant(s), resuming polling"));
}

#[tokio::test]
async fn test_last_registrant_removed_enters_standby() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    let store = create_memory_store();
    let registrants = seed(&store, &[target.month()]).await;
    let events = Arc::new(EventQueue::new(1000));

    let running = Running::start(AvailabilityMonitor::new(
        site.clone(),
        store.clone(),
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    ));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(running.state(), MonitorState::Active);
    assert!(site.probe_count() > 0);

    assert!(store.delete(registrants[0].id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(running.state(), MonitorState::Standby);

    // Standby keeps re-checking the store but never touches the site
    let probes = site.probe_count();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(site.probe_count(), probes);

    let stats = running.stop().await;
    assert_eq!(stats.pending_registrants, 0);
    assert!(statuses(&events)
        .iter()
        .any(|m| m == "No pending registrants, entering standby"));
}

#[tokio::test]
async fn test_site_window_change_reported() {
    let target = target_date();
    let site = Arc::new(FakeSite::new(window()));
    let store = create_memory_store();
    seed(&store, &[target.month()]).await;
    let events = Arc::new(EventQueue::new(1000));

    let running = Running::start(AvailabilityMonitor::new(
        site.clone(),
        store,
        Arc::new(BookingSubmitter::new(&site)),
        events.clone(),
        settings(None),
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!kinds(&events).contains(&EventKind::ConfigurationChanged));

    let widened = DatepickerConstraints {
        max_date: today() + ChronoDuration::days(90),
        ..window()
    };
    site.set_window(widened.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = running.stop().await;

    let changed: Vec<_> = events
        .snapshot()
        .into_iter()
        .filter(|e| e.kind == EventKind::ConfigurationChanged)
        .collect();
    assert_eq!(changed.len(), 1, "window change reported once");
    assert!(changed[0].message.starts_with("Site window changed"));
    assert_eq!(stats.constraints, Some(widened));
}
