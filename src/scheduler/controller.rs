//! Start/stop/status control over a single monitor task
//!
//! The controller is what the CLI and the control API hold. It owns at most
//! one running [`AvailabilityMonitor`], built fresh on every start so that
//! per-run overrides (room, polling interval) take effect.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::monitor::{read_stats, AvailabilityMonitor, MonitorSettings, MonitorState, MonitorStats, SharedStats};
use crate::captcha::CaptchaSolver;
use crate::config::Config;
use crate::crawler::{AvailabilitySource, SiteFetcher};
use crate::notifications::{EventKind, EventQueue, MonitorEvent, QueueStats};
use crate::registration::{RegistrationSubmitter, RetryingSubmitter, SiteSubmitter};
use crate::storage::SharedRegistrantStore;

/// How long `stop` waits for the monitor to finish its current step
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-run settings supplied with a start request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorOverrides {
    pub room: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub auto_registration: Option<bool>,
    pub registrant_recheck_secs: Option<u64>,
}

impl MonitorOverrides {
    pub fn apply(&self, mut settings: MonitorSettings) -> SchedulerResult<MonitorSettings> {
        if let Some(room) = &self.room {
            settings.room = room.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval = Duration::from_millis(ms);
        }
        if let Some(auto) = self.auto_registration {
            settings.auto_registration = auto;
        }
        if let Some(secs) = self.registrant_recheck_secs {
            settings.registrant_recheck = Duration::from_secs(secs);
        }
        settings.validate()?;
        Ok(settings)
    }
}

/// Builds the site-facing halves of a monitor for one room
pub trait MonitorBackend: Send + Sync {
    fn build(
        &self,
        room: &str,
    ) -> SchedulerResult<(Arc<dyn AvailabilitySource>, Arc<dyn RegistrationSubmitter>)>;
}

/// Live site backend: HTTP fetcher plus CAPTCHA-retrying submitter
pub struct SiteBackend {
    config: Config,
    solver: Arc<dyn CaptchaSolver>,
}

impl SiteBackend {
    pub fn new(config: Config, solver: Arc<dyn CaptchaSolver>) -> Self {
        Self { config, solver }
    }
}

impl MonitorBackend for SiteBackend {
    fn build(
        &self,
        room: &str,
    ) -> SchedulerResult<(Arc<dyn AvailabilitySource>, Arc<dyn RegistrationSubmitter>)> {
        let mut site = self.config.site.clone();
        site.room = room.to_string();

        let delay = Duration::from_millis(self.config.monitor.sequential_probe_delay_ms);
        let fetcher = SiteFetcher::new(&site, delay)
            .map_err(|e| SchedulerError::invalid_config("site", e.to_string()))?;
        let fetcher = Arc::new(fetcher);

        let submitter = RetryingSubmitter::new(
            SiteSubmitter::new(Arc::clone(&fetcher), Arc::clone(&self.solver)),
            &self.config.registration,
        );

        Ok((fetcher, Arc::new(submitter)))
    }
}

/// Snapshot returned by status queries
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub state: MonitorState,
    pub room: String,
    pub poll_interval_ms: u64,
    pub auto_registration: bool,
    /// Current run's stats, or the last finished run's
    pub stats: Option<MonitorStats>,
    pub events: QueueStats,
}

struct RunningMonitor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<MonitorStats>,
    stats: SharedStats,
    refresh: Arc<Notify>,
    settings: MonitorSettings,
}

pub struct MonitorController {
    backend: Arc<dyn MonitorBackend>,
    store: SharedRegistrantStore,
    events: Arc<EventQueue>,
    defaults: MonitorSettings,
    stop_timeout: Duration,
    running: tokio::sync::Mutex<Option<RunningMonitor>>,
    last_run: Mutex<Option<MonitorStats>>,
}

impl MonitorController {
    pub fn new(
        backend: Arc<dyn MonitorBackend>,
        store: SharedRegistrantStore,
        events: Arc<EventQueue>,
        defaults: MonitorSettings,
    ) -> Self {
        Self {
            backend,
            store,
            events,
            defaults,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            running: tokio::sync::Mutex::new(None),
            last_run: Mutex::new(None),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    pub fn store(&self) -> &SharedRegistrantStore {
        &self.store
    }

    /// Launch a monitor task
    pub async fn start(&self, overrides: MonitorOverrides) -> SchedulerResult<MonitorSettings> {
        let mut running = self.running.lock().await;

        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return Err(SchedulerError::AlreadyRunning);
            }
        }
        // A task that ended on its own still owes us its stats
        if let Some(finished) = running.take() {
            if let Err(e) = self.collect(finished.handle.await) {
                warn!(error = %e, "Previous monitor task ended abnormally");
            }
        }

        let settings = overrides.apply(self.defaults.clone())?;
        let (source, submitter) = self.backend.build(&settings.room)?;

        let monitor = AvailabilityMonitor::new(
            source,
            Arc::clone(&self.store),
            submitter,
            Arc::clone(&self.events),
            settings.clone(),
        );
        let stats = monitor.stats_handle();
        let refresh = monitor.refresh_handle();

        self.events.emit(
            MonitorEvent::new(
                EventKind::MonitorStarted,
                format!("Monitoring room {}", settings.room),
            )
            .with_payload(serde_json::json!({
                "room": settings.room,
                "poll_interval_ms": settings.poll_interval.as_millis() as u64,
                "auto_registration": settings.auto_registration,
                "probe_workers": settings.probe_workers,
            })),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(shutdown_rx));
        info!(room = %settings.room, "Monitor task spawned");

        *running = Some(RunningMonitor {
            shutdown,
            handle,
            stats,
            refresh,
            settings: settings.clone(),
        });
        Ok(settings)
    }

    /// Signal the monitor to stop and wait for its final stats
    ///
    /// The task is aborted if it does not finish within the stop timeout.
    pub async fn stop(&self) -> SchedulerResult<MonitorStats> {
        let Some(current) = self.running.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        // Receiver gone means the task already returned
        let _ = current.shutdown.send(true);

        let RunningMonitor { mut handle, stats, .. } = current;
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(joined) => self.collect(joined),
            Err(_) => {
                warn!(timeout = ?self.stop_timeout, "Monitor did not stop in time, aborting");
                handle.abort();

                let mut last = read_stats(&stats);
                last.state = MonitorState::Stopped;
                last.stopped_at = Some(chrono::Utc::now());
                self.remember(last.clone());
                Ok(last)
            }
        }
    }

    pub async fn restart(&self, overrides: MonitorOverrides) -> SchedulerResult<MonitorSettings> {
        match self.stop().await {
            Ok(_) | Err(SchedulerError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start(overrides).await
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn status(&self) -> MonitorStatus {
        let running = self.running.lock().await;
        let events = self.events.stats();

        match running.as_ref() {
            Some(current) => {
                let stats = read_stats(&current.stats);
                MonitorStatus {
                    running: !current.handle.is_finished(),
                    state: stats.state,
                    room: current.settings.room.clone(),
                    poll_interval_ms: current.settings.poll_interval.as_millis() as u64,
                    auto_registration: current.settings.auto_registration,
                    stats: Some(stats),
                    events,
                }
            }
            None => MonitorStatus {
                running: false,
                state: MonitorState::Stopped,
                room: self.defaults.room.clone(),
                poll_interval_ms: self.defaults.poll_interval.as_millis() as u64,
                auto_registration: self.defaults.auto_registration,
                stats: self.last_run.lock().unwrap_or_else(|e| e.into_inner()).clone(),
                events,
            },
        }
    }

    /// Registrants still waiting for a booking, straight from the store
    pub async fn pending_count(&self) -> SchedulerResult<usize> {
        let pending = self.store.list_pending(None).await?;
        Ok(pending.len())
    }

    /// Wake the monitor and make it re-read registrants now
    pub async fn force_refresh(&self) -> SchedulerResult<()> {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(current) if !current.handle.is_finished() => {
                current.refresh.notify_one();
                Ok(())
            }
            _ => Err(SchedulerError::NotRunning),
        }
    }

    fn collect(
        &self,
        joined: Result<MonitorStats, tokio::task::JoinError>,
    ) -> SchedulerResult<MonitorStats> {
        match joined {
            Ok(stats) => {
                self.remember(stats.clone());
                Ok(stats)
            }
            Err(e) => Err(SchedulerError::task_failed(e.to_string())),
        }
    }

    fn remember(&self, stats: MonitorStats) {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(stats);
    }
}

/// Backend whose source and submitter are fixed up front
///
/// Ignores the requested room; useful when the halves are built elsewhere.
pub struct StaticBackend {
    source: Arc<dyn AvailabilitySource>,
    submitter: Arc<dyn RegistrationSubmitter>,
}

impl StaticBackend {
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        submitter: Arc<dyn RegistrationSubmitter>,
    ) -> Self {
        Self { source, submitter }
    }
}

impl MonitorBackend for StaticBackend {
    fn build(
        &self,
        _room: &str,
    ) -> SchedulerResult<(Arc<dyn AvailabilitySource>, Arc<dyn RegistrationSubmitter>)> {
        Ok((Arc::clone(&self.source), Arc::clone(&self.submitter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use crate::models::{DatepickerConstraints, Registrant, Slot};
    use crate::registration::SubmissionResult;
    use crate::storage::create_memory_store;
    use crate::utils::error::FetchError;
    use chrono::{NaiveDate, NaiveTime};

    struct QuietSource;

    #[async_trait]
    impl AvailabilitySource for QuietSource {
        fn room(&self) -> &str {
            "A1"
        }

        async fn fetch_constraints(&self) -> Result<DatepickerConstraints> {
            Ok(DatepickerConstraints::fallback(chrono::Local::now().date_naive()))
        }

        async fn probe_date(&self, _date: NaiveDate) -> std::result::Result<Vec<NaiveTime>, FetchError> {
            Ok(Vec::new())
        }
    }

    struct NeverSubmitter;

    #[async_trait]
    impl RegistrationSubmitter for NeverSubmitter {
        async fn register(&self, _r: &Registrant, _s: &Slot) -> SubmissionResult {
            unreachable!("no slots are ever offered")
        }
    }

    fn controller() -> MonitorController {
        let backend = StaticBackend::new(Arc::new(QuietSource), Arc::new(NeverSubmitter));
        MonitorController::new(
            Arc::new(backend),
            create_memory_store(),
            Arc::new(EventQueue::new(64)),
            MonitorSettings {
                standby_recheck: Duration::from_millis(20),
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let controller = controller();
        assert!(!controller.is_running().await);

        controller.start(MonitorOverrides::default()).await.unwrap();
        assert!(controller.is_running().await);
        assert!(matches!(
            controller.start(MonitorOverrides::default()).await,
            Err(SchedulerError::AlreadyRunning)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = controller.stop().await.unwrap();
        assert_eq!(stats.state, MonitorState::Stopped);
        assert!(stats.stopped_at.is_some());

        assert!(!controller.is_running().await);
        assert!(matches!(controller.stop().await, Err(SchedulerError::NotRunning)));

        let kinds: Vec<EventKind> = controller.events().snapshot().iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::MonitorStarted));
        assert_eq!(kinds.last(), Some(&EventKind::MonitorStopped));
    }

    #[tokio::test]
    async fn test_overrides_applied() {
        let controller = controller();
        let settings = controller
            .start(MonitorOverrides {
                room: Some("B2".into()),
                poll_interval_ms: Some(1000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(settings.room, "B2");

        let status = controller.status().await;
        assert!(status.running);
        assert_eq!(status.room, "B2");
        assert_eq!(status.poll_interval_ms, 1000);

        controller.stop().await.unwrap();
        let status = controller.status().await;
        assert!(!status.running);
        assert_eq!(status.room, "A1");
        assert!(status.stats.is_some());
    }

    #[tokio::test]
    async fn test_invalid_override_rejected() {
        let controller = controller();
        let result = controller
            .start(MonitorOverrides {
                room: Some("ABC".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::InvalidConfig { .. })));
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_force_refresh_requires_running_monitor() {
        let controller = controller();
        assert!(matches!(
            controller.force_refresh().await,
            Err(SchedulerError::NotRunning)
        ));

        controller.start(MonitorOverrides::default()).await.unwrap();
        controller.force_refresh().await.unwrap();
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_when_stopped() {
        let controller = controller();
        controller.restart(MonitorOverrides::default()).await.unwrap();
        assert!(controller.is_running().await);
        controller.restart(MonitorOverrides::default()).await.unwrap();
        assert!(controller.is_running().await);
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_count() {
        let controller = controller();
        assert_eq!(controller.pending_count().await.unwrap(), 0);
    }
}
