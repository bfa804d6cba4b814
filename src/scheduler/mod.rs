//! Availability monitoring and slot assignment
//!
//! This module drives the polling loop that watches the booking site and
//! hands open slots to pending registrants.
//!
//! # Overview
//!
//! Each active cycle reads the site's datepicker window, derives the dates
//! worth probing for the months registrants asked for, probes them through a
//! bounded worker pool, and compares the result with the previous cycle.
//! When slots are open, they are distributed to registrants by priority and
//! submitted concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     MonitorController                        │
//! │        start / stop / restart / status / force_refresh       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ spawns
//!                         ┌──────▼──────┐
//!                         │ Availability│──── events ───▶ EventQueue
//!                         │   Monitor   │
//!                         └──────┬──────┘
//!            ┌───────────────────┼────────────────────┐
//!            ▼                   ▼                    ▼
//!     ┌────────────┐     ┌──────────────┐     ┌──────────────┐
//!     │   dates    │     │   snapshot   │     │ distribution │
//!     │ candidates │     │   + diffs    │     │  by priority │
//!     └────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`dates`] - Candidate dates, business days, same-day cutoff
//! - [`snapshot`] - Per-date availability and cycle-to-cycle changes
//! - [`distribution`] - Deterministic slot-to-registrant assignment
//! - [`monitor`] - The polling state machine
//! - [`controller`] - Lifecycle control over one monitor task
//!
//! # Quick Start
//!
//! ```ignore
//! use slotwatch::scheduler::{MonitorController, MonitorOverrides, SiteBackend};
//!
//! let controller = MonitorController::new(backend, store, events, settings);
//! controller.start(MonitorOverrides::default()).await?;
//!
//! let status = controller.status().await;
//! println!("{} ({} pending)", status.state, controller.pending_count().await?);
//!
//! let stats = controller.stop().await?;
//! println!("{} cycles, {} bookings", stats.cycles, stats.registrations_succeeded);
//! ```
//!
//! # Timing
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval_ms` | 500 | Wait between active cycles |
//! | `standby_recheck_secs` | 600 | Registrant check period in standby |
//! | `registrant_recheck_secs` | 10 | Registrant refresh period while active |
//! | `probe_workers` | 8 | Concurrent date probes |
//! | `same_day_buffer_mins` | 180 | Minimum lead time for same-day slots |

pub mod controller;
pub mod dates;
pub mod distribution;
pub mod error;
pub mod monitor;
pub mod snapshot;

// Re-export main types
pub use controller::{
    MonitorBackend, MonitorController, MonitorOverrides, MonitorStatus, SiteBackend,
    StaticBackend, DEFAULT_STOP_TIMEOUT,
};
pub use dates::{apply_same_day_cutoff, candidate_dates, is_business_day, site_now, target_months};
pub use distribution::{distribute, Assignment};
pub use error::{SchedulerError, SchedulerResult};
pub use monitor::{
    read_stats, AvailabilityMonitor, MonitorSettings, MonitorState, MonitorStats, SharedStats,
};
pub use snapshot::{AvailabilityChange, AvailabilitySnapshot};
