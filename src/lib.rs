//! slotwatch - Appointment slot monitor
//!
//! Polls an appointment-booking site for newly opened time slots and books
//! them for pending registrants, highest priority first.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Booking site HTTP access (page, probes, booking sessions)
//! - [`parser`] - Datepicker window, probe fragments and response pages
//! - [`models`] - Registrants, slots, reservations
//! - [`captcha`] - CAPTCHA solving service client
//! - [`registration`] - Booking attempts with CAPTCHA retry
//! - [`scheduler`] - The availability monitor and its controller
//! - [`storage`] - Registrant store (SQLite, in-memory)
//! - [`notifications`] - Bounded event queue and delivery channels
//! - [`control`] - HTTP control surface
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use slotwatch::captcha::TrueCaptchaSolver;
//! use slotwatch::config::Config;
//! use slotwatch::notifications::EventQueue;
//! use slotwatch::scheduler::{MonitorController, MonitorOverrides, MonitorSettings, SiteBackend};
//! use slotwatch::storage::create_sqlite_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let solver = TrueCaptchaSolver::new(&config.captcha, config.request_timeout())?;
//!     let controller = MonitorController::new(
//!         Arc::new(SiteBackend::new(config.clone(), Arc::new(solver))),
//!         create_sqlite_store(&config.store.sqlite_path)?,
//!         Arc::new(EventQueue::new(config.events.queue_capacity)),
//!         MonitorSettings::from_config(&config)?,
//!     );
//!     controller.start(MonitorOverrides::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod captcha;
pub mod config;
pub mod control;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod registration;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{AvailabilitySource, SiteFetcher};
    pub use crate::error::{Error, ErrorCategory, Result, SlotwatchErrorTrait};
    pub use crate::models::{Registrant, ReservationRecord, Slot};
    pub use crate::notifications::{EventKind, EventPriority, EventQueue, MonitorEvent};
    pub use crate::scheduler::{MonitorController, MonitorState, MonitorStats};
    pub use crate::storage::{RegistrantStore, SharedRegistrantStore};
}

// Direct re-exports for convenience
pub use models::{Registrant, ReservationRecord, Slot};
