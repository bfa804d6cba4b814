//! Crate-wide error type
//!
//! Each layer keeps its own enum ([`FetchError`], [`ParseError`],
//! [`SubmitError`], [`StoreError`], [`SchedulerError`]). [`Error`] wraps them
//! for the seams that can fail in more than one way, such as reading the
//! booking page window (network or markup).
//!
//! ```rust,ignore
//! use slotwatch::error::{Error, SlotwatchErrorTrait};
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(error = %err, "will retry next cycle");
//!     } else {
//!         tracing::error!(category = %err.category(), priority = %err.event_priority(), "{err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::notifications::EventPriority;

pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{FetchError, ParseError, StoreError, SubmitError, ValidationError};

pub trait SlotwatchErrorTrait: std::error::Error {
    /// Worth retrying later without operator action
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;

    /// Priority of the event raised when the monitor reports this error
    ///
    /// Markup, storage and configuration problems need an operator; network
    /// trouble usually clears up on its own.
    fn event_priority(&self) -> EventPriority {
        match self.category() {
            ErrorCategory::Config | ErrorCategory::Parsing | ErrorCategory::Storage => {
                EventPriority::Critical
            }
            _ => EventPriority::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP failures, timeouts, throttling
    Network,
    /// Booking site markup no longer matches
    Parsing,
    Captcha,
    /// Booking rejected or unclassified by the site
    Booking,
    Storage,
    Config,
    Scheduler,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Captcha => "captcha",
            Self::Booking => "booking",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid registrant: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SlotwatchErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Parse(_) => false,
            Self::Submit(e) => e.is_network(),
            Self::Store(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Validation(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Submit(e) => match e {
                SubmitError::Fetch(_) => ErrorCategory::Network,
                SubmitError::CaptchaService(_) => ErrorCategory::Captcha,
                SubmitError::Session(_) => ErrorCategory::Booking,
            },
            Self::Store(StoreError::Validation(_)) | Self::Validation(_) => ErrorCategory::Config,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Scheduler(SchedulerError::StoreUnavailable { .. }) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
