//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// A monitor is already running in this controller
    AlreadyRunning,

    /// No monitor is running
    NotRunning,

    /// Monitor configuration rejected
    InvalidConfig {
        field: String,
        reason: String,
    },

    /// The monitor task panicked or could not be joined
    TaskFailed {
        reason: String,
    },

    /// Registrant store could not be queried
    StoreUnavailable {
        operation: String,
        reason: String,
    },

    /// Invalid timezone
    InvalidTimezone {
        tz: String,
    },

    /// IO error
    IoError {
        operation: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "Monitor is already running"),
            Self::NotRunning => write!(f, "Monitor is not running"),
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid monitor config '{}': {}", field, reason)
            }
            Self::TaskFailed { reason } => {
                write!(f, "Monitor task failed: {}", reason)
            }
            Self::StoreUnavailable { operation, reason } => {
                write!(f, "Store unavailable during '{}': {}", operation, reason)
            }
            Self::InvalidTimezone { tz } => {
                write!(f, "Invalid timezone: {}", tz)
            }
            Self::IoError { operation, reason } => {
                write!(f, "IO error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<crate::utils::error::StoreError> for SchedulerError {
    fn from(err: crate::utils::error::StoreError) -> Self {
        Self::StoreUnavailable {
            operation: "query".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a task failure error
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }

    /// Create a store error with context
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::IoError { .. } | Self::TaskFailed { .. }
        )
    }
}
