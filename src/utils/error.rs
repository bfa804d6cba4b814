//! Error types for the site client, parsers and registrant store
//!
//! This module defines the domain error enums used throughout the application.

use thiserror::Error;

/// Errors that can occur while talking to the booking site or the CAPTCHA service
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Network failures are transient and worth another try
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimit | Self::Timeout => true,
            Self::ServerError(status) => is_retryable_status(*status),
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// Classify a reqwest error, separating timeouts from other failures
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Throttling and gateway/server failures; never other 4xx client errors
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Errors that can occur while extracting data from site markup
#[derive(Error, Debug)]
pub enum ParseError {
    /// The booking page no longer exposes the datepicker window
    #[error("Datepicker configuration not found: {0}")]
    DatepickerConfig(String),

    /// A date literal could not be parsed
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A slot token did not have the room+time shape
    #[error("Invalid slot token: {0}")]
    InvalidToken(String),

    /// Confirmation page was recognised but its fields were incomplete
    #[error("Malformed confirmation: {0}")]
    MalformedConfirmation(String),
}

/// Errors raised while preparing a booking attempt
#[derive(Error, Debug)]
pub enum SubmitError {
    /// Transport failure while talking to the site
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// CAPTCHA recognition service failed or returned no text
    #[error("CAPTCHA service error: {0}")]
    CaptchaService(String),

    /// Could not establish a session with the site
    #[error("Session acquisition failed: {0}")]
    Session(String),
}

impl SubmitError {
    /// Only transport failures are retried by the network backoff loop
    pub fn is_network(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::CaptchaService(_) | Self::Session(_) => false,
        }
    }
}

/// Errors raised by the registrant store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row not found
    #[error("Registrant not found: {0}")]
    NotFound(i64),

    /// Unique constraint violated (duplicate email or reservation)
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// Input rejected before reaching the store
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Lock poisoned or background task failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Registrant intake validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Invalid email: {0}")]
    Email(String),

    #[error("Phone must contain digits only: {0}")]
    Phone(String),

    #[error("Month must be between 1 and 12, got {0}")]
    Month(u32),

    #[error("Unknown citizenship: {0}")]
    Citizenship(String),

    #[error("Unknown application type: {0}")]
    ApplicationType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_recoverable() {
        assert!(FetchError::Timeout.is_recoverable());
        assert!(FetchError::ServerError(503).is_recoverable());
        assert!(!FetchError::InvalidUrl("x".into()).is_recoverable());
    }

    #[test]
    fn test_client_errors_not_recoverable() {
        assert!(FetchError::ServerError(502).is_recoverable());
        assert!(!FetchError::ServerError(404).is_recoverable());
        assert!(!FetchError::ServerError(403).is_recoverable());
        assert!(!SubmitError::Fetch(FetchError::ServerError(400)).is_network());
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_submit_error_network() {
        assert!(SubmitError::Fetch(FetchError::Timeout).is_network());
        assert!(!SubmitError::CaptchaService("no result".into()).is_network());
    }

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::TooLong {
            field: "name",
            max: 15,
        };
        assert_eq!(err.to_string(), "name must be at most 15 characters");
        assert!(ValidationError::Month(13).to_string().contains("13"));
    }
}
