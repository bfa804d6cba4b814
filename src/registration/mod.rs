//! Booking submission
//!
//! Two layers:
//! - [`AttemptSubmitter`]: one booking attempt (fresh session, CAPTCHA,
//!   form submission, response classification)
//! - [`RegistrationSubmitter`]: the full registration for one assignment,
//!   implemented by [`RetryingSubmitter`] which repeats attempts while the
//!   site rejects the CAPTCHA
//!
//! A success is only ever reported once the confirmation page has been
//! parsed into a [`ReservationRecord`].

pub mod retrying;
pub mod site;

use async_trait::async_trait;

use crate::models::{Registrant, ReservationRecord, Slot};
use crate::utils::error::SubmitError;

pub use retrying::RetryingSubmitter;
pub use site::SiteSubmitter;

/// Classification of one booking attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Confirmation page parsed; the record reflects what the site confirmed
    Success(ReservationRecord),
    /// The site rejected the CAPTCHA answer
    CaptchaError,
    /// Slot taken or booking refused
    ReservationError(String),
    /// HTTP success but no known page shape
    Unclassified(String),
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::CaptchaError => "captcha_error",
            Self::ReservationError(_) => "reservation_error",
            Self::Unclassified(_) => "unclassified",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Performs a single booking attempt
#[async_trait]
pub trait AttemptSubmitter: Send + Sync {
    async fn attempt(
        &self,
        registrant: &Registrant,
        slot: &Slot,
    ) -> Result<AttemptOutcome, SubmitError>;
}

/// Final result of registering one assignment
#[derive(Debug)]
pub struct SubmissionResult {
    /// Last attempt's classification, or the error that ended the loop
    pub outcome: Result<AttemptOutcome, SubmitError>,
    /// Attempts made, CAPTCHA retries included
    pub attempts: u32,
}

impl SubmissionResult {
    pub fn reservation(&self) -> Option<&ReservationRecord> {
        match &self.outcome {
            Ok(AttemptOutcome::Success(record)) => Some(record),
            _ => None,
        }
    }

    /// Short label for metrics and events
    pub fn label(&self) -> &'static str {
        match &self.outcome {
            Ok(AttemptOutcome::CaptchaError) => "captcha_exhausted",
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        }
    }

    pub fn describe(&self) -> String {
        match &self.outcome {
            Ok(AttemptOutcome::Success(record)) => format!("reservation {}", record.id),
            Ok(AttemptOutcome::CaptchaError) => {
                format!("CAPTCHA rejected {} times", self.attempts)
            }
            Ok(AttemptOutcome::ReservationError(msg)) => format!("reservation error: {msg}"),
            Ok(AttemptOutcome::Unclassified(msg)) => format!("unclassified response: {msg}"),
            Err(e) => e.to_string(),
        }
    }
}

/// Registers one registrant for one slot, retries included
#[async_trait]
pub trait RegistrationSubmitter: Send + Sync {
    async fn register(&self, registrant: &Registrant, slot: &Slot) -> SubmissionResult;
}
