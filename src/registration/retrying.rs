//! CAPTCHA retry loop around single booking attempts
//!
//! State per registration: an attempt counter and the last classification.
//! `captcha_error` starts another attempt (fresh session, fresh image, new
//! answer) until `max_captcha_retries` extra attempts are spent; every other
//! classification ends the loop. Transport failures inside one attempt go
//! through the network backoff in [`crate::utils::retry`] first.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{AttemptOutcome, AttemptSubmitter, RegistrationSubmitter, SubmissionResult};
use crate::config::RegistrationConfig;
use crate::models::{Registrant, Slot};
use crate::utils::error::SubmitError;
use crate::utils::retry::{with_retry_if, RetryConfig};

pub struct RetryingSubmitter<S> {
    inner: S,
    max_captcha_retries: u32,
    network: RetryConfig,
}

impl<S: AttemptSubmitter> RetryingSubmitter<S> {
    pub fn new(inner: S, config: &RegistrationConfig) -> Self {
        Self::with_policy(inner, config.max_captcha_retries, RetryConfig::from(config))
    }

    pub fn with_policy(inner: S, max_captcha_retries: u32, network: RetryConfig) -> Self {
        Self {
            inner,
            max_captcha_retries,
            network,
        }
    }

    /// Attempts allowed per registration
    pub fn max_attempts(&self) -> u32 {
        self.max_captcha_retries + 1
    }
}

#[async_trait]
impl<S: AttemptSubmitter> RegistrationSubmitter for RetryingSubmitter<S> {
    async fn register(&self, registrant: &Registrant, slot: &Slot) -> SubmissionResult {
        let max_attempts = self.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = with_retry_if(
                &self.network,
                || self.inner.attempt(registrant, slot),
                SubmitError::is_network,
            )
            .await;

            match result {
                Ok(AttemptOutcome::CaptchaError) if attempts < max_attempts => {
                    debug!(
                        registrant_id = registrant.id,
                        attempt = attempts,
                        max_attempts,
                        "CAPTCHA rejected, retrying with a fresh session"
                    );
                }
                Ok(outcome) => {
                    match &outcome {
                        AttemptOutcome::Success(record) => info!(
                            registrant_id = registrant.id,
                            reservation = %record.id,
                            attempts,
                            "Registration confirmed"
                        ),
                        other => warn!(
                            registrant_id = registrant.id,
                            outcome = other.as_str(),
                            attempts,
                            "Registration failed"
                        ),
                    }
                    return SubmissionResult {
                        outcome: Ok(outcome),
                        attempts,
                    };
                }
                Err(e) => {
                    warn!(registrant_id = registrant.id, attempts, error = %e, "Registration aborted");
                    return SubmissionResult {
                        outcome: Err(e),
                        attempts,
                    };
                }
            }
        }
    }
}
