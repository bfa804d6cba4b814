//! Single booking attempt against the live site

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AttemptOutcome, AttemptSubmitter};
use crate::captcha::CaptchaSolver;
use crate::crawler::{BookingForm, SiteFetcher};
use crate::models::{Registrant, ReservationRecord, Slot};
use crate::parser::{classify_response, ResponsePage};
use crate::utils::error::SubmitError;

/// Form payload for `registrant` booking `slot`
pub fn booking_form(registrant: &Registrant, slot: &Slot, captcha_code: String) -> BookingForm {
    BookingForm {
        name: registrant.name.clone(),
        surname: registrant.surname.clone(),
        citizenship: registrant.citizenship.display_name().to_string(),
        email: registrant.email.clone(),
        phone: registrant.phone.clone(),
        application_type: registrant.application_type.display_name().to_string(),
        date: slot.date,
        token: slot.token(),
        captcha_code,
    }
}

/// Map a classified response page onto an attempt outcome
pub fn outcome_from_page(page: ResponsePage, slot: &Slot) -> AttemptOutcome {
    match page {
        ResponsePage::Confirmation(fields) => {
            let record = ReservationRecord::from_confirmation(slot, fields);
            if record.date != slot.date || record.time != slot.time {
                warn!(
                    requested = %slot,
                    confirmed_date = %record.date,
                    confirmed_time = %record.time,
                    "Site confirmed a different date/time"
                );
            }
            AttemptOutcome::Success(record)
        }
        ResponsePage::CaptchaRejected => AttemptOutcome::CaptchaError,
        ResponsePage::ReservationError(text) => AttemptOutcome::ReservationError(text),
        ResponsePage::Unclassified(text) => AttemptOutcome::Unclassified(text),
    }
}

/// Submits through a fresh cookie-isolated session every attempt
pub struct SiteSubmitter {
    fetcher: Arc<SiteFetcher>,
    solver: Arc<dyn CaptchaSolver>,
}

impl SiteSubmitter {
    pub fn new(fetcher: Arc<SiteFetcher>, solver: Arc<dyn CaptchaSolver>) -> Self {
        Self { fetcher, solver }
    }
}

#[async_trait]
impl AttemptSubmitter for SiteSubmitter {
    async fn attempt(
        &self,
        registrant: &Registrant,
        slot: &Slot,
    ) -> Result<AttemptOutcome, SubmitError> {
        let session = self
            .fetcher
            .new_session()
            .map_err(|e| SubmitError::Session(e.to_string()))?;
        session.open().await?;

        let image = session.fetch_captcha().await?;
        let answer = self.solver.solve(&image).await?;

        let form = booking_form(registrant, slot, answer);
        let body = session.submit(&form).await?;

        let outcome = outcome_from_page(classify_response(&body), slot);
        debug!(
            registrant_id = registrant.id,
            slot = %slot,
            outcome = outcome.as_str(),
            "Booking attempt classified"
        );
        Ok(outcome)
    }
}
