//! Booking form response classification
//!
//! `send.php` answers with one of three known pages. Anything else is
//! reported as unclassified and must never be mistaken for a booking.

use chrono::{NaiveDate, NaiveTime};
use scraper::Html;

use crate::models::ConfirmedFields;
use crate::parser::selectors::ConfirmationSelectors;
use crate::utils::error::ParseError;
use crate::utils::normalize_whitespace;

pub const CONFIRMATION_MARKER: &str = "Kod zgłoszenia";
pub const CONFIRMATION_HEADER: &str = "Dane rejestracyjne";
pub const BAD_CAPTCHA_MARKER: &str = "nieprawidłowy";
pub const RESERVATION_ERROR_MARKER: &str = "Błąd rezerwacji";

/// What the booking form response turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePage {
    Confirmation(ConfirmedFields),
    CaptchaRejected,
    ReservationError(String),
    Unclassified(String),
}

/// Classify a `send.php` response body
pub fn classify_response(body: &str) -> ResponsePage {
    if body.contains(CONFIRMATION_MARKER) || body.contains(CONFIRMATION_HEADER) {
        return match parse_confirmation(body) {
            Ok(fields) => ResponsePage::Confirmation(fields),
            Err(e) => ResponsePage::Unclassified(e.to_string()),
        };
    }

    if body.to_lowercase().contains(BAD_CAPTCHA_MARKER) {
        return ResponsePage::CaptchaRejected;
    }

    if body.contains(RESERVATION_ERROR_MARKER) {
        return ResponsePage::ReservationError(visible_text(body));
    }

    ResponsePage::Unclassified(visible_text(body))
}

/// Parse the confirmation page fields
///
/// The page lists its values in fixed order: full name, email, phone,
/// "date time room", citizenship, application type, registration code.
pub fn parse_confirmation(body: &str) -> Result<ConfirmedFields, ParseError> {
    let document = Html::parse_document(body);
    let selectors = ConfirmationSelectors::new();

    let values: Vec<String> = selectors
        .fields
        .iter()
        .map(|sel| {
            document
                .select(sel)
                .map(|el| clean(&el.text().collect::<String>()))
                .collect::<Vec<_>>()
        })
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    if values.len() < 4 {
        return Err(ParseError::MalformedConfirmation(format!(
            "expected at least 4 fields, found {}",
            values.len()
        )));
    }

    let mut fields = ConfirmedFields::default();

    let mut names = values[0].splitn(2, ' ');
    fields.name = names.next().map(str::to_string).filter(|s| !s.is_empty());
    fields.surname = names.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    fields.email = non_empty(&values[1]);
    fields.phone = non_empty(&values[2]);

    let mut appointment = values[3].splitn(3, ' ');
    fields.date = appointment
        .next()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
    fields.time = appointment
        .next()
        .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok());
    fields.room_label = appointment.next().and_then(non_empty);

    fields.citizenship = values.get(4).and_then(|s| non_empty(s));
    fields.application_type = values.get(5).and_then(|s| non_empty(s));
    fields.registration_code = values.get(6).and_then(|s| non_empty(s));

    if fields.date.is_none() || fields.time.is_none() {
        return Err(ParseError::MalformedConfirmation(format!(
            "unparseable appointment '{}'",
            values[3]
        )));
    }

    Ok(fields)
}

fn clean(text: &str) -> String {
    normalize_whitespace(&text.replace('\u{a0}', " ").replace("&nbsp", " "))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn visible_text(body: &str) -> String {
    let document = Html::parse_document(body);
    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    crate::utils::truncate_text(&normalize_whitespace(&text), 200)
}
