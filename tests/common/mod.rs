//! Common test utilities

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime, Utc};
use slotwatch::models::{ApplicationType, Citizenship, NewRegistrant, Registrant};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

/// Pending registrant with the given priority id and month
pub fn registrant(id: i64, month: u32) -> Registrant {
    Registrant {
        id,
        name: format!("Name{id}"),
        surname: "Testowy".to_string(),
        citizenship: Citizenship::Ukraine,
        email: format!("r{id}@example.com"),
        phone: "48123456789".to_string(),
        application_type: ApplicationType::Adult,
        desired_month: month,
        reservation_id: None,
        created_at: Utc::now(),
    }
}

/// Valid intake for the store
pub fn intake(n: usize, month: u32) -> NewRegistrant {
    NewRegistrant {
        name: format!("Anna{n}"),
        surname: "Kowalska".to_string(),
        citizenship: Citizenship::Belarus,
        email: format!("anna{n}@example.com"),
        phone: "48123456789".to_string(),
        application_type: ApplicationType::Adult,
        desired_month: month,
    }
}

/// Booking page with a datepicker window
pub fn booking_page(min: &str, max: &str, disabled: &[&str]) -> String {
    let disabled = disabled
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r##"<html><head><script>
        var disabledDays = [{disabled}];
        $(function() {{
            $("#datepicker").datepicker({{
                beforeShowDay: noWeekendsOrHolidays,
                minDate: new Date("{}"),
                maxDate: new Date("{}"),
            }});
        }});
        </script></head><body><form id="form"></form></body></html>"##,
        min.replace('-', "/"),
        max.replace('-', "/"),
    )
}

/// Probe fragment listing `times` for `room`
pub fn probe_fragment(room: &str, times: &[&str]) -> String {
    if times.is_empty() {
        return "<p>Brak wolnych godzin</p>".to_string();
    }
    times
        .iter()
        .map(|t| {
            format!(
                r#"<input type="radio" name="godzina" id="{room}{t}" value="{room}{t}"><label for="{room}{t}">{t}</label><br>"#
            )
        })
        .collect()
}

/// Confirmation page as the site renders it after a successful booking
pub fn confirmation_page(date: &str, time: &str, room: &str, code: &str) -> String {
    format!(
        r#"<html><body><table><tr><td>
        <p class="a">
            Dane rejestracyjne:&nbsp<t class='text'>Anna &nbsp Kowalska</t><br />
            Adres e-mail-<t class='text'>&nbspanna@example.com</t><br />
            Telefon-<t class='text'>&nbsp48123456789</t><br />
            Data rezerwacji,godzina,stanowisko-<br>
            <t class='text'>{date} &nbsp {time} &nbsp {room} pokoj 25</t><br />
            Obywatelstwo -<t class='text'>&nbspUkraina</t><br />
            Dotyczy -<t class='text'>&nbsposoba dorosła</t><br />
            Kod zgłoszenia-<t class='text'>&nbsp{code}</t><br />
        </p>
        </td></tr></table></body></html>"#
    )
}

pub const CAPTCHA_REJECTED_PAGE: &str =
    "<html><body><p>Kod z obrazka jest nieprawidłowy</p></body></html>";

pub const RESERVATION_ERROR_PAGE: &str =
    "<html><body><p>Błąd rezerwacji: termin jest już zajęty</p></body></html>";
