//! HTTP client for the booking site
//!
//! This module wraps every request the monitor makes against the site:
//! - Booking page fetch (datepicker window)
//! - Per-date AJAX probe
//! - Fresh booking sessions (CAPTCHA image + form submission)
//!
//! Every request carries the configured timeout. Probes issued outside the
//! monitor's bounded pool are paced by a governor rate limiter.

use crate::config::SiteConfig;
use crate::crawler::headers::{build_page_headers, build_probe_headers, random_user_agent};
use crate::models::SlotToken;
use crate::parser::parse_slot_times;
use crate::utils::error::FetchError;
use chrono::{NaiveDate, NaiveTime};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, Response};
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

/// Page serving the CAPTCHA image (also opens the PHP session)
pub const CAPTCHA_PATH: &str = "securimage/securimage_show.php";

/// Booking form target
pub const SUBMIT_PATH: &str = "send.php";

/// Form field carrying the probed date
pub const PROBE_FIELD: &str = "godzina";

/// Booking form fields, submitted as-is to `send.php`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingForm {
    pub name: String,
    pub surname: String,
    pub citizenship: String,
    pub email: String,
    pub phone: String,
    pub application_type: String,
    pub date: NaiveDate,
    pub token: SlotToken,
    pub captcha_code: String,
}

impl BookingForm {
    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("imie", self.name.clone()),
            ("nazwisko", self.surname.clone()),
            ("obywatelstwo", self.citizenship.clone()),
            ("email", self.email.clone()),
            ("telefon", self.phone.clone()),
            ("rodzaj_wizyty", self.application_type.clone()),
            ("datepicker", self.date.format("%Y-%m-%d").to_string()),
            ("godzina", self.token.to_string()),
            ("captcha_code", self.captcha_code.clone()),
        ]
    }
}

/// Booking site client
pub struct SiteFetcher {
    /// Shared client used for page fetches and probes
    client: Client,

    /// Paces probes issued outside the monitor's worker pool
    pacer: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    base_url: Url,
    room: String,
    timeout: Duration,
    user_agent: Option<String>,
}

impl SiteFetcher {
    /// Create a fetcher from site configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` for a malformed base URL and
    /// `FetchError::Http` if the HTTP client cannot be created
    pub fn new(site: &SiteConfig, sequential_delay: Duration) -> Result<Self, FetchError> {
        let mut fetcher = Self::with_base_url(
            &site.base_url,
            &site.room,
            Duration::from_secs(site.request_timeout_secs),
        )?;
        fetcher.user_agent = site.user_agent.clone();
        fetcher.pacer = build_pacer(sequential_delay);
        Ok(fetcher)
    }

    /// Create a fetcher against an arbitrary base URL (mock servers in tests)
    pub fn with_base_url(base_url: &str, room: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            client: build_client(timeout)?,
            pacer: build_pacer(Duration::from_millis(200)),
            base_url,
            room: room.to_string(),
            timeout,
            user_agent: None,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Per-room booking page, e.g. `pokoj_A1.php`
    pub fn booking_page_url(&self) -> Result<Url, FetchError> {
        self.join(&format!("pokoj_{}.php", self.room))
    }

    /// Per-room probe endpoint, e.g. `godziny_pokoj_A1.php`
    pub fn probe_url(&self) -> Result<Url, FetchError> {
        self.join(&format!("godziny_pokoj_{}.php", self.room))
    }

    fn join(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))
    }

    // The closure keeps the fallback from forcing the borrow to 'static
    #[allow(clippy::redundant_closure)]
    fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_else(|| random_user_agent())
    }

    /// Fetch the booking page HTML
    pub async fn fetch_booking_page(&self) -> Result<String, FetchError> {
        let url = self.booking_page_url()?;
        let headers = build_page_headers(self.user_agent(), self.base_url.as_str());

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        read_text(response).await
    }

    /// Probe one date and return the times the site offers
    ///
    /// Called from inside the bounded pool, so no pacing is applied here.
    pub async fn probe_date(&self, date: NaiveDate) -> Result<Vec<NaiveTime>, FetchError> {
        let url = self.probe_url()?;
        let headers = build_probe_headers(self.user_agent(), self.base_url.as_str());
        let day = date.format("%Y-%m-%d").to_string();

        let response = self
            .client
            .post(url)
            .headers(headers)
            .form(&[(PROBE_FIELD, day.as_str())])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let body = read_text(response).await?;
        Ok(parse_slot_times(&body))
    }

    /// Probe one date after waiting for the pacing limiter
    pub async fn probe_date_paced(&self, date: NaiveDate) -> Result<Vec<NaiveTime>, FetchError> {
        self.pacer.until_ready().await;
        self.probe_date(date).await
    }

    /// Open a fresh booking session with its own cookie jar
    pub fn new_session(&self) -> Result<BookingSession, FetchError> {
        Ok(BookingSession {
            client: build_client(self.timeout)?,
            base_url: self.base_url.clone(),
            page_url: self.booking_page_url()?,
            user_agent: self.user_agent().to_string(),
        })
    }
}

/// One cookie-isolated booking attempt against the site
pub struct BookingSession {
    client: Client,
    base_url: Url,
    page_url: Url,
    user_agent: String,
}

impl BookingSession {
    /// Load the booking page so the site issues a session cookie
    pub async fn open(&self) -> Result<(), FetchError> {
        let headers = build_page_headers(&self.user_agent, self.base_url.as_str());
        let response = self
            .client
            .get(self.page_url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        read_text(response).await.map(|_| ())
    }

    /// Download the CAPTCHA image bound to this session
    pub async fn fetch_captcha(&self) -> Result<Vec<u8>, FetchError> {
        let url = self
            .base_url
            .join(CAPTCHA_PATH)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let headers = build_page_headers(&self.user_agent, self.page_url.as_str());

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let response = check_status(response)?;
        let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
        if bytes.is_empty() {
            return Err(FetchError::Decode("empty CAPTCHA image".to_string()));
        }
        Ok(bytes.to_vec())
    }

    /// Submit the booking form and return the raw response body
    pub async fn submit(&self, form: &BookingForm) -> Result<String, FetchError> {
        let url = self
            .base_url
            .join(SUBMIT_PATH)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let headers = build_page_headers(&self.user_agent, self.page_url.as_str());

        let response = self
            .client
            .post(url)
            .headers(headers)
            .form(&form.fields())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        read_text(response).await
    }
}

fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .cookie_store(true)
        .build()?)
}

fn build_pacer(delay: Duration) -> RateLimiter<NotKeyed, InMemoryState, DefaultClock> {
    let quota = Quota::with_period(delay.max(Duration::from_millis(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN);
    RateLimiter::direct(quota)
}

fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.as_u16() == 429 {
        Err(FetchError::RateLimit)
    } else {
        Err(FetchError::ServerError(status.as_u16()))
    }
}

async fn read_text(response: Response) -> Result<String, FetchError> {
    let response = check_status(response)?;
    let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> SiteFetcher {
        SiteFetcher::with_base_url("https://example.org/booking/", "A2", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let f = fetcher();
        assert_eq!(
            f.booking_page_url().unwrap().as_str(),
            "https://example.org/booking/pokoj_A2.php"
        );
        assert_eq!(
            f.probe_url().unwrap().as_str(),
            "https://example.org/booking/godziny_pokoj_A2.php"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = SiteFetcher::with_base_url("not a url", "A1", Duration::from_secs(5));
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_configured_user_agent_is_used() {
        let mut f = fetcher();
        f.user_agent = Some("slotwatch-test/1.0".to_string());
        assert_eq!(f.user_agent(), "slotwatch-test/1.0");

        let session = f.new_session().unwrap();
        assert_eq!(session.user_agent, "slotwatch-test/1.0");
    }

    #[test]
    fn test_random_user_agent_without_override() {
        assert!(!fetcher().user_agent().is_empty());
    }

    #[test]
    fn test_booking_form_fields() {
        let form = BookingForm {
            name: "Anna".into(),
            surname: "Kowalska".into(),
            citizenship: "Ukraina".into(),
            email: "anna@example.com".into(),
            phone: "48123456789".into(),
            application_type: "osoba dorosła".into(),
            date: NaiveDate::from_ymd_opt(2025, 8, 12).unwrap(),
            token: SlotToken::new("A2", NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            captcha_code: "x7k2".into(),
        };

        let fields = form.fields();
        assert!(fields.contains(&("godzina", "A209:00".to_string())));
        assert!(fields.contains(&("datepicker", "2025-08-12".to_string())));
        assert!(fields.contains(&("captcha_code", "x7k2".to_string())));
        assert_eq!(fields.len(), 9);
    }

    #[test]
    fn test_session_creation() {
        assert!(fetcher().new_session().is_ok());
    }
}
