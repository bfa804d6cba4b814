//! Booking site access
//!
//! [`fetcher::SiteFetcher`] talks HTTP; [`AvailabilitySource`] is the seam the
//! monitor depends on so cycles can be driven without a network.

pub mod fetcher;
pub mod headers;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use crate::error::Result;
use crate::models::DatepickerConstraints;
use crate::parser::parse_constraints;
use crate::utils::error::FetchError;

pub use fetcher::{BookingForm, BookingSession, SiteFetcher};

/// Where the monitor learns about the site's window and free times
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Room the probes are issued for
    fn room(&self) -> &str;

    /// Fetch and parse the current datepicker window
    ///
    /// Returns `Error::Parse` when the page no longer exposes the window.
    async fn fetch_constraints(&self) -> Result<DatepickerConstraints>;

    /// Times currently offered on `date`
    async fn probe_date(&self, date: NaiveDate) -> std::result::Result<Vec<NaiveTime>, FetchError>;
}

#[async_trait]
impl AvailabilitySource for SiteFetcher {
    fn room(&self) -> &str {
        SiteFetcher::room(self)
    }

    async fn fetch_constraints(&self) -> Result<DatepickerConstraints> {
        let page = self.fetch_booking_page().await?;
        Ok(parse_constraints(&page)?)
    }

    async fn probe_date(&self, date: NaiveDate) -> std::result::Result<Vec<NaiveTime>, FetchError> {
        SiteFetcher::probe_date(self, date).await
    }
}
