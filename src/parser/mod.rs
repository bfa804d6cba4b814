//! Booking site markup parsing
//!
//! Pure functions from page markup to structured values:
//!
//! - [`slots`] - times offered by the per-date probe fragment
//! - [`datepicker`] - scheduling window embedded in the booking page
//! - [`confirmation`] - classification of the booking form response

pub mod confirmation;
pub mod datepicker;
pub mod selectors;
pub mod slots;

pub use confirmation::{classify_response, parse_confirmation, ResponsePage};
pub use datepicker::parse_constraints;
pub use slots::parse_slot_times;
