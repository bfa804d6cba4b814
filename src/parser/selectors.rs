//! CSS selectors for the booking site's markup
//!
//! Every lookup keeps a list of fallbacks so a minor markup change on the
//! site degrades to the next selector instead of an empty result.

use lazy_static::lazy_static;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Probe fragment: selectable time inputs
    static ref SLOT_INPUTS: Vec<Selector> = vec![
        parse_selector!("input[type='radio'][name='godzina']"),
        parse_selector!("input[type='radio']"),
    ];

    static ref SLOT_LABELS: Vec<Selector> = vec![
        parse_selector!("label[for]"),
        parse_selector!("label"),
    ];

    // Confirmation page value cells
    static ref CONFIRMATION_FIELDS: Vec<Selector> = vec![
        parse_selector!("t.text"),
        parse_selector!("p.a t"),
        parse_selector!(".text"),
    ];
}

/// Selectors for the per-date probe fragment
pub struct SlotSelectors {
    pub inputs: &'static [Selector],
    pub labels: &'static [Selector],
}

impl SlotSelectors {
    pub fn new() -> Self {
        Self {
            inputs: &SLOT_INPUTS,
            labels: &SLOT_LABELS,
        }
    }
}

impl Default for SlotSelectors {
    fn default() -> Self {
        Self::new()
    }
}

/// Selectors for the registration confirmation page
pub struct ConfirmationSelectors {
    pub fields: &'static [Selector],
}

impl ConfirmationSelectors {
    pub fn new() -> Self {
        Self {
            fields: &CONFIRMATION_FIELDS,
        }
    }
}

impl Default for ConfirmationSelectors {
    fn default() -> Self {
        Self::new()
    }
}
