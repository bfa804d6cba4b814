//! Booking page datepicker extraction
//!
//! The booking page configures its jQuery datepicker inline:
//!
//! ```text
//! var disabledDays = ["2025-08-15", "2025-11-11"];
//! ...
//! minDate: new Date("2025/08/01"),
//! maxDate: new Date("2025/10/31"),
//! ```

use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::models::DatepickerConstraints;
use crate::utils::error::ParseError;

struct Patterns {
    disabled_block: Regex,
    quoted_date: Regex,
    min_date: Regex,
    max_date: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        disabled_block: Regex::new(r"(?s)var\s+disabledDays\s*=\s*\[(.*?)\];")
            .expect("Invalid regex pattern"),
        quoted_date: Regex::new(r#""(\d{4}-\d{2}-\d{2})""#).expect("Invalid regex pattern"),
        min_date: Regex::new(r#"minDate:\s*new Date\("(\d{4}/\d{2}/\d{2})"\)"#)
            .expect("Invalid regex pattern"),
        max_date: Regex::new(r#"maxDate:\s*new Date\("(\d{4}/\d{2}/\d{2})"\)"#)
            .expect("Invalid regex pattern"),
    })
}

/// Extract the site's scheduling window from the booking page
///
/// A missing `disabledDays` array is tolerated (empty set); missing
/// `minDate`/`maxDate` is an extraction error.
pub fn parse_constraints(page: &str) -> Result<DatepickerConstraints, ParseError> {
    let p = patterns();

    let min_date = capture_date(&p.min_date, page, "minDate")?;
    let max_date = capture_date(&p.max_date, page, "maxDate")?;

    if max_date < min_date {
        return Err(ParseError::DatepickerConfig(format!(
            "maxDate {max_date} precedes minDate {min_date}"
        )));
    }

    let mut disabled = BTreeSet::new();
    if let Some(block) = p.disabled_block.captures(page).and_then(|c| c.get(1)) {
        for caps in p.quoted_date.captures_iter(block.as_str()) {
            let raw = &caps[1];
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ParseError::InvalidDate(raw.to_string()))?;
            disabled.insert(date);
        }
    }

    Ok(DatepickerConstraints {
        min_date,
        max_date,
        disabled,
    })
}

fn capture_date(re: &Regex, page: &str, field: &str) -> Result<NaiveDate, ParseError> {
    let raw = re
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ParseError::DatepickerConfig(format!("{field} not found")))?;

    NaiveDate::parse_from_str(raw, "%Y/%m/%d").map_err(|_| ParseError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const PAGE: &str = r##"
        <script>
        var disabledDays = ["2025-08-15", "2025-08-18",
            "2025-11-11"];
        $(function() {
            $("#datepicker").datepicker({
                beforeShowDay: noWeekendsOrHolidays,
                minDate: new Date("2025/08/01"),
                maxDate: new Date("2025/10/31"),
            });
        });
        </script>
    "##;

    #[test]
    fn test_parse_constraints() {
        let c = parse_constraints(PAGE).unwrap();
        assert_eq!(c.min_date, d("2025-08-01"));
        assert_eq!(c.max_date, d("2025-10-31"));
        assert_eq!(c.disabled.len(), 3);
        assert!(c.is_disabled(d("2025-11-11")));
    }

    #[test]
    fn test_missing_disabled_days_is_empty() {
        let page = r#"minDate: new Date("2025/08/01"), maxDate: new Date("2025/08/29")"#;
        let c = parse_constraints(page).unwrap();
        assert!(c.disabled.is_empty());
    }

    #[test]
    fn test_missing_window_is_error() {
        let err = parse_constraints("<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, ParseError::DatepickerConfig(_)));

        let page = r#"minDate: new Date("2025/08/01")"#;
        assert!(parse_constraints(page).is_err());
    }

    #[test]
    fn test_invalid_date_literal() {
        let page = r#"minDate: new Date("2025/13/01"), maxDate: new Date("2025/12/01")"#;
        assert!(matches!(
            parse_constraints(page),
            Err(ParseError::InvalidDate(_))
        ));
    }
}
