//! Candidate date derivation
//!
//! Turns the site window and the registrants' month preferences into the set
//! of dates worth probing, and drops same-day times nobody could still reach.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;

use crate::models::{DatepickerConstraints, Registrant};

/// Distinct desired months across pending registrants
pub fn target_months(registrants: &[Registrant]) -> BTreeSet<u32> {
    registrants
        .iter()
        .filter(|r| r.is_pending())
        .map(|r| r.desired_month)
        .collect()
}

/// Monday to Friday
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Dates in `[max(today, min_date), max_date]` that are business days, not
/// disabled and fall in one of `months`
///
/// Returns an empty list when `months` is empty.
pub fn candidate_dates(
    constraints: &DatepickerConstraints,
    today: NaiveDate,
    months: &BTreeSet<u32>,
) -> Vec<NaiveDate> {
    if months.is_empty() {
        return Vec::new();
    }

    let start = constraints.min_date.max(today);
    start
        .iter_days()
        .take_while(|d| *d <= constraints.max_date)
        .filter(|d| is_business_day(*d))
        .filter(|d| !constraints.is_disabled(*d))
        .filter(|d| months.contains(&d.month()))
        .collect()
}

/// Drop times on `date` that start less than `buffer` after `now`
///
/// `now` is the site-local wall clock. Future dates pass through untouched;
/// past dates yield nothing.
pub fn apply_same_day_cutoff(
    times: Vec<NaiveTime>,
    date: NaiveDate,
    now: NaiveDateTime,
    buffer: Duration,
) -> Vec<NaiveTime> {
    let today = now.date();
    if date > today {
        return times;
    }
    if date < today {
        return Vec::new();
    }

    let earliest = now + buffer;
    times
        .into_iter()
        .filter(|t| date.and_time(*t) >= earliest)
        .collect()
}

/// Current wall-clock time at the site
pub fn site_now(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn window(min: &str, max: &str, disabled: &[&str]) -> DatepickerConstraints {
        DatepickerConstraints {
            min_date: d(min),
            max_date: d(max),
            disabled: disabled.iter().map(|s| d(s)).collect(),
        }
    }

    #[test]
    fn test_empty_months_yield_no_dates() {
        let c = window("2025-08-01", "2025-09-30", &[]);
        assert!(candidate_dates(&c, d("2025-08-01"), &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_candidate_dates_filters() {
        // 2025-08-09/10 is a weekend, 2025-08-15 disabled
        let c = window("2025-08-04", "2025-09-05", &["2025-08-15"]);
        let months: BTreeSet<u32> = [8].into_iter().collect();

        let dates = candidate_dates(&c, d("2025-08-07"), &months);

        assert_eq!(dates.first(), Some(&d("2025-08-07")));
        assert_eq!(dates.last(), Some(&d("2025-08-29")));
        assert!(!dates.contains(&d("2025-08-09")));
        assert!(!dates.contains(&d("2025-08-10")));
        assert!(!dates.contains(&d("2025-08-15")));
        assert!(dates.iter().all(|d| d.month() == 8));
        assert!(dates.iter().all(|d| is_business_day(*d)));
    }

    #[test]
    fn test_candidate_dates_start_at_site_min() {
        let c = window("2025-08-12", "2025-08-14", &[]);
        let months: BTreeSet<u32> = [8].into_iter().collect();

        let dates = candidate_dates(&c, d("2025-08-01"), &months);
        assert_eq!(dates, vec![d("2025-08-12"), d("2025-08-13"), d("2025-08-14")]);
    }

    #[test]
    fn test_candidate_dates_window_in_past() {
        let c = window("2025-07-01", "2025-07-31", &[]);
        let months: BTreeSet<u32> = [7].into_iter().collect();
        assert!(candidate_dates(&c, d("2025-08-01"), &months).is_empty());
    }

    #[test]
    fn test_same_day_cutoff() {
        let now = d("2025-08-12").and_time(t("10:00"));
        let kept = apply_same_day_cutoff(
            vec![t("11:30"), t("13:00"), t("14:00")],
            d("2025-08-12"),
            now,
            Duration::minutes(180),
        );
        assert_eq!(kept, vec![t("13:00"), t("14:00")]);
    }

    #[test]
    fn test_same_day_cutoff_other_days() {
        let now = d("2025-08-12").and_time(t("10:00"));
        let buffer = Duration::minutes(180);

        let tomorrow = apply_same_day_cutoff(vec![t("08:00")], d("2025-08-13"), now, buffer);
        assert_eq!(tomorrow, vec![t("08:00")]);

        let yesterday = apply_same_day_cutoff(vec![t("15:00")], d("2025-08-11"), now, buffer);
        assert!(yesterday.is_empty());
    }

    #[test]
    fn test_target_months_skip_reserved() {
        use crate::models::{ApplicationType, Citizenship};

        let registrant = |id: i64, month: u32, reserved: bool| Registrant {
            id,
            name: "A".into(),
            surname: "B".into(),
            citizenship: Citizenship::Belarus,
            email: format!("{id}@x.pl"),
            phone: "1".into(),
            application_type: ApplicationType::Adult,
            desired_month: month,
            reservation_id: reserved.then(|| "R".to_string()),
            created_at: Utc::now(),
        };

        let months = target_months(&[
            registrant(1, 8, false),
            registrant(2, 9, true),
            registrant(3, 8, false),
            registrant(4, 10, false),
        ]);
        assert_eq!(months.into_iter().collect::<Vec<_>>(), vec![8, 10]);
    }
}
