//! Per-date probe fragment parsing
//!
//! The probe endpoint answers with a small HTML fragment: either a
//! "no slots" notice or a list of radio inputs with `HH:MM` labels.

use chrono::NaiveTime;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::SlotToken;
use crate::parser::selectors::SlotSelectors;

/// Marker the site prints when a date has no free times
pub const NO_SLOTS_MARKER: &str = "brak";

fn time_regex() -> &'static Regex {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    TIME_RE.get_or_init(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("Invalid regex pattern"))
}

/// Extract the bookable times from a probe fragment, in page order
///
/// Never fails: unexpected markup yields an empty list.
pub fn parse_slot_times(fragment: &str) -> Vec<NaiveTime> {
    if fragment.trim().is_empty() || fragment.to_lowercase().contains(NO_SLOTS_MARKER) {
        return Vec::new();
    }

    let document = Html::parse_fragment(fragment);
    let selectors = SlotSelectors::new();

    let inputs: Vec<ElementRef> = selectors
        .inputs
        .iter()
        .map(|sel| document.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let selectable: Vec<ElementRef> = inputs
        .into_iter()
        .filter(|input| input.value().attr("disabled").is_none())
        .collect();

    if selectable.is_empty() {
        return Vec::new();
    }

    let ids: HashSet<&str> = selectable
        .iter()
        .filter_map(|input| input.value().attr("id"))
        .collect();

    let mut times = Vec::new();

    for sel in selectors.labels {
        for label in document.select(sel) {
            let Some(target) = label.value().attr("for") else {
                continue;
            };
            if !ids.contains(target) {
                continue;
            }
            let text: String = label.text().collect();
            if let Some(time) = extract_time(&text) {
                times.push(time);
            }
        }
        if !times.is_empty() {
            break;
        }
    }

    // Labels missing or unlabeled: fall back to the submitted token value
    if times.is_empty() {
        times = selectable
            .iter()
            .filter_map(|input| input.value().attr("value"))
            .filter_map(|value| {
                SlotToken::parse(value)
                    .ok()
                    .map(|token| token.time)
                    .or_else(|| extract_time(value))
            })
            .collect();
    }

    dedup_preserving_order(times)
}

fn extract_time(text: &str) -> Option<NaiveTime> {
    let caps = time_regex().captures(text.trim())?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn dedup_preserving_order(times: Vec<NaiveTime>) -> Vec<NaiveTime> {
    let mut seen = HashSet::new();
    times.into_iter().filter(|t| seen.insert(*t)).collect()
}
