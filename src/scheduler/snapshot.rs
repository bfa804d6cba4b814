//! Per-date availability snapshots and their differences between cycles

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::Slot;

/// Times seen per date in one polling cycle; dates without times are not kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    dates: BTreeMap<NaiveDate, Vec<NaiveTime>>,
}

/// How one date changed between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AvailabilityChange {
    NewlyAvailable {
        date: NaiveDate,
        times: Vec<NaiveTime>,
    },
    Updated {
        date: NaiveDate,
        added: Vec<NaiveTime>,
        removed: Vec<NaiveTime>,
    },
    NoLongerAvailable {
        date: NaiveDate,
    },
}

impl AvailabilityChange {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::NewlyAvailable { date, .. }
            | Self::Updated { date, .. }
            | Self::NoLongerAvailable { date } => *date,
        }
    }
}

fn join_times(times: &[NaiveTime]) -> String {
    times
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Display for AvailabilityChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewlyAvailable { date, times } => {
                write!(f, "{date}: newly available {}", join_times(times))
            }
            Self::Updated {
                date,
                added,
                removed,
            } => write!(
                f,
                "{date}: added [{}] removed [{}]",
                join_times(added),
                join_times(removed)
            ),
            Self::NoLongerAvailable { date } => write!(f, "{date}: no longer available"),
        }
    }
}

impl AvailabilitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the times seen on `date`, sorted and deduplicated
    pub fn insert(&mut self, date: NaiveDate, times: Vec<NaiveTime>) {
        let times: BTreeSet<_> = times.into_iter().collect();
        if times.is_empty() {
            self.dates.remove(&date);
        } else {
            self.dates.insert(date, times.into_iter().collect());
        }
    }

    /// Copy `dates` entries over from `previous` (dates whose probe failed)
    pub fn carry_over(&mut self, previous: &Self, dates: &[NaiveDate]) {
        for date in dates {
            if let Some(times) = previous.dates.get(date) {
                self.dates.insert(*date, times.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn total_slots(&self) -> usize {
        self.dates.values().map(Vec::len).sum()
    }

    pub fn times(&self, date: NaiveDate) -> Option<&[NaiveTime]> {
        self.dates.get(&date).map(Vec::as_slice)
    }

    pub fn as_map(&self) -> &BTreeMap<NaiveDate, Vec<NaiveTime>> {
        &self.dates
    }

    /// Flatten into slots for `room`, ordered by date and time
    pub fn slots(&self, room: &str) -> Vec<Slot> {
        self.dates
            .iter()
            .flat_map(|(date, times)| times.iter().map(move |t| Slot::new(*date, *t, room)))
            .collect()
    }

    /// Per-date changes needed to go from `self` to `newer`
    pub fn diff(&self, newer: &Self) -> Vec<AvailabilityChange> {
        let dates: BTreeSet<_> = self.dates.keys().chain(newer.dates.keys()).copied().collect();

        dates
            .into_iter()
            .filter_map(|date| match (self.dates.get(&date), newer.dates.get(&date)) {
                (None, Some(times)) => Some(AvailabilityChange::NewlyAvailable {
                    date,
                    times: times.clone(),
                }),
                (Some(_), None) => Some(AvailabilityChange::NoLongerAvailable { date }),
                (Some(old), Some(new)) if old != new => Some(AvailabilityChange::Updated {
                    date,
                    added: new.iter().filter(|t| !old.contains(t)).copied().collect(),
                    removed: old.iter().filter(|t| !new.contains(t)).copied().collect(),
                }),
                _ => None,
            })
            .collect()
    }
}
