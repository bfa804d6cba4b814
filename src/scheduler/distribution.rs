//! Priority distribution of discovered slots
//!
//! Each month is handled on its own: registrants desiring that month are
//! ordered by ascending id, that month's slots by `(date, time)`, and the two
//! lists are zipped positionally. A high-priority registrant in a month with
//! few slots is not boosted relative to other months.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Registrant, Slot};

type SlotKey<'a> = (NaiveDate, NaiveTime, &'a str);

/// One registrant paired with the slot they will be submitted for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub registrant: Registrant,
    pub slot: Slot,
}

/// Pair pending registrants with slots, month by month
///
/// Reserved registrants and duplicate ids or slots in the inputs are ignored.
/// Output is ordered by month and then by slot, so identical inputs always
/// yield identical assignments.
pub fn distribute(slots: &[Slot], registrants: &[Registrant]) -> Vec<Assignment> {
    let mut slots_by_month: BTreeMap<u32, BTreeSet<SlotKey<'_>>> = BTreeMap::new();
    for slot in slots {
        slots_by_month
            .entry(slot.month())
            .or_default()
            .insert((slot.date, slot.time, slot.room.as_str()));
    }

    let mut seen = BTreeSet::new();
    let mut registrants_by_month: BTreeMap<u32, BTreeMap<i64, &Registrant>> = BTreeMap::new();
    for registrant in registrants.iter().filter(|r| r.is_pending()) {
        if !seen.insert(registrant.id) {
            continue;
        }
        registrants_by_month
            .entry(registrant.desired_month)
            .or_default()
            .insert(registrant.id, registrant);
    }

    let mut assignments = Vec::new();
    for (month, month_slots) in &slots_by_month {
        let Some(queue) = registrants_by_month.get(month) else {
            continue;
        };

        for ((date, time, room), registrant) in month_slots.iter().zip(queue.values()) {
            assignments.push(Assignment {
                registrant: (*registrant).clone(),
                slot: Slot::new(*date, *time, *room),
            });
        }
    }

    assignments
}
