// Core data structures for slotwatch

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::utils::error::{ParseError, ValidationError};

pub const MAX_NAME_LEN: usize = 15;
pub const MAX_SURNAME_LEN: usize = 20;

/// Days covered by the fallback window when the booking page cannot be parsed
pub const FALLBACK_WINDOW_DAYS: i64 = 90;

/// Registrant citizenship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Citizenship {
    Belarus,
    Russia,
    Ukraine,
    Stateless,
}

impl Citizenship {
    /// Symbolic key used in storage and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Belarus => "belarus",
            Self::Russia => "russia",
            Self::Ukraine => "ukraine",
            Self::Stateless => "stateless",
        }
    }

    /// Value the booking form expects
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Belarus => "Białoruś",
            Self::Russia => "Rosja",
            Self::Ukraine => "Ukraina",
            Self::Stateless => "status bezpaństwowca",
        }
    }

    /// Create from string (accepts both the symbolic key and the site display name)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all()
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.display_name() == s)
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Belarus, Self::Russia, Self::Ukraine, Self::Stateless]
    }
}

impl std::fmt::Display for Citizenship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of visit being booked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Adult,
    AdultWithChildren,
    Minor,
}

impl ApplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::AdultWithChildren => "adult_with_children",
            Self::Minor => "minor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Adult => "osoba dorosła",
            Self::AdultWithChildren => "osoba dorosła i małoletnie dzieci",
            Self::Minor => "małoletni",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all()
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.display_name() == s)
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Adult, Self::AdultWithChildren, Self::Minor]
    }
}

impl std::fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Person waiting for an appointment
///
/// `id` doubles as the priority identifier: lower ids are served first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub citizenship: Citizenship,
    pub email: String,
    pub phone: String,
    pub application_type: ApplicationType,
    pub desired_month: u32,
    pub reservation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Registrant {
    /// A registrant with a reservation is never matched again
    pub fn is_pending(&self) -> bool {
        self.reservation_id.is_none()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Intake payload for a new registrant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistrant {
    pub name: String,
    pub surname: String,
    pub citizenship: Citizenship,
    pub email: String,
    pub phone: String,
    pub application_type: ApplicationType,
    pub desired_month: u32,
}

impl NewRegistrant {
    /// Check field limits and normalise the email address
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.surname = self.surname.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self.phone = self.phone.trim().to_string();

        check_length("name", &self.name, MAX_NAME_LEN)?;
        check_length("surname", &self.surname, MAX_SURNAME_LEN)?;

        if !self.email.contains('@') {
            return Err(ValidationError::Email(self.email));
        }

        if self.phone.is_empty() || !self.phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::Phone(self.phone));
        }

        if !(1..=12).contains(&self.desired_month) {
            return Err(ValidationError::Month(self.desired_month));
        }

        Ok(self)
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Combined room + time value the booking form submits (e.g. "A209:00")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotToken {
    pub room: String,
    pub time: NaiveTime,
}

impl SlotToken {
    pub fn new(room: impl Into<String>, time: NaiveTime) -> Self {
        Self {
            room: room.into(),
            time,
        }
    }

    /// Split a token back into room (first two characters) and `HH:MM` time
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let split = token
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .ok_or_else(|| ParseError::InvalidToken(token.to_string()))?;
        let (room, time) = token.split_at(split);

        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|_| ParseError::InvalidToken(token.to_string()))?;

        Ok(Self::new(room, time))
    }
}

impl std::fmt::Display for SlotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.room, self.time.format("%H:%M"))
    }
}

/// A bookable (date, time, room) triple seen in the latest probe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub room: String,
}

impl Slot {
    pub fn new(date: NaiveDate, time: NaiveTime, room: impl Into<String>) -> Self {
        Self {
            date,
            time,
            room: room.into(),
        }
    }

    pub fn token(&self) -> SlotToken {
        SlotToken::new(self.room.clone(), self.time)
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M"),
            self.room
        )
    }
}

/// Site-asserted scheduling window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatepickerConstraints {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub disabled: BTreeSet<NaiveDate>,
}

/// One difference between two constraint snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum ConstraintChange {
    MinDate { old: NaiveDate, new: NaiveDate },
    MaxDate { old: NaiveDate, new: NaiveDate },
    DisabledAdded { dates: Vec<NaiveDate> },
    DisabledRemoved { dates: Vec<NaiveDate> },
}

impl std::fmt::Display for ConstraintChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |dates: &[NaiveDate]| {
            dates
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::MinDate { old, new } => write!(f, "minDate: {old} -> {new}"),
            Self::MaxDate { old, new } => write!(f, "maxDate: {old} -> {new}"),
            Self::DisabledAdded { dates } => write!(f, "disabled added: {}", join(dates)),
            Self::DisabledRemoved { dates } => write!(f, "disabled removed: {}", join(dates)),
        }
    }
}

impl DatepickerConstraints {
    /// Safe window used when the booking page can no longer be parsed
    pub fn fallback(today: NaiveDate) -> Self {
        Self {
            min_date: today,
            max_date: today + Duration::days(FALLBACK_WINDOW_DAYS),
            disabled: BTreeSet::new(),
        }
    }

    pub fn is_disabled(&self, date: NaiveDate) -> bool {
        self.disabled.contains(&date)
    }

    /// Changes needed to go from `self` to `newer`
    pub fn diff(&self, newer: &Self) -> Vec<ConstraintChange> {
        let mut changes = Vec::new();

        if self.min_date != newer.min_date {
            changes.push(ConstraintChange::MinDate {
                old: self.min_date,
                new: newer.min_date,
            });
        }
        if self.max_date != newer.max_date {
            changes.push(ConstraintChange::MaxDate {
                old: self.max_date,
                new: newer.max_date,
            });
        }

        let added: Vec<_> = newer.disabled.difference(&self.disabled).copied().collect();
        if !added.is_empty() {
            changes.push(ConstraintChange::DisabledAdded { dates: added });
        }
        let removed: Vec<_> = self.disabled.difference(&newer.disabled).copied().collect();
        if !removed.is_empty() {
            changes.push(ConstraintChange::DisabledRemoved { dates: removed });
        }

        changes
    }
}

/// Fields as the site's confirmation page reports them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedFields {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub room_label: Option<String>,
    pub citizenship: Option<String>,
    pub application_type: Option<String>,
    pub registration_code: Option<String>,
}

/// Durable proof of a successful booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    /// Site-issued registration code, or a generated one
    pub id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub room: String,
    pub confirmed: Option<ConfirmedFields>,
    pub created_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Build a record from the confirmation page, generating a code when the page has none
    pub fn from_confirmation(slot: &Slot, confirmed: ConfirmedFields) -> Self {
        let id = confirmed
            .registration_code
            .clone()
            .unwrap_or_else(generated_code);
        Self {
            id,
            date: confirmed.date.unwrap_or(slot.date),
            time: confirmed.time.unwrap_or(slot.time),
            room: slot.room.clone(),
            confirmed: Some(confirmed),
            created_at: Utc::now(),
        }
    }
}

fn generated_code() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("GEN-{}", &uuid[..8]).to_uppercase()
}

/// Aggregate counts exposed by the registrant store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total: u64,
    pub reserved: u64,
    pub pending: u64,
    pub by_citizenship: BTreeMap<String, u64>,
    pub by_month: BTreeMap<u32, u64>,
}
