//! Registrant store
//!
//! Trait-based access to registrants and reservations, so the monitor and
//! submitter never see SQL:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Monitor / Registration / CLI / Control           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RegistrantStore                        │
//! └─────────────────────────────────────────────────────────────┘
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!       ┌─────────────────────┐ ┌─────────────────────┐
//!       │ SqliteRegistrant-   │ │ MemoryRegistrant-   │
//!       │ Store               │ │ Store               │
//!       └─────────────────────┘ └─────────────────────┘
//! ```
//!
//! `assign_reservation` is the single atomic transition from pending to
//! reserved: it only succeeds while the registrant has no reservation, and a
//! reservation can be linked to at most one registrant.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::models::{
    ApplicationType, Citizenship, ConfirmedFields, NewRegistrant, Registrant, ReservationRecord,
    StoreStatistics,
};
use crate::utils::error::{StoreError, ValidationError};

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Store Trait
// ============================================================================

/// Query/update interface over registrants and reservations
#[async_trait]
pub trait RegistrantStore: Send + Sync {
    /// Validate and persist a new registrant
    async fn add(&self, registrant: NewRegistrant) -> StoreResult<Registrant>;

    async fn get(&self, id: i64) -> StoreResult<Option<Registrant>>;

    /// Registrants without a reservation, ascending by id
    async fn list_pending(&self, month: Option<u32>) -> StoreResult<Vec<Registrant>>;

    /// Every registrant, ascending by id
    async fn list_all(&self) -> StoreResult<Vec<Registrant>>;

    /// Persist a reservation record; `false` when the code already exists
    async fn create_reservation(&self, record: &ReservationRecord) -> StoreResult<bool>;

    /// Link a reservation to a pending registrant; `false` if already reserved
    async fn assign_reservation(&self, registrant_id: i64, reservation_id: &str)
        -> StoreResult<bool>;

    async fn get_reservation(&self, id: &str) -> StoreResult<Option<ReservationRecord>>;

    async fn delete(&self, registrant_id: i64) -> StoreResult<bool>;

    /// Aggregate counts; `by_month` covers pending registrants only
    async fn statistics(&self) -> StoreResult<StoreStatistics>;
}

/// Thread-safe shared store handle
pub type SharedRegistrantStore = Arc<dyn RegistrantStore>;

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of RegistrantStore
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteRegistrantStore {
    conn: Mutex<Connection>,
}

const REGISTRANT_COLUMNS: &str = "id, name, surname, citizenship, email, phone, \
     application_type, desired_month, reservation_id, created_at";

impl SqliteRegistrantStore {
    /// Open (or create) a store at `path`
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite registrant store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS reservations (
                    id TEXT PRIMARY KEY,
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    room TEXT NOT NULL,
                    confirmed TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS registrants (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    surname TEXT NOT NULL,
                    citizenship TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    phone TEXT NOT NULL,
                    application_type TEXT NOT NULL,
                    desired_month INTEGER NOT NULL CHECK (desired_month BETWEEN 1 AND 12),
                    reservation_id TEXT UNIQUE REFERENCES reservations(id),
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_registrants_pending
                    ON registrants(desired_month) WHERE reservation_id IS NULL;
                "#,
        )?;

        Ok(())
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn registrant_from_row(row: &Row<'_>) -> rusqlite::Result<Registrant> {
    let citizenship: String = row.get(3)?;
    let application_type: String = row.get(6)?;
    let created_at: String = row.get(9)?;

    Ok(Registrant {
        id: row.get(0)?,
        name: row.get(1)?,
        surname: row.get(2)?,
        citizenship: Citizenship::parse(&citizenship)
            .ok_or_else(|| conversion_error(3, ValidationError::Citizenship(citizenship.clone())))?,
        email: row.get(4)?,
        phone: row.get(5)?,
        application_type: ApplicationType::parse(&application_type).ok_or_else(|| {
            conversion_error(6, ValidationError::ApplicationType(application_type.clone()))
        })?,
        desired_month: row.get(7)?,
        reservation_id: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(9, e))?
            .with_timezone(&Utc),
    })
}

fn reservation_from_row(row: &Row<'_>) -> rusqlite::Result<ReservationRecord> {
    let date: String = row.get(1)?;
    let time: String = row.get(2)?;
    let confirmed: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;

    let confirmed = confirmed
        .map(|json| serde_json::from_str::<ConfirmedFields>(&json))
        .transpose()
        .map_err(|e| conversion_error(4, e))?;

    Ok(ReservationRecord {
        id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(1, e))?,
        time: NaiveTime::parse_from_str(&time, "%H:%M").map_err(|e| conversion_error(2, e))?,
        room: row.get(3)?,
        confirmed,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(5, e))?
            .with_timezone(&Utc),
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl RegistrantStore for SqliteRegistrantStore {
    async fn add(&self, registrant: NewRegistrant) -> StoreResult<Registrant> {
        let r = registrant.validated()?;
        let created_at = Utc::now();
        let conn = self.lock()?;

        let inserted = conn.execute(
            "INSERT INTO registrants (name, surname, citizenship, email, phone, \
             application_type, desired_month, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.name,
                r.surname,
                r.citizenship.as_str(),
                r.email,
                r.phone,
                r.application_type.as_str(),
                r.desired_month,
                created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::Duplicate(format!("email {}", r.email)));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        tracing::debug!(id, month = r.desired_month, "Registrant added");

        Ok(Registrant {
            id,
            name: r.name,
            surname: r.surname,
            citizenship: r.citizenship,
            email: r.email,
            phone: r.phone,
            application_type: r.application_type,
            desired_month: r.desired_month,
            reservation_id: None,
            created_at,
        })
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Registrant>> {
        let conn = self.lock()?;
        let registrant = conn
            .query_row(
                &format!("SELECT {REGISTRANT_COLUMNS} FROM registrants WHERE id = ?1"),
                params![id],
                registrant_from_row,
            )
            .optional()?;
        Ok(registrant)
    }

    async fn list_pending(&self, month: Option<u32>) -> StoreResult<Vec<Registrant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REGISTRANT_COLUMNS} FROM registrants \
             WHERE reservation_id IS NULL AND (?1 IS NULL OR desired_month = ?1) \
             ORDER BY id ASC"
        ))?;

        let rows = stmt
            .query_map(params![month], registrant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn list_all(&self) -> StoreResult<Vec<Registrant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REGISTRANT_COLUMNS} FROM registrants ORDER BY id ASC"
        ))?;

        let rows = stmt
            .query_map([], registrant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn create_reservation(&self, record: &ReservationRecord) -> StoreResult<bool> {
        let confirmed = record
            .confirmed
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Unavailable(format!("serialize confirmation: {e}")))?;

        let conn = self.lock()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO reservations (id, date, time, room, confirmed, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.date.format("%Y-%m-%d").to_string(),
                record.time.format("%H:%M").to_string(),
                record.room,
                confirmed,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(rows == 1)
    }

    async fn assign_reservation(
        &self,
        registrant_id: i64,
        reservation_id: &str,
    ) -> StoreResult<bool> {
        let conn = self.lock()?;
        let result = conn.execute(
            "UPDATE registrants SET reservation_id = ?2 \
             WHERE id = ?1 AND reservation_id IS NULL",
            params![registrant_id, reservation_id],
        );

        match result {
            Ok(rows) => Ok(rows == 1),
            Err(e) if is_constraint_violation(&e) => {
                tracing::warn!(
                    registrant_id,
                    reservation_id,
                    "Reservation already linked or missing"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_reservation(&self, id: &str) -> StoreResult<Option<ReservationRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, date, time, room, confirmed, created_at FROM reservations WHERE id = ?1",
                params![id],
                reservation_from_row,
            )
            .optional()?;
        Ok(record)
    }

    async fn delete(&self, registrant_id: i64) -> StoreResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM registrants WHERE id = ?1", params![registrant_id])?;
        Ok(rows > 0)
    }

    async fn statistics(&self) -> StoreResult<StoreStatistics> {
        let conn = self.lock()?;

        let (total, reserved): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(reservation_id) FROM registrants",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut by_citizenship = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT citizenship, COUNT(*) FROM registrants GROUP BY citizenship")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (key, count) = row?;
            by_citizenship.insert(key, count as u64);
        }

        let mut by_month = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT desired_month, COUNT(*) FROM registrants \
             WHERE reservation_id IS NULL GROUP BY desired_month",
        )?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?)))? {
            let (month, count) = row?;
            by_month.insert(month, count as u64);
        }

        Ok(StoreStatistics {
            total: total as u64,
            reserved: reserved as u64,
            pending: (total - reserved) as u64,
            by_citizenship,
            by_month,
        })
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    registrants: BTreeMap<i64, Registrant>,
    reservations: HashMap<String, ReservationRecord>,
}

/// In-memory RegistrantStore with the same uniqueness rules as SQLite
#[derive(Default)]
pub struct MemoryRegistrantStore {
    state: Mutex<MemoryState>,
}

impl MemoryRegistrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))
    }
}

#[async_trait]
impl RegistrantStore for MemoryRegistrantStore {
    async fn add(&self, registrant: NewRegistrant) -> StoreResult<Registrant> {
        let r = registrant.validated()?;
        let mut state = self.lock()?;

        if state.registrants.values().any(|x| x.email == r.email) {
            return Err(StoreError::Duplicate(format!("email {}", r.email)));
        }

        state.next_id += 1;
        let registrant = Registrant {
            id: state.next_id,
            name: r.name,
            surname: r.surname,
            citizenship: r.citizenship,
            email: r.email,
            phone: r.phone,
            application_type: r.application_type,
            desired_month: r.desired_month,
            reservation_id: None,
            created_at: Utc::now(),
        };
        state.registrants.insert(registrant.id, registrant.clone());
        Ok(registrant)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Registrant>> {
        Ok(self.lock()?.registrants.get(&id).cloned())
    }

    async fn list_pending(&self, month: Option<u32>) -> StoreResult<Vec<Registrant>> {
        Ok(self
            .lock()?
            .registrants
            .values()
            .filter(|r| r.is_pending())
            .filter(|r| month.map_or(true, |m| r.desired_month == m))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<Registrant>> {
        Ok(self.lock()?.registrants.values().cloned().collect())
    }

    async fn create_reservation(&self, record: &ReservationRecord) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.reservations.contains_key(&record.id) {
            return Ok(false);
        }
        state.reservations.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn assign_reservation(
        &self,
        registrant_id: i64,
        reservation_id: &str,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;

        if !state.reservations.contains_key(reservation_id) {
            return Ok(false);
        }
        let already_linked = state
            .registrants
            .values()
            .any(|r| r.reservation_id.as_deref() == Some(reservation_id));
        if already_linked {
            return Ok(false);
        }

        match state.registrants.get_mut(&registrant_id) {
            Some(r) if r.is_pending() => {
                r.reservation_id = Some(reservation_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_reservation(&self, id: &str) -> StoreResult<Option<ReservationRecord>> {
        Ok(self.lock()?.reservations.get(id).cloned())
    }

    async fn delete(&self, registrant_id: i64) -> StoreResult<bool> {
        Ok(self.lock()?.registrants.remove(&registrant_id).is_some())
    }

    async fn statistics(&self) -> StoreResult<StoreStatistics> {
        let state = self.lock()?;
        let mut stats = StoreStatistics::default();

        for r in state.registrants.values() {
            stats.total += 1;
            *stats
                .by_citizenship
                .entry(r.citizenship.as_str().to_string())
                .or_default() += 1;
            if r.is_pending() {
                stats.pending += 1;
                *stats.by_month.entry(r.desired_month).or_default() += 1;
            } else {
                stats.reserved += 1;
            }
        }

        Ok(stats)
    }
}

// ============================================================================
// Shared Store Constructors
// ============================================================================

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> StoreResult<SharedRegistrantStore> {
    Ok(Arc::new(SqliteRegistrantStore::new(path)?))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedRegistrantStore {
    Arc::new(MemoryRegistrantStore::new())
}

// ============================================================================
// Tests
// ============================================================================
