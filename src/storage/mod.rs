//! Registrant persistence
//!
//! The monitor only needs a narrow contract from the persistence layer:
//! list pending registrants, record a reservation and link it atomically.
//! [`repository::RegistrantStore`] is that contract; SQLite backs it in
//! production and an in-memory map backs it in tests.

pub mod repository;

pub use repository::{
    create_memory_store, create_sqlite_store, MemoryRegistrantStore, RegistrantStore,
    SharedRegistrantStore, SqliteRegistrantStore, StoreResult,
};
