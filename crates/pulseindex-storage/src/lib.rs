//! pulseindex-storage: storage sinks for PulseIndex.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, commit fault injection)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx`

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn sql_err(e: sqlx::Error) -> pulseindex_core::IndexerError {
    pulseindex_core::IndexerError::Storage(e.to_string())
}
