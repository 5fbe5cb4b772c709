//! stakeindex-storage — pluggable row-store backends for StakeIndex.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! Both implement [`stakeindex_core::ChainStore`] with duplicate-safe
//! inserts keyed on natural keys, so a partially-ingested block can be
//! re-run without corruption.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
