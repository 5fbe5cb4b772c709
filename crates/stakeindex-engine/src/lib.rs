//! stakeindex-engine — the chain-facing half of StakeIndex.
//!
//! [`ChainDb`] wraps a [`stakeindex_core::ChainStore`] backend and a
//! [`stakeindex_core::StakeTracker`] collaborator and drives:
//!
//! - block ingestion, both transaction trees stored concurrently
//!   ([`ChainDb::store_block`])
//! - the one-block-deep validity cascade driven by stakeholder vote bits
//! - chain reorganization by flag reclassification, never deletion
//!   ([`ChainDb::tip_to_side_chain`])
//! - single-flight aggregate caches (address balances, dev fund,
//!   ticket-pool charts)
//! - bulk backfills for spending info ([`ChainDb::rebuild_address_spend_info`])
//!
//! Recovery from partial writes relies on duplicate-safe inserts rather than
//! storage transactions: re-ingesting a block converges on the same rows.

pub mod caches;
pub mod chain;

mod ingest;
mod rebuild;
mod reorg;

#[cfg(test)]
pub(crate) mod testutil;

pub use caches::{AddressBalanceCache, DevFundCache, TicketPoolCache};
pub use chain::{ChainDb, ChainDbConfig};
pub use ingest::BlockIngestResult;
