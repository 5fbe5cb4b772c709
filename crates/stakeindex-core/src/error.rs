//! Error types for the stakeindex pipeline.

use thiserror::Error;

/// Errors that can occur during ingestion, reorg handling, or queries.
#[derive(Debug, Error)]
pub enum ChainIndexError {
    /// A point or range query matched zero rows. Never fatal; callers treat
    /// this as "no data yet".
    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),

    /// The stake collaborator had no pool info for a block whose winners are
    /// needed to establish ticket-vote linkage.
    #[error("stake pool info unavailable for block {block_hash}")]
    StakePoolInfo { block_hash: String },

    /// Both transaction-tree tasks of one block failed.
    #[error("block tree storage failed: regular: {regular}; stake: {stake}")]
    BothTrees { regular: String, stake: String },

    /// A cached aggregate could not be produced even after waiting for an
    /// in-progress update.
    #[error("cache fetch failed: {0}")]
    Cache(String),

    /// A spawned tree task panicked or was cancelled before completing.
    #[error("tree task aborted: {0}")]
    TreeTask(String),

    #[error("{0}")]
    Other(String),
}

impl ChainIndexError {
    /// Returns `true` for the non-fatal zero-rows condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
