//! The row-store contract — persistence primitives the ingestion and reorg
//! engines are written against.
//!
//! Implementations (see `stakeindex-storage`) must honor three rules:
//!
//! 1. **Duplicate-safe inserts**: re-inserting a row that already exists by
//!    its natural key (tx hash + index, outpoint, block hash) is a no-op
//!    returning the existing row ID, so a partially-ingested block can be
//!    re-run without corruption.
//! 2. **`NotFound` is distinguished**: zero-row retrievals return
//!    [`ChainIndexError::NotFound`], never a generic error, so callers can
//!    treat empty results as non-fatal.
//! 3. **Targeted updates report counts**: flag flips and backfills take
//!    explicit row-ID lists (or a block hash) and return the number of rows
//!    affected; callers compare against expectations and log mismatches.

use async_trait::async_trait;

use crate::error::ChainIndexError;
use crate::types::{
    AddrTxnKind, AddressBalance, AddressRow, BlockRow, BlockStatus, PoolStatus, PoolTicketsData,
    TicketRow, TicketSpendType, TxRow, TxTree, VinRow, VoteRow, VoutRow,
};

/// One ticket spend to record: links a ticket row to the vote or revocation
/// that consumed it.
#[derive(Debug, Clone)]
pub struct TicketSpendUpdate {
    pub ticket_row_id: u64,
    pub spending_tx_row_id: u64,
    pub spend_height: u64,
    pub spend_type: TicketSpendType,
    pub pool_status: PoolStatus,
}

/// Arguments for the spending-side address-ledger backfill: inserts the
/// spending event row and sets `matching_tx_hash` on the funding rows of the
/// spent outpoint.
#[derive(Debug, Clone)]
pub struct SpendingOp {
    pub prev_tx_hash: String,
    pub prev_tx_index: u32,
    pub prev_tx_tree: TxTree,
    pub spending_tx_hash: String,
    pub spending_tx_vin_index: u32,
    pub vin_row_id: u64,
    pub block_time: i64,
    pub valid_mainchain: bool,
}

/// The vin and vout row IDs of one transaction, as stored, with the
/// transaction's current mainchain flag. Returned per-transaction so reorg
/// flag flips can reuse the same ID sets across tables.
#[derive(Debug, Clone)]
pub struct TxIoIds {
    pub tx_hash: String,
    pub vin_row_ids: Vec<u64>,
    pub vout_row_ids: Vec<u64>,
    pub is_mainchain: bool,
}

/// Spend linkage of one vote or revocation, used by bulk rebuilds.
#[derive(Debug, Clone)]
pub struct VoteSpendInfo {
    /// Transactions-table row ID of the vote/revocation.
    pub spending_tx_row_id: u64,
    pub block_height: u64,
    pub ticket_hash: String,
}

/// Idempotent insert/update/retrieval primitives against the relational
/// backend. All write operations are duplicate-safe by natural key.
#[async_trait]
pub trait ChainStore: Send + Sync {
    // ── Inserts ──────────────────────────────────────────────────────────────

    /// Insert outputs, returning their row IDs in input order.
    async fn insert_vouts(&self, vouts: &[VoutRow]) -> Result<Vec<u64>, ChainIndexError>;

    /// Insert inputs, returning their row IDs in input order.
    async fn insert_vins(&self, vins: &[VinRow]) -> Result<Vec<u64>, ChainIndexError>;

    /// Insert transactions, returning their row IDs in input order.
    async fn insert_txns(&self, txns: &[TxRow]) -> Result<Vec<u64>, ChainIndexError>;

    /// Insert ticket purchases, returning their row IDs in input order.
    async fn insert_tickets(&self, tickets: &[TicketRow]) -> Result<Vec<u64>, ChainIndexError>;

    /// Insert votes, returning their row IDs in input order.
    async fn insert_votes(&self, votes: &[VoteRow]) -> Result<Vec<u64>, ChainIndexError>;

    /// Record the tickets that were called to vote on `block_hash` but did
    /// not. Returns the number of rows inserted.
    async fn insert_misses(
        &self,
        block_hash: &str,
        ticket_hashes: &[String],
    ) -> Result<u64, ChainIndexError>;

    /// Insert the block row, returning its row ID.
    async fn insert_block(&self, block: &BlockRow) -> Result<u64, ChainIndexError>;

    /// Insert funding-side address ledger rows. Returns rows inserted.
    async fn insert_address_rows(&self, rows: &[AddressRow]) -> Result<u64, ChainIndexError>;

    // ── Block linkage and best block ─────────────────────────────────────────

    /// Set the next-block hash on an existing block row.
    async fn set_block_next(&self, block_row_id: u64, next_hash: &str)
        -> Result<(), ChainIndexError>;

    /// Row ID of the block with the given hash.
    async fn block_row_id(&self, hash: &str) -> Result<u64, ChainIndexError>;

    /// Height and hash of the best (highest mainchain) block. `NotFound` when
    /// no blocks are stored yet.
    async fn best_block(&self) -> Result<(u64, String), ChainIndexError>;

    // ── Point/range retrievals ───────────────────────────────────────────────

    async fn block_status(&self, hash: &str) -> Result<BlockStatus, ChainIndexError>;

    async fn block_height(&self, hash: &str) -> Result<u64, ChainIndexError>;

    /// Hash of the mainchain block at `height`.
    async fn block_hash(&self, height: u64) -> Result<String, ChainIndexError>;

    /// All stored rows for the given transaction hash (side-chain copies
    /// included).
    async fn transactions_by_hash(&self, tx_hash: &str) -> Result<Vec<TxRow>, ChainIndexError>;

    async fn transactions_in_block(&self, block_hash: &str)
        -> Result<Vec<TxRow>, ChainIndexError>;

    /// The transaction spending the given outpoint: (spending tx hash, vin
    /// index, spending tx tree).
    async fn spending_transaction(
        &self,
        funding_tx_hash: &str,
        vout_index: u32,
    ) -> Result<(String, u32, TxTree), ChainIndexError>;

    /// All transactions spending outpoints of `funding_tx_hash`:
    /// (spending tx hash, vin index, funded vout index) triples.
    async fn spending_transactions(
        &self,
        funding_tx_hash: &str,
    ) -> Result<Vec<(String, u32, u32)>, ChainIndexError>;

    async fn vout_value(&self, tx_hash: &str, vout_index: u32) -> Result<u64, ChainIndexError>;

    async fn vout_values(&self, tx_hash: &str) -> Result<Vec<u64>, ChainIndexError>;

    /// Ticket hashes recorded as misses for the given block.
    async fn missed_votes_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<String>, ChainIndexError>;

    /// Spend and pool status of the given ticket.
    async fn ticket_status(
        &self,
        ticket_hash: &str,
    ) -> Result<(TicketSpendType, PoolStatus), ChainIndexError>;

    /// Row ID of the ticket purchased with transaction `ticket_hash`.
    async fn ticket_row_id_by_hash(&self, ticket_hash: &str) -> Result<u64, ChainIndexError>;

    /// Row IDs and hashes of all unspent tickets, for cache preloading.
    async fn unspent_tickets(&self) -> Result<(Vec<u64>, Vec<String>), ChainIndexError>;

    /// All blocks currently classified off the main chain.
    async fn side_chain_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError>;

    /// All blocks disapproved by their child's stakeholder votes.
    async fn disapproved_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError>;

    // ── Mainchain/validity flag flips ────────────────────────────────────────

    /// Set the mainchain flag on one block, returning its previous-block
    /// hash so a reorg walk can continue.
    async fn set_block_mainchain(
        &self,
        hash: &str,
        is_mainchain: bool,
    ) -> Result<String, ChainIndexError>;

    /// Set the validity flag on one block row.
    async fn set_block_valid(
        &self,
        block_row_id: u64,
        is_valid: bool,
    ) -> Result<(), ChainIndexError>;

    /// Flip the mainchain flag on all transactions of a block. Returns rows
    /// affected.
    async fn set_transactions_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError>;

    /// The vin/vout row-ID sets of every transaction in a block, for flag
    /// flips that must reuse identical ID lists across tables.
    async fn block_vin_vout_ids(&self, block_hash: &str)
        -> Result<Vec<TxIoIds>, ChainIndexError>;

    /// Flip the mainchain flag on the given vin rows. Returns rows affected.
    async fn set_vins_mainchain(
        &self,
        vin_row_ids: &[u64],
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError>;

    /// Flip `valid_mainchain` on address ledger rows matching the given vin
    /// (spending side) and vout (funding side) row IDs. Returns
    /// (spending rows, funding rows) affected.
    async fn set_addresses_mainchain_by_ids(
        &self,
        vin_row_ids: &[u64],
        vout_row_ids: &[u64],
        valid_mainchain: bool,
    ) -> Result<(u64, u64), ChainIndexError>;

    /// Flip the mainchain flag on all votes of a block. Returns rows affected.
    async fn set_votes_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError>;

    /// Flip the mainchain flag on all tickets purchased in a block. Returns
    /// rows affected.
    async fn set_tickets_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError>;

    /// Set validity on a block's regular-tree transactions (the stake tree is
    /// not subject to stakeholder approval). Returns rows affected.
    async fn set_regular_txns_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError>;

    /// Set validity on the vins of a block's regular-tree transactions.
    async fn set_regular_vins_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError>;

    /// Set `valid_mainchain` on address rows of a block's regular-tree
    /// transactions.
    async fn set_addresses_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError>;

    // ── Ticket spend bookkeeping ─────────────────────────────────────────────

    /// Record vote/revocation spends on their ticket rows. Returns rows
    /// affected.
    async fn set_spending_for_tickets(
        &self,
        updates: &[TicketSpendUpdate],
    ) -> Result<u64, ChainIndexError>;

    /// Batch pool-status update by ticket hash (missed/expired marking for
    /// unspent tickets). Returns rows affected.
    async fn set_pool_statuses_by_hash(
        &self,
        ticket_hashes: &[String],
        statuses: &[PoolStatus],
    ) -> Result<u64, ChainIndexError>;

    // ── Address ledger ───────────────────────────────────────────────────────

    /// Insert the spending-side ledger row for one vin and backfill
    /// `matching_tx_hash` on the funding rows of the spent outpoint. Returns
    /// address rows touched.
    async fn set_spending_for_funding_op(&self, op: &SpendingOp)
        -> Result<u64, ChainIndexError>;

    /// Ledger rows for an address, newest first, filtered by kind.
    async fn address_rows(
        &self,
        address: &str,
        kind: AddrTxnKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AddressRow>, ChainIndexError>;

    /// Spent/unspent totals for an address over valid-mainchain rows.
    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ChainIndexError>;

    // ── Bulk rebuild support ─────────────────────────────────────────────────

    /// Every vin row ID in storage, in insertion order.
    async fn all_vin_ids(&self) -> Result<Vec<u64>, ChainIndexError>;

    /// Run the spending-side address backfill for the given vins, deriving
    /// the operation arguments from stored rows. Returns address rows
    /// touched.
    async fn set_spending_for_vin_ids(&self, vin_row_ids: &[u64])
        -> Result<u64, ChainIndexError>;

    /// Spend linkage of all stored votes.
    async fn all_vote_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError>;

    /// Spend linkage of all stored revocations.
    async fn all_revocation_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError>;

    // ── Ticket pool charts ───────────────────────────────────────────────────

    /// Live-pool tickets mature at `maturity_height`, bucketed by purchase
    /// time at `interval_secs` width.
    async fn tickets_by_purchase_date(
        &self,
        maturity_height: u64,
        interval_secs: i64,
    ) -> Result<PoolTicketsData, ChainIndexError>;

    /// Live-pool tickets bucketed by purchase price.
    async fn tickets_by_price(
        &self,
        maturity_height: u64,
    ) -> Result<PoolTicketsData, ChainIndexError>;

    /// Live-pool tickets bucketed by number of purchase inputs.
    async fn tickets_by_input_count(&self) -> Result<PoolTicketsData, ChainIndexError>;
}
