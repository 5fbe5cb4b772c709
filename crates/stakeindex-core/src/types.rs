//! Shared types for the indexing pipeline.
//!
//! Hashes are lowercase hex strings throughout; row identifiers are `u64`
//! values assigned by the store backend on insertion.

use serde::{Deserialize, Serialize};

/// The all-zero hash, used as the previous-block hash of the genesis block
/// and as the previous outpoint of coinbase/stakebase inputs.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Which of a block's two transaction trees a transaction lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxTree {
    /// The regular tree, subject to stakeholder approval.
    Regular,
    /// The stake tree (tickets, votes, revocations).
    Stake,
}

/// Transaction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    /// Ordinary value transfer in the regular tree.
    Ordinary,
    /// Coinbase (block reward) transaction.
    Coinbase,
    /// Ticket purchase (stake submission).
    Ticket,
    /// Vote spending a ticket and approving/disapproving the parent block.
    Vote,
    /// Revocation reclaiming a missed or expired ticket.
    Revocation,
}

/// How a ticket was spent, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketSpendType {
    Unspent,
    Voted,
    Revoked,
}

/// A ticket's standing in the live ticket pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    /// In the pool, eligible to be called to vote.
    Live,
    /// Called and voted.
    Voted,
    /// Called but failed to vote.
    Missed,
    /// Reached maximum age without being called.
    Expired,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Voted => write!(f, "voted"),
            Self::Missed => write!(f, "missed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Which address-ledger rows a query should return.
///
/// Replaces dynamic selection of a query routine with an explicit tag the
/// store resolves internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrTxnKind {
    /// Both funding and spending rows.
    All,
    /// Funding (credit) rows only.
    Credit,
    /// Spending (debit) rows only.
    Debit,
    /// Debit rows merged per spending transaction.
    MergedDebit,
}

/// Time grouping for ticket-pool chart queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartInterval {
    Day,
    Week,
    Month,
    All,
}

impl ChartInterval {
    /// Every grouping, in cache-key iteration order.
    pub const ALL_INTERVALS: [ChartInterval; 4] = [
        ChartInterval::Day,
        ChartInterval::Week,
        ChartInterval::Month,
        ChartInterval::All,
    ];

    /// The grouping width in seconds. `All` collapses to a single bucket.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Day => 86_400,
            Self::Week => 7 * 86_400,
            Self::Month => 30 * 86_400,
            Self::All => i64::MAX,
        }
    }
}

impl std::fmt::Display for ChartInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "wk"),
            Self::Month => write!(f, "mo"),
            Self::All => write!(f, "all"),
        }
    }
}

// ─── Chain parameters ────────────────────────────────────────────────────────

/// The subset of network consensus parameters the indexer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    /// Network name (e.g. `"mainnet"`).
    pub name: String,
    /// Blocks before a purchased ticket enters the live pool.
    pub ticket_maturity: u64,
    /// Number of tickets called to vote on each block.
    pub votes_per_block: u16,
    /// The development-fund subsidy address for this network.
    pub dev_subsidy_address: String,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            name: "mainnet".into(),
            ticket_maturity: 256,
            votes_per_block: 5,
            dev_subsidy_address: String::new(),
        }
    }
}

// ─── Raw block input ─────────────────────────────────────────────────────────

/// Parsed block header fields, as supplied by the block source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Stakeholder vote bits; bit 0 approves the parent block.
    pub vote_bits: u16,
}

impl BlockHeader {
    /// Returns `true` if this block's votes approve its parent.
    pub fn approves_parent(&self) -> bool {
        self.vote_bits & 1 != 0
    }
}

/// A previous-outpoint reference in a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxIn {
    pub prev_hash: String,
    pub prev_index: u32,
    pub prev_tree: TxTree,
}

impl RawTxIn {
    /// Coinbase and stakebase inputs reference the zero hash.
    pub fn is_generated(&self) -> bool {
        self.prev_hash == ZERO_HASH
    }
}

/// A transaction output, with addresses already resolved from the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxOut {
    /// Value in atomic units.
    pub value: u64,
    /// Output script, hex-encoded.
    pub script: String,
    /// Destination addresses, as decoded by the block source.
    pub addresses: Vec<String>,
}

/// A parsed transaction, as supplied by the block source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTx {
    pub hash: String,
    pub tx_type: TxType,
    pub inputs: Vec<RawTxIn>,
    pub outputs: Vec<RawTxOut>,
}

impl RawTx {
    /// The ticket hash spent by this vote or revocation.
    ///
    /// Votes carry the stake submission at input index 1 (index 0 is the
    /// stakebase); revocations carry it at index 0. `None` for other types
    /// or malformed inputs.
    pub fn spent_ticket_hash(&self) -> Option<&str> {
        let vin_ind = match self.tx_type {
            TxType::Vote => 1,
            TxType::Revocation => 0,
            _ => return None,
        };
        self.inputs.get(vin_ind).map(|vin| vin.prev_hash.as_str())
    }

    /// Total value of all outputs, in atomic units.
    pub fn sent(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// A parsed block: header plus both transaction trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub header: BlockHeader,
    pub regular: Vec<RawTx>,
    pub stake: Vec<RawTx>,
}

impl RawBlock {
    /// The transactions of the requested tree.
    pub fn tree(&self, tree: TxTree) -> &[RawTx] {
        match tree {
            TxTree::Regular => &self.regular,
            TxTree::Stake => &self.stake,
        }
    }

    /// Returns `true` if this block's parent is the zero hash (genesis).
    pub fn has_genesis_parent(&self) -> bool {
        self.header.prev_hash == ZERO_HASH
    }
}

// ─── Stored rows ─────────────────────────────────────────────────────────────

/// A block row. Blocks are never deleted, only reclassified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub time: i64,
    pub vote_bits: u16,
    pub tx_count: u32,
    pub stx_count: u32,
    /// Approved by the next block's stakeholder votes so far.
    pub is_valid: bool,
    pub is_mainchain: bool,
    /// Row IDs of this block's regular-tree transactions.
    pub tx_row_ids: Vec<u64>,
    /// Row IDs of this block's stake-tree transactions.
    pub stx_row_ids: Vec<u64>,
}

/// Chain-status summary of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub is_valid: bool,
    pub is_mainchain: bool,
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub next_hash: String,
}

/// A transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRow {
    pub block_hash: String,
    pub block_height: u64,
    pub block_time: i64,
    /// Position within the containing tree.
    pub block_index: u32,
    pub tree: TxTree,
    pub tx_type: TxType,
    pub hash: String,
    pub num_vin: u32,
    pub num_vout: u32,
    /// Total output value in atomic units.
    pub sent: u64,
    /// Row IDs of this transaction's inputs, filled after vin insertion.
    pub vin_row_ids: Vec<u64>,
    /// Row IDs of this transaction's outputs, filled after vout insertion.
    pub vout_row_ids: Vec<u64>,
    pub is_valid: bool,
    pub is_mainchain: bool,
}

/// A transaction input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VinRow {
    /// The spending transaction.
    pub tx_hash: String,
    pub tx_index: u32,
    pub tx_tree: TxTree,
    pub tx_type: TxType,
    /// The previous outpoint being spent.
    pub prev_tx_hash: String,
    pub prev_tx_index: u32,
    pub prev_tx_tree: TxTree,
    pub is_valid: bool,
    pub is_mainchain: bool,
}

/// A transaction output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoutRow {
    pub tx_hash: String,
    pub tx_index: u32,
    pub tx_tree: TxTree,
    pub value: u64,
    pub script: String,
    pub addresses: Vec<String>,
}

/// One funding or spending event in the append-only address ledger.
///
/// Rows are mutated only to backfill `matching_tx_hash` once the counterpart
/// event is known, and to propagate validity/mainchain reclassification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRow {
    pub address: String,
    /// The transaction this event belongs to.
    pub tx_hash: String,
    /// Output index (funding) or input index (spending) within that tx.
    pub io_index: u32,
    pub is_funding: bool,
    /// Value moved by this event, in atomic units.
    pub value: u64,
    pub block_time: i64,
    /// The counterpart transaction, once known (spending tx for funding rows
    /// and vice versa).
    pub matching_tx_hash: Option<String>,
    pub valid_mainchain: bool,
}

/// A ticket purchase row, including derived pool status and spend linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRow {
    pub tx_hash: String,
    pub block_hash: String,
    pub block_height: u64,
    pub purchase_tx_row_id: u64,
    /// The stake difficulty paid, in atomic units.
    pub price: u64,
    /// Number of inputs funding the purchase (solo/pool/split indicator).
    pub num_inputs: u32,
    pub spend_type: TicketSpendType,
    pub pool_status: PoolStatus,
    /// Transactions-table row ID of the vote/revocation, once spent.
    pub spending_tx_row_id: Option<u64>,
    pub spend_height: Option<u64>,
    pub is_mainchain: bool,
}

/// A vote row (one per vote transaction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRow {
    pub tx_hash: String,
    pub block_hash: String,
    pub block_height: u64,
    /// The ticket this vote spends.
    pub ticket_hash: String,
    pub vote_bits: u16,
    /// This vote's verdict on the parent block.
    pub approves_parent: bool,
    pub is_mainchain: bool,
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Spent/unspent totals for one address, derived from the address ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub address: String,
    pub num_spent: u64,
    pub num_unspent: u64,
    pub total_spent: u64,
    pub total_unspent: u64,
}

impl AddressBalance {
    /// Number of ledger rows contributing to this balance.
    pub fn num_rows(&self) -> u64 {
        self.num_spent + self.num_unspent
    }
}

/// One chart series for the ticket-pool visualization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolTicketsData {
    /// Bucket timestamps (time charts); empty for price/input grouping.
    pub time: Vec<i64>,
    /// Bucket prices in coins (price charts); empty otherwise.
    pub price: Vec<f64>,
    /// Ticket counts per bucket.
    pub count: Vec<u64>,
}

/// The full ticket-pool chart set for one grouping interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPoolCharts {
    /// Bar charts: tickets grouped by purchase time, then by price.
    pub bars: Vec<PoolTicketsData>,
    /// Donut chart: tickets grouped by input count.
    pub donut: PoolTicketsData,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_approval_bit() {
        let mut header = BlockHeader {
            height: 10,
            hash: "aa".into(),
            prev_hash: "bb".into(),
            time: 1000,
            vote_bits: 1,
        };
        assert!(header.approves_parent());
        header.vote_bits = 0xfffe;
        assert!(!header.approves_parent());
    }

    #[test]
    fn vote_spends_ticket_at_input_one() {
        let vin = |hash: &str| RawTxIn {
            prev_hash: hash.into(),
            prev_index: 0,
            prev_tree: TxTree::Stake,
        };
        let vote = RawTx {
            hash: "vote".into(),
            tx_type: TxType::Vote,
            inputs: vec![vin(ZERO_HASH), vin("ticket-hash")],
            outputs: vec![],
        };
        assert_eq!(vote.spent_ticket_hash(), Some("ticket-hash"));

        let revocation = RawTx {
            hash: "rev".into(),
            tx_type: TxType::Revocation,
            inputs: vec![vin("ticket-hash")],
            outputs: vec![],
        };
        assert_eq!(revocation.spent_ticket_hash(), Some("ticket-hash"));

        let ordinary = RawTx {
            hash: "tx".into(),
            tx_type: TxType::Ordinary,
            inputs: vec![vin("other")],
            outputs: vec![],
        };
        assert_eq!(ordinary.spent_ticket_hash(), None);
    }

    #[test]
    fn generated_input_detection() {
        let coinbase_in = RawTxIn {
            prev_hash: ZERO_HASH.into(),
            prev_index: u32::MAX,
            prev_tree: TxTree::Regular,
        };
        assert!(coinbase_in.is_generated());
    }

    #[test]
    fn chart_interval_widths() {
        assert_eq!(ChartInterval::Day.seconds(), 86_400);
        assert!(ChartInterval::All.seconds() > ChartInterval::Month.seconds());
    }
}
