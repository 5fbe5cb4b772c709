//! stakeindex-core — foundation for the stake-aware chain indexing engine.
//!
//! # Architecture
//!
//! ```text
//! ChainDb (stakeindex-engine)
//!     ├── extract        (raw block → normalized row sets, pure)
//!     ├── ChainStore     (row-store contract; backends in stakeindex-storage)
//!     ├── TicketIdCache  (ticket hash → row ID, write-through)
//!     └── StakeTracker   (external stake-pool collaborator + spend classifier)
//! ```

pub mod error;
pub mod extract;
pub mod stake;
pub mod store;
pub mod ticket_cache;
pub mod types;

pub use error::ChainIndexError;
pub use extract::{extract_block_tree, ExtractedTree};
pub use stake::{classify_spends, unrevoked_miss_updates, StakeNode, StakeTracker, TicketSpend};
pub use store::{ChainStore, SpendingOp, TicketSpendUpdate, TxIoIds, VoteSpendInfo};
pub use ticket_cache::{ticket_row_id, TicketIdCache};
pub use types::{
    AddrTxnKind, AddressBalance, AddressRow, BlockHeader, BlockRow, BlockStatus, ChainParams,
    ChartInterval, PoolStatus, PoolTicketsData, RawBlock, RawTx, RawTxIn, RawTxOut,
    TicketPoolCharts, TicketRow, TicketSpendType, TxRow, TxTree, TxType, VinRow, VoteRow,
    VoutRow, ZERO_HASH,
};
