//! Shared test fixtures: a scripted stake tracker and raw block builders.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use stakeindex_core::stake::{StakeNode, StakeTracker};
use stakeindex_core::types::{
    BlockHeader, ChainParams, RawBlock, RawTx, RawTxIn, RawTxOut, TxTree, TxType, ZERO_HASH,
};
use stakeindex_storage::MemoryStore;

use crate::chain::{ChainDb, ChainDbConfig};

/// Stake tracker with scripted winners and missed/expired sets.
#[derive(Default)]
pub(crate) struct MockTracker {
    /// Block hash → winning tickets selected by that block.
    winners: Mutex<HashMap<String, Vec<String>>>,
    expired: Mutex<HashSet<String>>,
    missed: Mutex<Vec<String>>,
    height: AtomicU64,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_winners(&self, block_hash: &str, winners: &[&str]) {
        self.winners.lock().unwrap().insert(
            block_hash.to_string(),
            winners.iter().map(|w| w.to_string()).collect(),
        );
    }

    pub fn mark_expired(&self, ticket_hash: &str) {
        self.expired.lock().unwrap().insert(ticket_hash.to_string());
    }

    pub fn set_missed(&self, ticket_hashes: &[&str]) {
        *self.missed.lock().unwrap() = ticket_hashes.iter().map(|t| t.to_string()).collect();
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }
}

struct Snapshot {
    expired: HashSet<String>,
    missed: Vec<String>,
}

impl StakeNode for Snapshot {
    fn exists_expired_ticket(&self, ticket_hash: &str) -> bool {
        self.expired.contains(ticket_hash)
    }
    fn missed_by_block(&self) -> Vec<String> {
        self.missed.clone()
    }
}

impl StakeTracker for MockTracker {
    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn pool_info(&self, block_hash: &str) -> Option<Vec<String>> {
        self.winners.lock().unwrap().get(block_hash).cloned()
    }

    fn lock_best_node(&self) -> Box<dyn StakeNode + '_> {
        Box::new(Snapshot {
            expired: self.expired.lock().unwrap().clone(),
            missed: self.missed.lock().unwrap().clone(),
        })
    }
}

/// Engine over a memory store and mock tracker, with a short ticket
/// maturity so chart queries see the pool.
pub(crate) async fn engine() -> (Arc<MemoryStore>, Arc<MockTracker>, ChainDb) {
    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(MockTracker::new());
    let config = ChainDbConfig {
        params: ChainParams {
            ticket_maturity: 1,
            dev_subsidy_address: "dev-fund".into(),
            ..Default::default()
        },
        enable_ticket_cache: true,
        dev_prefetch: false,
    };
    let db = ChainDb::new(store.clone(), tracker.clone(), config)
        .await
        .unwrap();
    (store, tracker, db)
}

fn txin(prev_hash: &str, prev_index: u32, prev_tree: TxTree) -> RawTxIn {
    RawTxIn {
        prev_hash: prev_hash.into(),
        prev_index,
        prev_tree,
    }
}

fn txout(value: u64, address: &str) -> RawTxOut {
    RawTxOut {
        value,
        script: "76a914".into(),
        addresses: vec![address.into()],
    }
}

pub(crate) fn coinbase(hash: &str, value: u64, address: &str) -> RawTx {
    RawTx {
        hash: hash.into(),
        tx_type: TxType::Coinbase,
        inputs: vec![txin(ZERO_HASH, u32::MAX, TxTree::Regular)],
        outputs: vec![txout(value, address)],
    }
}

/// Ordinary transfer spending one outpoint of `prev_hash`.
pub(crate) fn ordinary(
    hash: &str,
    prev_hash: &str,
    prev_index: u32,
    value: u64,
    address: &str,
) -> RawTx {
    RawTx {
        hash: hash.into(),
        tx_type: TxType::Ordinary,
        inputs: vec![txin(prev_hash, prev_index, TxTree::Regular)],
        outputs: vec![txout(value, address)],
    }
}

/// Ticket purchase at the given price, funded by a single input.
pub(crate) fn ticket(hash: &str, funding_hash: &str, price: u64, address: &str) -> RawTx {
    RawTx {
        hash: hash.into(),
        tx_type: TxType::Ticket,
        inputs: vec![txin(funding_hash, 0, TxTree::Regular)],
        outputs: vec![txout(price, address)],
    }
}

/// Vote spending `ticket_hash` (stakebase at input 0, ticket at input 1).
pub(crate) fn vote(hash: &str, ticket_hash: &str) -> RawTx {
    RawTx {
        hash: hash.into(),
        tx_type: TxType::Vote,
        inputs: vec![
            txin(ZERO_HASH, u32::MAX, TxTree::Regular),
            txin(ticket_hash, 0, TxTree::Stake),
        ],
        outputs: vec![txout(105, "voter")],
    }
}

/// Revocation reclaiming `ticket_hash`.
pub(crate) fn revocation(hash: &str, ticket_hash: &str) -> RawTx {
    RawTx {
        hash: hash.into(),
        tx_type: TxType::Revocation,
        inputs: vec![txin(ticket_hash, 0, TxTree::Stake)],
        outputs: vec![txout(100, "revoker")],
    }
}

pub(crate) fn raw_block(
    height: u64,
    hash: &str,
    prev_hash: &str,
    vote_bits: u16,
    regular: Vec<RawTx>,
    stake: Vec<RawTx>,
) -> RawBlock {
    RawBlock {
        header: BlockHeader {
            height,
            hash: hash.into(),
            prev_hash: prev_hash.into(),
            time: 1_700_000_000 + height as i64 * 300,
            vote_bits,
        },
        regular,
        stake,
    }
}
