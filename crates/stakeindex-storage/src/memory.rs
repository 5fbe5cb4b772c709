//! In-memory storage backend.
//!
//! Keeps every table as a `Vec` of rows behind one `RwLock`, with hash maps
//! from natural keys to row IDs. Row IDs are `index + 1`, matching the
//! 1-based serial IDs of the SQL backend. Useful for testing and short-lived
//! indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::store::{ChainStore, SpendingOp, TicketSpendUpdate, TxIoIds, VoteSpendInfo};
use stakeindex_core::types::{
    AddrTxnKind, AddressBalance, AddressRow, BlockRow, BlockStatus, PoolStatus, PoolTicketsData,
    TicketRow, TicketSpendType, TxRow, TxTree, TxType, VinRow, VoteRow, VoutRow, ZERO_HASH,
};

#[derive(Default)]
struct Inner {
    blocks: Vec<BlockRow>,
    /// Next-block hash per block row, parallel to `blocks`.
    block_next: Vec<String>,
    block_ids: HashMap<String, u64>,

    txns: Vec<TxRow>,
    txn_ids: HashMap<(String, String), u64>,

    vins: Vec<VinRow>,
    vin_ids: HashMap<(String, u32), u64>,

    vouts: Vec<VoutRow>,
    vout_ids: HashMap<(String, u32, TxTree), u64>,

    tickets: Vec<TicketRow>,
    ticket_ids: HashMap<(String, String), u64>,

    votes: Vec<VoteRow>,
    vote_ids: HashMap<(String, String), u64>,

    /// Block hash → tickets that were called to vote there but did not.
    misses: HashMap<String, Vec<String>>,

    addr_rows: Vec<AddressRow>,
    addr_ids: HashMap<(String, String, u32, bool), u64>,
}

impl Inner {
    fn block_pos(&self, hash: &str) -> Option<usize> {
        self.block_ids.get(hash).map(|id| (*id - 1) as usize)
    }

    fn block_status_at(&self, pos: usize) -> BlockStatus {
        let b = &self.blocks[pos];
        BlockStatus {
            is_valid: b.is_valid,
            is_mainchain: b.is_mainchain,
            height: b.height,
            hash: b.hash.clone(),
            prev_hash: b.prev_hash.clone(),
            next_hash: self.block_next[pos].clone(),
        }
    }

    /// Time of the block containing a ticket purchase, if stored.
    fn block_time(&self, block_hash: &str) -> Option<i64> {
        self.block_pos(block_hash).map(|pos| self.blocks[pos].time)
    }

    /// Ticket row position by purchase hash, preferring the mainchain copy.
    fn ticket_pos(&self, ticket_hash: &str) -> Option<usize> {
        let mut fallback = None;
        for (i, t) in self.tickets.iter().enumerate() {
            if t.tx_hash == ticket_hash {
                if t.is_mainchain {
                    return Some(i);
                }
                fallback.get_or_insert(i);
            }
        }
        fallback
    }

    /// Transaction row ID by hash, preferring the mainchain copy.
    fn txn_id_by_hash(&self, tx_hash: &str) -> Option<u64> {
        let mut fallback = None;
        for (i, tx) in self.txns.iter().enumerate() {
            if tx.hash == tx_hash {
                if tx.is_mainchain {
                    return Some(i as u64 + 1);
                }
                fallback.get_or_insert(i as u64 + 1);
            }
        }
        fallback
    }

    /// Insert the spending-side ledger rows for one previous outpoint and
    /// backfill `matching_tx_hash` on its funding rows. Shared by the
    /// per-block path and the bulk rebuild.
    fn apply_spending_op(&mut self, op: &SpendingOp) -> u64 {
        let Some(vout_id) =
            self.vout_ids
                .get(&(op.prev_tx_hash.clone(), op.prev_tx_index, op.prev_tx_tree))
        else {
            return 0;
        };
        let vout = self.vouts[(*vout_id - 1) as usize].clone();

        let mut touched = 0u64;
        for address in &vout.addresses {
            let row = AddressRow {
                address: address.clone(),
                tx_hash: op.spending_tx_hash.clone(),
                io_index: op.spending_tx_vin_index,
                is_funding: false,
                value: vout.value,
                block_time: op.block_time,
                matching_tx_hash: Some(op.prev_tx_hash.clone()),
                valid_mainchain: op.valid_mainchain,
            };
            upsert_addr_row(&mut self.addr_rows, &mut self.addr_ids, row);
            touched += 1;
        }

        for row in self.addr_rows.iter_mut() {
            if row.is_funding
                && row.tx_hash == op.prev_tx_hash
                && row.io_index == op.prev_tx_index
            {
                row.matching_tx_hash = Some(op.spending_tx_hash.clone());
                touched += 1;
            }
        }
        touched
    }
}

fn upsert_addr_row(
    rows: &mut Vec<AddressRow>,
    ids: &mut HashMap<(String, String, u32, bool), u64>,
    row: AddressRow,
) -> u64 {
    let key = (
        row.address.clone(),
        row.tx_hash.clone(),
        row.io_index,
        row.is_funding,
    );
    if let Some(id) = ids.get(&key) {
        rows[(*id - 1) as usize] = row;
        *id
    } else {
        rows.push(row);
        let id = rows.len() as u64;
        ids.insert(key, id);
        id
    }
}

/// In-memory [`ChainStore`].
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored block rows (mainchain and side chain).
    pub fn block_count(&self) -> usize {
        self.inner.read().unwrap().blocks.len()
    }

    /// Number of stored transaction rows across both trees.
    pub fn txn_count(&self) -> usize {
        self.inner.read().unwrap().txns.len()
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    // ── Inserts ──────────────────────────────────────────────────────────────

    async fn insert_vouts(&self, vouts: &[VoutRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(vouts.len());
        for vout in vouts {
            let key = (vout.tx_hash.clone(), vout.tx_index, vout.tx_tree);
            let id = if let Some(id) = inner.vout_ids.get(&key) {
                *id
            } else {
                inner.vouts.push(vout.clone());
                let id = inner.vouts.len() as u64;
                inner.vout_ids.insert(key, id);
                id
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_vins(&self, vins: &[VinRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(vins.len());
        for vin in vins {
            let key = (vin.tx_hash.clone(), vin.tx_index);
            let id = if let Some(id) = inner.vin_ids.get(&key) {
                let id = *id;
                inner.vins[(id - 1) as usize] = vin.clone();
                id
            } else {
                inner.vins.push(vin.clone());
                let id = inner.vins.len() as u64;
                inner.vin_ids.insert(key, id);
                id
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_txns(&self, txns: &[TxRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(txns.len());
        for tx in txns {
            let key = (tx.hash.clone(), tx.block_hash.clone());
            let id = if let Some(id) = inner.txn_ids.get(&key) {
                let id = *id;
                inner.txns[(id - 1) as usize] = tx.clone();
                id
            } else {
                inner.txns.push(tx.clone());
                let id = inner.txns.len() as u64;
                inner.txn_ids.insert(key, id);
                id
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_tickets(&self, tickets: &[TicketRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let key = (ticket.tx_hash.clone(), ticket.block_hash.clone());
            let id = if let Some(id) = inner.ticket_ids.get(&key).copied() {
                // Keep existing spend linkage; re-ingest re-derives it later.
                // The chain classification still follows the new insert so a
                // re-promoted branch gets its tickets back on the main chain.
                inner.tickets[id as usize - 1].is_mainchain = ticket.is_mainchain;
                id
            } else {
                inner.tickets.push(ticket.clone());
                let id = inner.tickets.len() as u64;
                inner.ticket_ids.insert(key, id);
                id
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_votes(&self, votes: &[VoteRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(votes.len());
        for vote in votes {
            let key = (vote.tx_hash.clone(), vote.block_hash.clone());
            let id = if let Some(id) = inner.vote_ids.get(&key) {
                let id = *id;
                inner.votes[(id - 1) as usize] = vote.clone();
                id
            } else {
                inner.votes.push(vote.clone());
                let id = inner.votes.len() as u64;
                inner.vote_ids.insert(key, id);
                id
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_misses(
        &self,
        block_hash: &str,
        ticket_hashes: &[String],
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.misses.entry(block_hash.to_string()).or_default();
        let mut added = 0u64;
        for hash in ticket_hashes {
            if !entry.contains(hash) {
                entry.push(hash.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn insert_block(&self, block: &BlockRow) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(id) = inner.block_ids.get(&block.hash) {
            let id = *id;
            // Replace the row but keep the recorded next-block hash.
            inner.blocks[(id - 1) as usize] = block.clone();
            return Ok(id);
        }
        inner.blocks.push(block.clone());
        inner.block_next.push(String::new());
        let id = inner.blocks.len() as u64;
        inner.block_ids.insert(block.hash.clone(), id);
        Ok(id)
    }

    async fn insert_address_rows(&self, rows: &[AddressRow]) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;
        for row in rows {
            upsert_addr_row(&mut inner.addr_rows, &mut inner.addr_ids, row.clone());
        }
        Ok(rows.len() as u64)
    }

    // ── Block linkage and best block ─────────────────────────────────────────

    async fn set_block_next(
        &self,
        block_row_id: u64,
        next_hash: &str,
    ) -> Result<(), ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let pos = (block_row_id as usize)
            .checked_sub(1)
            .filter(|p| *p < inner.blocks.len())
            .ok_or(ChainIndexError::NotFound)?;
        inner.block_next[pos] = next_hash.to_string();
        Ok(())
    }

    async fn block_row_id(&self, hash: &str) -> Result<u64, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .block_ids
            .get(hash)
            .copied()
            .ok_or(ChainIndexError::NotFound)
    }

    async fn best_block(&self) -> Result<(u64, String), ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .blocks
            .iter()
            .filter(|b| b.is_mainchain)
            .max_by_key(|b| b.height)
            .map(|b| (b.height, b.hash.clone()))
            .ok_or(ChainIndexError::NotFound)
    }

    // ── Point/range retrievals ───────────────────────────────────────────────

    async fn block_status(&self, hash: &str) -> Result<BlockStatus, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let pos = inner.block_pos(hash).ok_or(ChainIndexError::NotFound)?;
        Ok(inner.block_status_at(pos))
    }

    async fn block_height(&self, hash: &str) -> Result<u64, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let pos = inner.block_pos(hash).ok_or(ChainIndexError::NotFound)?;
        Ok(inner.blocks[pos].height)
    }

    async fn block_hash(&self, height: u64) -> Result<String, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .blocks
            .iter()
            .find(|b| b.height == height && b.is_mainchain)
            .map(|b| b.hash.clone())
            .ok_or(ChainIndexError::NotFound)
    }

    async fn transactions_by_hash(&self, tx_hash: &str) -> Result<Vec<TxRow>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .txns
            .iter()
            .filter(|tx| tx.hash == tx_hash)
            .cloned()
            .collect())
    }

    async fn transactions_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<TxRow>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .txns
            .iter()
            .filter(|tx| tx.block_hash == block_hash)
            .cloned()
            .collect())
    }

    async fn spending_transaction(
        &self,
        funding_tx_hash: &str,
        vout_index: u32,
    ) -> Result<(String, u32, TxTree), ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .vins
            .iter()
            .find(|vin| vin.prev_tx_hash == funding_tx_hash && vin.prev_tx_index == vout_index)
            .map(|vin| (vin.tx_hash.clone(), vin.tx_index, vin.tx_tree))
            .ok_or(ChainIndexError::NotFound)
    }

    async fn spending_transactions(
        &self,
        funding_tx_hash: &str,
    ) -> Result<Vec<(String, u32, u32)>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .vins
            .iter()
            .filter(|vin| vin.prev_tx_hash == funding_tx_hash)
            .map(|vin| (vin.tx_hash.clone(), vin.tx_index, vin.prev_tx_index))
            .collect())
    }

    async fn vout_value(&self, tx_hash: &str, vout_index: u32) -> Result<u64, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .vouts
            .iter()
            .find(|v| v.tx_hash == tx_hash && v.tx_index == vout_index)
            .map(|v| v.value)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn vout_values(&self, tx_hash: &str) -> Result<Vec<u64>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut vouts: Vec<&VoutRow> = inner
            .vouts
            .iter()
            .filter(|v| v.tx_hash == tx_hash)
            .collect();
        vouts.sort_by_key(|v| v.tx_index);
        Ok(vouts.iter().map(|v| v.value).collect())
    }

    async fn missed_votes_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<String>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.misses.get(block_hash).cloned().unwrap_or_default())
    }

    async fn ticket_status(
        &self,
        ticket_hash: &str,
    ) -> Result<(TicketSpendType, PoolStatus), ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let pos = inner.ticket_pos(ticket_hash).ok_or(ChainIndexError::NotFound)?;
        let ticket = &inner.tickets[pos];
        Ok((ticket.spend_type, ticket.pool_status))
    }

    async fn ticket_row_id_by_hash(&self, ticket_hash: &str) -> Result<u64, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        inner
            .ticket_pos(ticket_hash)
            .map(|pos| pos as u64 + 1)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn unspent_tickets(&self) -> Result<(Vec<u64>, Vec<String>), ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut ids = Vec::new();
        let mut hashes = Vec::new();
        for (i, ticket) in inner.tickets.iter().enumerate() {
            if ticket.spend_type == TicketSpendType::Unspent && ticket.is_mainchain {
                ids.push(i as u64 + 1);
                hashes.push(ticket.tx_hash.clone());
            }
        }
        Ok((ids, hashes))
    }

    async fn side_chain_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok((0..inner.blocks.len())
            .filter(|pos| !inner.blocks[*pos].is_mainchain)
            .map(|pos| inner.block_status_at(pos))
            .collect())
    }

    async fn disapproved_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok((0..inner.blocks.len())
            .filter(|pos| !inner.blocks[*pos].is_valid)
            .map(|pos| inner.block_status_at(pos))
            .collect())
    }

    // ── Mainchain/validity flag flips ────────────────────────────────────────

    async fn set_block_mainchain(
        &self,
        hash: &str,
        is_mainchain: bool,
    ) -> Result<String, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let pos = inner.block_pos(hash).ok_or(ChainIndexError::NotFound)?;
        inner.blocks[pos].is_mainchain = is_mainchain;
        Ok(inner.blocks[pos].prev_hash.clone())
    }

    async fn set_block_valid(
        &self,
        block_row_id: u64,
        is_valid: bool,
    ) -> Result<(), ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let pos = (block_row_id as usize)
            .checked_sub(1)
            .filter(|p| *p < inner.blocks.len())
            .ok_or(ChainIndexError::NotFound)?;
        inner.blocks[pos].is_valid = is_valid;
        Ok(())
    }

    async fn set_transactions_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for tx in inner.txns.iter_mut() {
            if tx.block_hash == block_hash {
                tx.is_mainchain = is_mainchain;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn block_vin_vout_ids(
        &self,
        block_hash: &str,
    ) -> Result<Vec<TxIoIds>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .txns
            .iter()
            .filter(|tx| tx.block_hash == block_hash)
            .map(|tx| TxIoIds {
                tx_hash: tx.hash.clone(),
                vin_row_ids: tx.vin_row_ids.clone(),
                vout_row_ids: tx.vout_row_ids.clone(),
                is_mainchain: tx.is_mainchain,
            })
            .collect())
    }

    async fn set_vins_mainchain(
        &self,
        vin_row_ids: &[u64],
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for id in vin_row_ids {
            if let Some(vin) = inner.vins.get_mut((*id - 1) as usize) {
                vin.is_mainchain = is_mainchain;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_addresses_mainchain_by_ids(
        &self,
        vin_row_ids: &[u64],
        vout_row_ids: &[u64],
        valid_mainchain: bool,
    ) -> Result<(u64, u64), ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;

        let mut spending = 0u64;
        for id in vin_row_ids {
            let Some(vin) = inner.vins.get((*id - 1) as usize).cloned() else {
                continue;
            };
            for row in inner.addr_rows.iter_mut() {
                if !row.is_funding && row.tx_hash == vin.tx_hash && row.io_index == vin.tx_index {
                    row.valid_mainchain = valid_mainchain;
                    spending += 1;
                }
            }
        }

        let mut funding = 0u64;
        for id in vout_row_ids {
            let Some(vout) = inner.vouts.get((*id - 1) as usize).cloned() else {
                continue;
            };
            for row in inner.addr_rows.iter_mut() {
                if row.is_funding && row.tx_hash == vout.tx_hash && row.io_index == vout.tx_index
                {
                    row.valid_mainchain = valid_mainchain;
                    funding += 1;
                }
            }
        }

        Ok((spending, funding))
    }

    async fn set_votes_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for vote in inner.votes.iter_mut() {
            if vote.block_hash == block_hash {
                vote.is_mainchain = is_mainchain;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_tickets_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for ticket in inner.tickets.iter_mut() {
            if ticket.block_hash == block_hash {
                ticket.is_mainchain = is_mainchain;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_regular_txns_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for tx in inner.txns.iter_mut() {
            if tx.block_hash == block_hash && tx.tree == TxTree::Regular {
                tx.is_valid = is_valid;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_regular_vins_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;
        let vin_ids: Vec<u64> = inner
            .txns
            .iter()
            .filter(|tx| tx.block_hash == block_hash && tx.tree == TxTree::Regular)
            .flat_map(|tx| tx.vin_row_ids.iter().copied())
            .collect();
        let mut count = 0u64;
        for id in vin_ids {
            if let Some(vin) = inner.vins.get_mut((id - 1) as usize) {
                vin.is_valid = is_valid;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_addresses_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;
        let tx_hashes: Vec<String> = inner
            .txns
            .iter()
            .filter(|tx| tx.block_hash == block_hash && tx.tree == TxTree::Regular)
            .map(|tx| tx.hash.clone())
            .collect();
        let mut count = 0u64;
        for row in inner.addr_rows.iter_mut() {
            if tx_hashes.iter().any(|h| *h == row.tx_hash) {
                row.valid_mainchain = is_valid;
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Ticket spend bookkeeping ─────────────────────────────────────────────

    async fn set_spending_for_tickets(
        &self,
        updates: &[TicketSpendUpdate],
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for update in updates {
            if let Some(ticket) = inner
                .tickets
                .get_mut((update.ticket_row_id as usize).wrapping_sub(1))
            {
                ticket.spending_tx_row_id = Some(update.spending_tx_row_id);
                ticket.spend_height = Some(update.spend_height);
                ticket.spend_type = update.spend_type;
                ticket.pool_status = update.pool_status;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn set_pool_statuses_by_hash(
        &self,
        ticket_hashes: &[String],
        statuses: &[PoolStatus],
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut count = 0u64;
        for (hash, status) in ticket_hashes.iter().zip(statuses.iter()) {
            let inner = &mut *inner;
            if let Some(pos) = inner.ticket_pos(hash) {
                inner.tickets[pos].pool_status = *status;
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Address ledger ───────────────────────────────────────────────────────

    async fn set_spending_for_funding_op(
        &self,
        op: &SpendingOp,
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.apply_spending_op(op))
    }

    async fn address_rows(
        &self,
        address: &str,
        kind: AddrTxnKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AddressRow>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<AddressRow> = inner
            .addr_rows
            .iter()
            .filter(|r| r.address == address)
            .filter(|r| match kind {
                AddrTxnKind::All => true,
                AddrTxnKind::Credit => r.is_funding,
                AddrTxnKind::Debit | AddrTxnKind::MergedDebit => !r.is_funding,
            })
            .cloned()
            .collect();

        if kind == AddrTxnKind::MergedDebit {
            // Merge debits per spending transaction, summing values.
            let mut merged: Vec<AddressRow> = Vec::new();
            for row in rows {
                match merged.iter_mut().find(|m| m.tx_hash == row.tx_hash) {
                    Some(m) => m.value += row.value,
                    None => merged.push(AddressRow {
                        io_index: 0,
                        matching_tx_hash: None,
                        ..row
                    }),
                }
            }
            rows = merged;
        }

        rows.sort_by(|a, b| b.block_time.cmp(&a.block_time));
        let start = (offset.max(0) as usize).min(rows.len());
        let end = if limit > 0 {
            (start + limit as usize).min(rows.len())
        } else {
            rows.len()
        };
        Ok(rows[start..end].to_vec())
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut balance = AddressBalance {
            address: address.to_string(),
            ..Default::default()
        };
        for row in inner.addr_rows.iter() {
            if row.address != address || !row.valid_mainchain || !row.is_funding {
                continue;
            }
            if row.matching_tx_hash.is_some() {
                balance.num_spent += 1;
                balance.total_spent += row.value;
            } else {
                balance.num_unspent += 1;
                balance.total_unspent += row.value;
            }
        }
        Ok(balance)
    }

    // ── Bulk rebuild support ─────────────────────────────────────────────────

    async fn all_vin_ids(&self) -> Result<Vec<u64>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        Ok((1..=inner.vins.len() as u64).collect())
    }

    async fn set_spending_for_vin_ids(
        &self,
        vin_row_ids: &[u64],
    ) -> Result<u64, ChainIndexError> {
        let mut inner = self.inner.write().unwrap();
        let mut touched = 0u64;
        for id in vin_row_ids {
            let Some(vin) = inner.vins.get((*id - 1) as usize).cloned() else {
                continue;
            };
            if vin.prev_tx_hash == ZERO_HASH {
                continue;
            }
            let Some(tx_id) = inner.txn_id_by_hash(&vin.tx_hash) else {
                continue;
            };
            let tx = inner.txns[(tx_id - 1) as usize].clone();
            let op = SpendingOp {
                prev_tx_hash: vin.prev_tx_hash.clone(),
                prev_tx_index: vin.prev_tx_index,
                prev_tx_tree: vin.prev_tx_tree,
                spending_tx_hash: vin.tx_hash.clone(),
                spending_tx_vin_index: vin.tx_index,
                vin_row_id: *id,
                block_time: tx.block_time,
                valid_mainchain: tx.is_valid && tx.is_mainchain,
            };
            touched += inner.apply_spending_op(&op);
        }
        Ok(touched)
    }

    async fn all_vote_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut info = Vec::with_capacity(inner.votes.len());
        for vote in inner.votes.iter() {
            let Some(id) = inner
                .txn_ids
                .get(&(vote.tx_hash.clone(), vote.block_hash.clone()))
            else {
                continue;
            };
            info.push(VoteSpendInfo {
                spending_tx_row_id: *id,
                block_height: vote.block_height,
                ticket_hash: vote.ticket_hash.clone(),
            });
        }
        Ok(info)
    }

    async fn all_revocation_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut info = Vec::new();
        for (i, tx) in inner.txns.iter().enumerate() {
            if tx.tx_type != TxType::Revocation {
                continue;
            }
            // A revocation's single input spends the ticket.
            let Some(ticket_hash) = tx
                .vin_row_ids
                .first()
                .and_then(|id| inner.vins.get((*id - 1) as usize))
                .map(|vin| vin.prev_tx_hash.clone())
            else {
                continue;
            };
            info.push(VoteSpendInfo {
                spending_tx_row_id: i as u64 + 1,
                block_height: tx.block_height,
                ticket_hash,
            });
        }
        Ok(info)
    }

    // ── Ticket pool charts ───────────────────────────────────────────────────

    async fn tickets_by_purchase_date(
        &self,
        maturity_height: u64,
        interval_secs: i64,
    ) -> Result<PoolTicketsData, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        // bucket time → (count, total price)
        let mut buckets: Vec<(i64, u64, u64)> = Vec::new();
        for ticket in live_pool(&inner.tickets, maturity_height) {
            let Some(time) = inner.block_time(&ticket.block_hash) else {
                continue;
            };
            let bucket = time - time % interval_secs;
            match buckets.iter_mut().find(|(t, _, _)| *t == bucket) {
                Some((_, count, total)) => {
                    *count += 1;
                    *total += ticket.price;
                }
                None => buckets.push((bucket, 1, ticket.price)),
            }
        }
        buckets.sort_by_key(|(t, _, _)| *t);
        Ok(PoolTicketsData {
            time: buckets.iter().map(|(t, _, _)| *t).collect(),
            price: buckets
                .iter()
                .map(|(_, count, total)| to_coins(*total) / *count as f64)
                .collect(),
            count: buckets.iter().map(|(_, count, _)| *count).collect(),
        })
    }

    async fn tickets_by_price(
        &self,
        maturity_height: u64,
    ) -> Result<PoolTicketsData, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut buckets: Vec<(u64, u64)> = Vec::new();
        for ticket in live_pool(&inner.tickets, maturity_height) {
            match buckets.iter_mut().find(|(price, _)| *price == ticket.price) {
                Some((_, count)) => *count += 1,
                None => buckets.push((ticket.price, 1)),
            }
        }
        buckets.sort_by_key(|(price, _)| *price);
        Ok(PoolTicketsData {
            time: Vec::new(),
            price: buckets.iter().map(|(price, _)| to_coins(*price)).collect(),
            count: buckets.iter().map(|(_, count)| *count).collect(),
        })
    }

    async fn tickets_by_input_count(&self) -> Result<PoolTicketsData, ChainIndexError> {
        let inner = self.inner.read().unwrap();
        let mut buckets: Vec<(u32, u64)> = Vec::new();
        for ticket in inner.tickets.iter() {
            if ticket.spend_type != TicketSpendType::Unspent
                || ticket.pool_status != PoolStatus::Live
                || !ticket.is_mainchain
            {
                continue;
            }
            match buckets.iter_mut().find(|(n, _)| *n == ticket.num_inputs) {
                Some((_, count)) => *count += 1,
                None => buckets.push((ticket.num_inputs, 1)),
            }
        }
        buckets.sort_by_key(|(n, _)| *n);
        // The time axis carries the input-count buckets for the donut chart.
        Ok(PoolTicketsData {
            time: buckets.iter().map(|(n, _)| *n as i64).collect(),
            price: Vec::new(),
            count: buckets.iter().map(|(_, count)| *count).collect(),
        })
    }
}

/// Live-pool tickets already mature at the given height.
fn live_pool(tickets: &[TicketRow], maturity_height: u64) -> impl Iterator<Item = &TicketRow> {
    tickets.iter().filter(move |t| {
        t.spend_type == TicketSpendType::Unspent
            && t.pool_status == PoolStatus::Live
            && t.is_mainchain
            && t.block_height <= maturity_height
    })
}

/// Atomic units to whole coins.
fn to_coins(atoms: u64) -> f64 {
    atoms as f64 / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vout(tx: &str, idx: u32, value: u64, addr: &str) -> VoutRow {
        VoutRow {
            tx_hash: tx.into(),
            tx_index: idx,
            tx_tree: TxTree::Regular,
            value,
            script: "76a914".into(),
            addresses: vec![addr.into()],
        }
    }

    fn block(height: u64, hash: &str, prev: &str) -> BlockRow {
        BlockRow {
            height,
            hash: hash.into(),
            prev_hash: prev.into(),
            time: 1_700_000_000 + height as i64 * 300,
            vote_bits: 1,
            tx_count: 0,
            stx_count: 0,
            is_valid: true,
            is_mainchain: true,
            tx_row_ids: vec![],
            stx_row_ids: vec![],
        }
    }

    fn ticket_row(tx: &str, block_hash: &str, height: u64) -> TicketRow {
        TicketRow {
            tx_hash: tx.into(),
            block_hash: block_hash.into(),
            block_height: height,
            purchase_tx_row_id: 1,
            price: 100,
            num_inputs: 1,
            spend_type: TicketSpendType::Unspent,
            pool_status: PoolStatus::Live,
            spending_tx_row_id: None,
            spend_height: None,
            is_mainchain: true,
        }
    }

    #[tokio::test]
    async fn reinserted_ticket_regains_mainchain() {
        let store = MemoryStore::new();
        let tickets = vec![ticket_row("t1", "b1", 1)];
        let first = store.insert_tickets(&tickets).await.unwrap();

        store.set_tickets_mainchain("b1", false).await.unwrap();
        let (_, hashes) = store.unspent_tickets().await.unwrap();
        assert!(hashes.is_empty());

        // A reorg promoted the branch back; re-ingestion reinserts the
        // ticket as mainchain and the pool preload must see it again.
        let second = store.insert_tickets(&tickets).await.unwrap();
        assert_eq!(first, second);
        let (_, hashes) = store.unspent_tickets().await.unwrap();
        assert_eq!(hashes, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_inserts_return_same_ids() {
        let store = MemoryStore::new();
        let vouts = vec![vout("aa", 0, 500, "addr1"), vout("aa", 1, 700, "addr2")];

        let first = store.insert_vouts(&vouts).await.unwrap();
        let second = store.insert_vouts(&vouts).await.unwrap();

        assert_eq!(first, vec![1, 2]);
        assert_eq!(first, second);
        assert_eq!(store.inner.read().unwrap().vouts.len(), 2);
    }

    #[tokio::test]
    async fn block_linkage_and_best_block() {
        let store = MemoryStore::new();
        let id0 = store.insert_block(&block(0, "b0", ZERO_HASH)).await.unwrap();
        let id1 = store.insert_block(&block(1, "b1", "b0")).await.unwrap();
        store.set_block_next(id0, "b1").await.unwrap();

        assert_eq!((id0, id1), (1, 2));
        assert_eq!(store.best_block().await.unwrap(), (1, "b1".to_string()));

        let status = store.block_status("b0").await.unwrap();
        assert_eq!(status.next_hash, "b1");
        assert!(status.is_mainchain);
    }

    #[tokio::test]
    async fn set_block_mainchain_returns_prev_hash() {
        let store = MemoryStore::new();
        store.insert_block(&block(5, "b5", "b4")).await.unwrap();

        let prev = store.set_block_mainchain("b5", false).await.unwrap();
        assert_eq!(prev, "b4");
        assert_eq!(store.side_chain_blocks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spending_op_inserts_debit_and_backfills_match() {
        let store = MemoryStore::new();
        store.insert_vouts(&[vout("fund", 0, 900, "addrX")]).await.unwrap();
        store
            .insert_address_rows(&[AddressRow {
                address: "addrX".into(),
                tx_hash: "fund".into(),
                io_index: 0,
                is_funding: true,
                value: 900,
                block_time: 100,
                matching_tx_hash: None,
                valid_mainchain: true,
            }])
            .await
            .unwrap();

        let touched = store
            .set_spending_for_funding_op(&SpendingOp {
                prev_tx_hash: "fund".into(),
                prev_tx_index: 0,
                prev_tx_tree: TxTree::Regular,
                spending_tx_hash: "spend".into(),
                spending_tx_vin_index: 0,
                vin_row_id: 1,
                block_time: 200,
                valid_mainchain: true,
            })
            .await
            .unwrap();
        assert_eq!(touched, 2); // one debit row inserted, one funding row matched

        let rows = store
            .address_rows("addrX", AddrTxnKind::All, 0, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let funding = rows.iter().find(|r| r.is_funding).unwrap();
        assert_eq!(funding.matching_tx_hash.as_deref(), Some("spend"));

        let balance = store.address_balance("addrX").await.unwrap();
        assert_eq!(balance.num_spent, 1);
        assert_eq!(balance.total_spent, 900);
        assert_eq!(balance.total_unspent, 0);
    }

    #[tokio::test]
    async fn merged_debits_sum_values_per_tx() {
        let store = MemoryStore::new();
        let debit = |idx: u32, value: u64| AddressRow {
            address: "addrM".into(),
            tx_hash: "spender".into(),
            io_index: idx,
            is_funding: false,
            value,
            block_time: 50,
            matching_tx_hash: Some("prev".into()),
            valid_mainchain: true,
        };
        store
            .insert_address_rows(&[debit(0, 100), debit(1, 250)])
            .await
            .unwrap();

        let merged = store
            .address_rows("addrM", AddrTxnKind::MergedDebit, 0, 0)
            .await
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, 350);
    }

    #[tokio::test]
    async fn missing_lookups_are_not_found() {
        let store = MemoryStore::new();
        assert!(store.best_block().await.unwrap_err().is_not_found());
        assert!(store.block_row_id("nope").await.unwrap_err().is_not_found());
        assert!(store
            .spending_transaction("nope", 0)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
