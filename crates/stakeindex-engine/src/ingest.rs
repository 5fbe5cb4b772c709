//! Block ingestion.
//!
//! One block is stored in three phases: the two transaction trees are
//! ingested concurrently (outputs, inputs, transactions, address ledger,
//! and the stake records for the stake tree), then the block row is written
//! with the collected transaction row IDs, then the mainchain bookkeeping
//! runs (parent linkage, the one-block-deep validity cascade, best-block
//! and cache updates).
//!
//! There are no storage transactions. Every insert is duplicate-safe by
//! natural key, so recovery from a partial write is re-ingesting the block.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::extract::extract_block_tree;
use stakeindex_core::stake::{classify_spends, unrevoked_miss_updates, TicketSpend};
use stakeindex_core::store::{ChainStore, SpendingOp, TicketSpendUpdate};
use stakeindex_core::ticket_cache::{self, TicketIdCache};
use stakeindex_core::types::{
    BlockRow, PoolStatus, RawBlock, TicketRow, TicketSpendType, TxTree, TxType, VoteRow,
    ZERO_HASH,
};
use stakeindex_core::StakeTracker;

use crate::chain::ChainDb;

/// What one [`ChainDb::store_block`] call wrote.
#[derive(Debug, Clone, Copy)]
pub struct BlockIngestResult {
    pub block_row_id: u64,
    pub num_vins: u64,
    pub num_vouts: u64,
}

/// Row IDs and counts from one stored transaction tree.
struct TreeResult {
    tx_row_ids: Vec<u64>,
    num_vins: u64,
    num_vouts: u64,
}

fn join_tree(
    res: Result<Result<TreeResult, ChainIndexError>, tokio::task::JoinError>,
) -> Result<TreeResult, ChainIndexError> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(ChainIndexError::TreeTask(e.to_string())),
    }
}

impl ChainDb {
    /// Ingest one block with the given chain classification, with all
    /// spend-info updates applied inline.
    pub async fn store_block(
        &self,
        block: &RawBlock,
        is_valid: bool,
        is_mainchain: bool,
    ) -> Result<BlockIngestResult, ChainIndexError> {
        self.store_block_ext(block, is_valid, is_mainchain, true, true)
            .await
    }

    /// Ingest one block. The two update flags defer the per-input address
    /// spend backfill and the ticket spend classification; a batch sync
    /// turns them off and runs the bulk rebuild passes once at the end.
    ///
    /// For a mainchain, non-genesis block the stake tracker must know the
    /// parent's winning tickets; without them ticket-vote linkage cannot be
    /// established and the block is rejected. Side-chain blocks are stored
    /// without winners.
    pub async fn store_block_ext(
        &self,
        block: &RawBlock,
        is_valid: bool,
        is_mainchain: bool,
        update_addr_spend: bool,
        update_ticket_spend: bool,
    ) -> Result<BlockIngestResult, ChainIndexError> {
        let header = &block.header;
        let winners = if is_mainchain && !block.has_genesis_parent() {
            match self.stake.pool_info(&header.prev_hash) {
                Some(winners) => winners,
                None => {
                    return Err(ChainIndexError::StakePoolInfo {
                        block_hash: header.prev_hash.clone(),
                    })
                }
            }
        } else {
            Vec::new()
        };

        // Both trees ingest concurrently. Stake-tree transactions are not
        // subject to stakeholder approval, so that tree is always valid.
        let shared = Arc::new(block.clone());
        let regular_task = tokio::spawn(store_tree(TreeJob {
            store: self.store.clone(),
            stake: self.stake.clone(),
            ticket_cache: self.ticket_cache.clone(),
            block: shared.clone(),
            tree: TxTree::Regular,
            is_valid,
            is_mainchain,
            winners: Vec::new(),
            update_addr_spend,
            update_ticket_spend,
        }));
        let stake_task = tokio::spawn(store_tree(TreeJob {
            store: self.store.clone(),
            stake: self.stake.clone(),
            ticket_cache: self.ticket_cache.clone(),
            block: shared,
            tree: TxTree::Stake,
            is_valid: true,
            is_mainchain,
            winners,
            update_addr_spend,
            update_ticket_spend,
        }));

        let (regular_res, stake_res) = tokio::join!(regular_task, stake_task);
        let (regular, stake) = match (join_tree(regular_res), join_tree(stake_res)) {
            (Ok(regular), Ok(stake)) => (regular, stake),
            (Err(e), Ok(stake)) => {
                error!(
                    hash = %header.hash,
                    stake_txns = stake.tx_row_ids.len(),
                    stake_vins = stake.num_vins,
                    "regular tree failed, stake tree stored: {e}"
                );
                return Err(e);
            }
            (Ok(regular), Err(e)) => {
                error!(
                    hash = %header.hash,
                    regular_txns = regular.tx_row_ids.len(),
                    regular_vins = regular.num_vins,
                    "stake tree failed, regular tree stored: {e}"
                );
                return Err(e);
            }
            (Err(regular), Err(stake)) => {
                return Err(ChainIndexError::BothTrees {
                    regular: regular.to_string(),
                    stake: stake.to_string(),
                })
            }
        };

        let block_row = BlockRow {
            height: header.height,
            hash: header.hash.clone(),
            prev_hash: header.prev_hash.clone(),
            time: header.time,
            vote_bits: header.vote_bits,
            tx_count: block.regular.len() as u32,
            stx_count: block.stake.len() as u32,
            is_valid,
            is_mainchain,
            tx_row_ids: regular.tx_row_ids,
            stx_row_ids: stake.tx_row_ids,
        };
        let block_row_id = self.store.insert_block(&block_row).await?;
        self.last_block
            .lock()
            .await
            .insert(header.hash.clone(), block_row_id);

        if is_mainchain {
            if block.has_genesis_parent() {
                debug!(hash = %header.hash, "genesis block, no parent linkage");
            } else {
                self.link_parent(block).await?;
                if !header.approves_parent() {
                    self.invalidate_parent(&header.prev_hash).await?;
                }
            }

            self.set_best(header.height, &header.hash);

            let in_batch_sync = self.in_batch_sync.load(Ordering::SeqCst);
            if !in_batch_sync {
                // Balances are keyed by height; all entries are now behind.
                self.addr_cache.clear().await;
            }

            if self.dev_prefetch && !in_batch_sync && !self.in_reorg.load(Ordering::SeqCst) {
                let store = self.store.clone();
                let cache = self.dev_cache.clone();
                let address = self.params.dev_subsidy_address.clone();
                let hash = header.hash.clone();
                tokio::spawn(async move {
                    let Some(_guard) = cache.try_begin_update() else {
                        return;
                    };
                    match store.address_balance(&address).await {
                        Ok(balance) => cache.set(&hash, balance).await,
                        Err(e) => warn!("dev balance refresh failed: {e}"),
                    }
                });
            }
        }

        info!(
            height = header.height,
            hash = %header.hash,
            txns = block_row.tx_count,
            stxns = block_row.stx_count,
            is_mainchain,
            "block stored"
        );

        Ok(BlockIngestResult {
            block_row_id,
            num_vins: regular.num_vins + stake.num_vins,
            num_vouts: regular.num_vouts + stake.num_vouts,
        })
    }

    /// Point the parent block's next-hash at this block. A missing parent is
    /// logged and skipped; a side-chain parent indicates the caller connected
    /// a block whose ancestry was not reclassified first.
    async fn link_parent(&self, block: &RawBlock) -> Result<(), ChainIndexError> {
        let prev_hash = &block.header.prev_hash;
        let parent_id = self.last_block.lock().await.get(prev_hash).copied();
        let parent_id = match parent_id {
            Some(id) => id,
            None => match self.store.block_row_id(prev_hash).await {
                Ok(id) => id,
                Err(e) if e.is_not_found() => {
                    warn!(%prev_hash, "parent block not stored, linkage skipped");
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };

        match self.store.block_status(prev_hash).await {
            Ok(status) if !status.is_mainchain => {
                error!(%prev_hash, "parent of mainchain block is on a side chain");
            }
            Err(e) if !e.is_not_found() => return Err(e),
            _ => {}
        }

        self.store
            .set_block_next(parent_id, &block.header.hash)
            .await
    }

    /// Apply stakeholder disapproval to the parent block: its block row, its
    /// regular-tree transactions, their inputs, and the matching address
    /// ledger rows. The cascade is exactly one block deep.
    async fn invalidate_parent(&self, prev_hash: &str) -> Result<(), ChainIndexError> {
        let parent_id = match self.store.block_row_id(prev_hash).await {
            Ok(id) => id,
            Err(e) if e.is_not_found() => {
                warn!(%prev_hash, "disapproved parent not stored");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.store.set_block_valid(parent_id, false).await?;
        let txns = self.store.set_regular_txns_valid(prev_hash, false).await?;
        let vins = self.store.set_regular_vins_valid(prev_hash, false).await?;
        let addresses = self.store.set_addresses_valid(prev_hash, false).await?;
        info!(%prev_hash, txns, vins, addresses, "stakeholders disapproved parent block");
        Ok(())
    }
}

/// Everything one tree task needs.
struct TreeJob {
    store: Arc<dyn ChainStore>,
    stake: Arc<dyn StakeTracker>,
    ticket_cache: Option<Arc<TicketIdCache>>,
    block: Arc<RawBlock>,
    tree: TxTree,
    is_valid: bool,
    is_mainchain: bool,
    winners: Vec<String>,
    update_addr_spend: bool,
    update_ticket_spend: bool,
}

/// Store one transaction tree: outputs and inputs per transaction, then the
/// transactions with their resolved row-ID sets, the funding address rows,
/// the stake records (stake tree only), and finally the spending-side
/// address backfill.
async fn store_tree(job: TreeJob) -> Result<TreeResult, ChainIndexError> {
    let TreeJob {
        store,
        stake,
        ticket_cache,
        block,
        tree,
        is_valid,
        is_mainchain,
        winners,
        update_addr_spend,
        update_ticket_spend,
    } = job;
    let mut extracted = extract_block_tree(&block, tree, is_valid, is_mainchain);

    for i in 0..extracted.txns.len() {
        let vout_ids = store.insert_vouts(&extracted.vouts[i]).await?;
        let vin_ids = store.insert_vins(&extracted.vins[i]).await?;
        extracted.txns[i].vout_row_ids = vout_ids;
        extracted.txns[i].vin_row_ids = vin_ids;
    }
    let tx_row_ids = store.insert_txns(&extracted.txns).await?;

    let funding_rows: Vec<_> = extracted
        .address_rows
        .iter()
        .flat_map(|rows| rows.iter().cloned())
        .collect();
    store.insert_address_rows(&funding_rows).await?;

    if tree == TxTree::Stake {
        store_stake_records(
            &*store,
            &*stake,
            ticket_cache.as_deref(),
            &block,
            &tx_row_ids,
            &winners,
            is_mainchain,
            update_ticket_spend,
        )
        .await?;
    }

    if !update_addr_spend {
        return Ok(TreeResult {
            num_vins: extracted.num_vins(),
            num_vouts: extracted.num_vouts(),
            tx_row_ids,
        });
    }

    // Spending-side address ledger. Failures here lose auxiliary linkage,
    // not chain data, and a later rebuild can repair them.
    for (i, tx) in extracted.txns.iter().enumerate() {
        let valid_mainchain = tx.is_valid && is_mainchain;
        for vin in &extracted.vins[i] {
            if vin.prev_tx_hash == ZERO_HASH {
                continue;
            }
            let op = SpendingOp {
                prev_tx_hash: vin.prev_tx_hash.clone(),
                prev_tx_index: vin.prev_tx_index,
                prev_tx_tree: vin.prev_tx_tree,
                spending_tx_hash: tx.hash.clone(),
                spending_tx_vin_index: vin.tx_index,
                vin_row_id: tx.vin_row_ids[vin.tx_index as usize],
                block_time: block.header.time,
                valid_mainchain,
            };
            if let Err(e) = store.set_spending_for_funding_op(&op).await {
                warn!(tx = %tx.hash, vin = vin.tx_index, "address spend backfill failed: {e}");
            }
        }
    }

    Ok(TreeResult {
        num_vins: extracted.num_vins(),
        num_vouts: extracted.num_vouts(),
        tx_row_ids,
    })
}

/// Stake-tree bookkeeping: ticket rows (cached write-through), vote rows,
/// misses, and the pool-status classification of every ticket this block
/// spends or calls.
#[allow(clippy::too_many_arguments)]
async fn store_stake_records(
    store: &dyn ChainStore,
    stake: &dyn StakeTracker,
    cache: Option<&TicketIdCache>,
    block: &RawBlock,
    tx_row_ids: &[u64],
    winners: &[String],
    is_mainchain: bool,
    update_ticket_spend: bool,
) -> Result<(), ChainIndexError> {
    let header = &block.header;

    // Ticket purchases enter the pool live and unspent.
    let mut ticket_rows = Vec::new();
    for (i, raw) in block.stake.iter().enumerate() {
        if raw.tx_type != TxType::Ticket {
            continue;
        }
        ticket_rows.push(TicketRow {
            tx_hash: raw.hash.clone(),
            block_hash: header.hash.clone(),
            block_height: header.height,
            purchase_tx_row_id: tx_row_ids[i],
            price: raw.outputs.first().map(|o| o.value).unwrap_or(0),
            num_inputs: raw.inputs.len() as u32,
            spend_type: TicketSpendType::Unspent,
            pool_status: PoolStatus::Live,
            spending_tx_row_id: None,
            spend_height: None,
            is_mainchain,
        });
    }
    if !ticket_rows.is_empty() {
        let ids = store.insert_tickets(&ticket_rows).await?;
        if let Some(cache) = cache {
            let hashes: Vec<String> = ticket_rows.iter().map(|t| t.tx_hash.clone()).collect();
            cache.set_many(&hashes, &ids);
        }
        debug!(tickets = ticket_rows.len(), hash = %header.hash, "tickets stored");
    }

    // Votes, and the winners that failed to vote.
    let mut vote_rows = Vec::new();
    let mut voted = Vec::new();
    for raw in &block.stake {
        if raw.tx_type != TxType::Vote {
            continue;
        }
        let Some(ticket_hash) = raw.spent_ticket_hash() else {
            warn!(tx = %raw.hash, "vote without a ticket input");
            continue;
        };
        vote_rows.push(VoteRow {
            tx_hash: raw.hash.clone(),
            block_hash: header.hash.clone(),
            block_height: header.height,
            ticket_hash: ticket_hash.to_string(),
            vote_bits: header.vote_bits,
            approves_parent: header.approves_parent(),
            is_mainchain,
        });
        voted.push(ticket_hash.to_string());
    }
    if !vote_rows.is_empty() {
        store.insert_votes(&vote_rows).await?;
    }

    let misses: Vec<String> = winners
        .iter()
        .filter(|w| !voted.contains(w))
        .cloned()
        .collect();
    if !misses.is_empty() {
        store.insert_misses(&header.hash, &misses).await?;
    }

    if !update_ticket_spend {
        return Ok(());
    }

    // Ticket spends: votes consume their ticket, revocations reclaim one.
    let mut spends = Vec::new();
    for (i, raw) in block.stake.iter().enumerate() {
        let spend_type = match raw.tx_type {
            TxType::Vote => TicketSpendType::Voted,
            TxType::Revocation => TicketSpendType::Revoked,
            _ => continue,
        };
        let Some(ticket_hash) = raw.spent_ticket_hash() else {
            continue;
        };
        // The ticket is spent exactly once, so a cache hit expires the entry.
        let ticket_row_id =
            match ticket_cache::ticket_row_id(cache, store, ticket_hash, true).await {
                Ok(id) => id,
                Err(e) if e.is_not_found() => {
                    warn!(ticket = ticket_hash, tx = %raw.hash, "spent ticket not indexed");
                    continue;
                }
                Err(e) => return Err(e),
            };
        spends.push(TicketSpend {
            ticket_hash: ticket_hash.to_string(),
            ticket_row_id,
            spending_tx_row_id: tx_row_ids[i],
            spend_type,
        });
    }

    // All stake-node reads happen under one lock so the classification of
    // this block's spends and misses sees a single consistent view. The
    // store writes are applied after the guard drops.
    let (statuses, miss_hashes, miss_statuses) = {
        let node = stake.lock_best_node();
        let (statuses, revokes) = classify_spends(&spends, node.as_ref());
        let (miss_hashes, miss_statuses) =
            unrevoked_miss_updates(&misses, &revokes, node.as_ref());
        (statuses, miss_hashes, miss_statuses)
    };

    let updates: Vec<TicketSpendUpdate> = spends
        .iter()
        .zip(statuses.iter())
        .map(|(spend, status)| TicketSpendUpdate {
            ticket_row_id: spend.ticket_row_id,
            spending_tx_row_id: spend.spending_tx_row_id,
            spend_height: header.height,
            spend_type: spend.spend_type,
            pool_status: *status,
        })
        .collect();
    if !updates.is_empty() {
        match store.set_spending_for_tickets(&updates).await {
            Ok(n) if n != updates.len() as u64 => {
                warn!(expected = updates.len(), updated = n, "ticket spend update count mismatch");
            }
            Ok(_) => {}
            Err(e) => warn!(hash = %header.hash, "recording ticket spends failed: {e}"),
        }
    }
    if !miss_hashes.is_empty() {
        if let Err(e) = store
            .set_pool_statuses_by_hash(&miss_hashes, &miss_statuses)
            .await
        {
            warn!(hash = %header.hash, "marking missed/expired tickets failed: {e}");
        }
    }

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use stakeindex_core::types::{PoolStatus, TicketSpendType};

    use crate::testutil::*;

    #[tokio::test]
    async fn reingesting_a_block_converges() {
        let (store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);

        let first = db.store_block(&b0, true, true).await.unwrap();
        let second = db.store_block(&b0, true, true).await.unwrap();

        assert_eq!(first.block_row_id, second.block_row_id);
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.txn_count(), 1);
        assert_eq!(db.best_block(), Some((0, "b0".to_string())));
    }

    #[tokio::test]
    async fn disapproval_cascades_exactly_one_block() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner"), ordinary("tx1", "cb0", 0, 40, "alice")],
            vec![]);
        // b2's stakeholders disapprove b1 (vote bit 0 clear).
        let b2 = raw_block(2, "b2", "b1", 0xfffe, vec![coinbase("cb2", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &[]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();

        let b1_status = db.block_status("b1").await.unwrap();
        assert!(!b1_status.is_valid);
        assert!(b1_status.is_mainchain);

        let tx1 = &db.transactions_by_hash("tx1").await.unwrap()[0];
        assert!(!tx1.is_valid);

        // The cascade stops at b1: its parent b0 is untouched.
        let b0_status = db.block_status("b0").await.unwrap();
        assert!(b0_status.is_valid);
        let cb0 = &db.transactions_by_hash("cb0").await.unwrap()[0];
        assert!(cb0.is_valid);
    }

    #[tokio::test]
    async fn ticket_vote_lifecycle() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![ticket("t1", "cb0", 100, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1,
            vec![coinbase("cb2", 50, "miner")],
            vec![vote("v1", "t1")]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &["t1"]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Unspent, PoolStatus::Live)
        );

        db.store_block(&b2, true, true).await.unwrap();
        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Voted, PoolStatus::Voted)
        );
        assert!(db.missed_votes_in_block("b2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missed_and_expired_tickets_are_classified() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![
                ticket("t1", "cb0", 100, "staker"),
                ticket("t2", "cb0", 100, "staker"),
                ticket("t3", "cb0", 100, "staker"),
            ]);
        // t1 votes, t2 is called but misses, t3 ages out unspent.
        let b2 = raw_block(2, "b2", "b1", 1,
            vec![coinbase("cb2", 50, "miner")],
            vec![vote("v1", "t1")]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &["t1", "t2"]);
        tracker.mark_expired("t3");
        tracker.set_missed(&["t2", "t3"]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();

        assert_eq!(
            db.ticket_status("t2").await.unwrap(),
            (TicketSpendType::Unspent, PoolStatus::Missed)
        );
        assert_eq!(
            db.ticket_status("t3").await.unwrap(),
            (TicketSpendType::Unspent, PoolStatus::Expired)
        );
        assert_eq!(db.missed_votes_in_block("b2").await.unwrap(), vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn revoking_an_expired_ticket_stays_expired() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![ticket("t1", "cb0", 100, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1,
            vec![coinbase("cb2", 50, "miner")],
            vec![revocation("r1", "t1")]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &[]);
        tracker.mark_expired("t1");

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();

        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Revoked, PoolStatus::Expired)
        );
    }

    #[tokio::test]
    async fn side_chain_block_does_not_advance_best() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let side = raw_block(1, "s1", "b0", 1, vec![coinbase("cbs", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);

        db.store_block(&b0, true, true).await.unwrap();
        // No winners needed for a side-chain block.
        db.store_block(&side, true, false).await.unwrap();

        assert_eq!(db.best_block(), Some((0, "b0".to_string())));
        let sides = db.side_chain_blocks().await.unwrap();
        assert_eq!(sides.len(), 1);
        assert_eq!(sides[0].hash, "s1");

        // Its transactions carry the side-chain stamp.
        let cbs = &db.transactions_by_hash("cbs").await.unwrap()[0];
        assert!(!cbs.is_mainchain);
    }

    #[tokio::test]
    async fn mainchain_block_without_pool_info_is_rejected() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1, vec![coinbase("cb1", 50, "miner")], vec![]);

        db.store_block(&b0, true, true).await.unwrap();
        // Tracker has no winners for b0.
        let err = db.store_block(&b1, true, true).await.unwrap_err();
        assert!(matches!(
            err,
            stakeindex_core::ChainIndexError::StakePoolInfo { .. }
        ));
        let _ = tracker;
    }
}
