//! Chain reorganization.
//!
//! A reorg never deletes rows. Blocks leaving the main chain are
//! reclassified by flipping their mainchain flags, block by block from the
//! old tip back to the common ancestor, along with every dependent row:
//! transactions, inputs, address ledger entries, votes, and tickets. The
//! new branch is then connected through the normal ingestion path, whose
//! duplicate-safe inserts re-promote any of its blocks already stored as
//! side chain.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::types::ZERO_HASH;

use crate::chain::ChainDb;

impl ChainDb {
    /// Demote the current main chain down to, but not including,
    /// `ancestor_hash`. Returns the hash the walk stopped at (the new tip)
    /// and the number of blocks moved to the side chain.
    ///
    /// Per-block row updates are logged and skipped on failure so one bad
    /// block cannot strand the walk; the only fatal condition is being
    /// unable to find the next block to demote.
    pub async fn tip_to_side_chain(
        &self,
        ancestor_hash: &str,
    ) -> Result<(String, u64), ChainIndexError> {
        let Some((_, tip_hash)) = self.best_block() else {
            return Ok((ancestor_hash.to_string(), 0));
        };
        if tip_hash == ancestor_hash {
            return Ok((tip_hash, 0));
        }

        self.in_reorg.store(true, Ordering::SeqCst);
        let result = self.demote_to(ancestor_hash, &tip_hash).await;
        self.in_reorg.store(false, Ordering::SeqCst);
        result
    }

    async fn demote_to(
        &self,
        ancestor_hash: &str,
        tip_hash: &str,
    ) -> Result<(String, u64), ChainIndexError> {
        info!(from = %tip_hash, to = %ancestor_hash, "moving tip to side chain");

        let mut hash = tip_hash.to_string();
        let mut demoted = 0u64;
        while hash != ancestor_hash && hash != ZERO_HASH {
            let prev_hash = match self.store.set_block_mainchain(&hash, false).await {
                Ok(prev) => prev,
                Err(e) => {
                    // The block row is unreachable; the walk can still
                    // continue if its status row knows the parent.
                    warn!(%hash, "demoting block failed: {e}");
                    match self.store.block_status(&hash).await {
                        Ok(status) => status.prev_hash,
                        Err(status_err) => {
                            warn!(%hash, "cannot find parent of undemoted block: {status_err}");
                            return Err(e);
                        }
                    }
                }
            };

            self.demote_block_rows(&hash).await;
            demoted += 1;
            hash = prev_hash;
        }

        if hash == ZERO_HASH && ancestor_hash != ZERO_HASH {
            warn!(%ancestor_hash, "reorg walk reached genesis without finding ancestor");
        }

        let tip = hash;
        let tip_height = if tip == ZERO_HASH {
            None
        } else {
            match self.store.block_height(&tip).await {
                Ok(height) => Some(height),
                Err(e) => {
                    warn!(new_tip = %tip, "new tip height lookup failed: {e}");
                    None
                }
            }
        };
        {
            let mut best = self.best.write().unwrap();
            *best = tip_height.map(|h| (h, tip.clone()));
        }

        // Everything height- or tip-keyed is now stale.
        self.addr_cache.clear().await;
        self.pool_cache.clear().await;

        info!(blocks = demoted, new_tip = %tip, "tip moved to side chain");
        Ok((tip, demoted))
    }

    /// Flip the mainchain flag on every row tied to one block.
    async fn demote_block_rows(&self, hash: &str) {
        if let Err(e) = self.store.set_transactions_mainchain(hash, false).await {
            warn!(%hash, "demoting transactions failed: {e}");
        }

        match self.store.block_vin_vout_ids(hash).await {
            Ok(io) => {
                let vin_ids: Vec<u64> = io.iter().flat_map(|t| t.vin_row_ids.clone()).collect();
                let vout_ids: Vec<u64> = io.iter().flat_map(|t| t.vout_row_ids.clone()).collect();
                if let Err(e) = self.store.set_vins_mainchain(&vin_ids, false).await {
                    warn!(%hash, "demoting vins failed: {e}");
                }
                if let Err(e) = self
                    .store
                    .set_addresses_mainchain_by_ids(&vin_ids, &vout_ids, false)
                    .await
                {
                    warn!(%hash, "demoting address rows failed: {e}");
                }
            }
            Err(e) => warn!(%hash, "listing block vin/vout ids failed: {e}"),
        }

        if let Err(e) = self.store.set_votes_mainchain(hash, false).await {
            warn!(%hash, "demoting votes failed: {e}");
        }
        if let Err(e) = self.store.set_tickets_mainchain(hash, false).await {
            warn!(%hash, "demoting tickets failed: {e}");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use stakeindex_core::types::{PoolStatus, TicketSpendType};
    use stakeindex_core::ChainStore;

    use crate::testutil::*;

    #[tokio::test]
    async fn tip_to_side_chain_demotes_back_to_ancestor() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner"), ordinary("tx1", "cb0", 0, 40, "alice")],
            vec![ticket("t1", "cb0", 100, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1, vec![coinbase("cb2", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &[]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();

        let (new_tip, demoted) = db.tip_to_side_chain("b0").await.unwrap();
        assert_eq!(new_tip, "b0");
        assert_eq!(demoted, 2);
        assert_eq!(db.best_block(), Some((0, "b0".to_string())));

        let sides = db.side_chain_blocks().await.unwrap();
        let side_hashes: Vec<&str> = sides.iter().map(|s| s.hash.as_str()).collect();
        assert!(side_hashes.contains(&"b1"));
        assert!(side_hashes.contains(&"b2"));
        assert!(db.block_status("b0").await.unwrap().is_mainchain);

        let tx1 = &db.transactions_by_hash("tx1").await.unwrap()[0];
        assert!(!tx1.is_mainchain);
        let t1 = &db.transactions_by_hash("t1").await.unwrap()[0];
        assert!(!t1.is_mainchain);
    }

    #[tokio::test]
    async fn reingestion_repromotes_a_demoted_branch() {
        let (store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![ticket("t1", "cb0", 100, "staker"), ticket("t2", "cb0", 100, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1,
            vec![coinbase("cb2", 50, "miner")],
            vec![vote("v1", "t1")]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &["t1"]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();
        db.tip_to_side_chain("b0").await.unwrap();
        assert!(!db.block_status("b1").await.unwrap().is_mainchain);
        let (_, pool) = store.unspent_tickets().await.unwrap();
        assert!(pool.is_empty());

        // The winning branch turned out to be b1..b2 after all.
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();
        assert!(db.block_status("b1").await.unwrap().is_mainchain);
        assert!(db.block_status("b2").await.unwrap().is_mainchain);
        assert_eq!(db.best_block(), Some((2, "b2".to_string())));

        let cb1 = &db.transactions_by_hash("cb1").await.unwrap()[0];
        assert!(cb1.is_mainchain);
        let t1 = &db.transactions_by_hash("t1").await.unwrap()[0];
        assert!(t1.is_mainchain);

        // The vote linkage survived the round trip, and the unvoted ticket
        // is back in the live pool for the cache preload.
        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Voted, PoolStatus::Voted)
        );
        assert_eq!(
            db.ticket_status("t2").await.unwrap(),
            (TicketSpendType::Unspent, PoolStatus::Live)
        );
        let (_, pool) = store.unspent_tickets().await.unwrap();
        assert_eq!(pool, vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn demoting_at_the_tip_is_a_no_op() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);

        db.store_block(&b0, true, true).await.unwrap();
        let (new_tip, demoted) = db.tip_to_side_chain("b0").await.unwrap();
        assert_eq!(new_tip, "b0");
        assert_eq!(demoted, 0);
        assert_eq!(db.best_block(), Some((0, "b0".to_string())));
    }
}
