//! Offline repair passes.
//!
//! The spending-side address linkage and the ticket spend columns are both
//! derivable from the primary rows, so after a crash or a schema migration
//! they can be rebuilt wholesale instead of re-ingesting the chain. Both
//! passes run in chunks and honor a cancellation flag between chunks.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::store::TicketSpendUpdate;
use stakeindex_core::ticket_cache;
use stakeindex_core::types::{PoolStatus, TicketSpendType};

use crate::chain::ChainDb;

const REBUILD_CHUNK: usize = 500;

impl ChainDb {
    /// Re-derive the spending side of the address ledger from every stored
    /// input. Returns the number of address rows touched; on cancellation
    /// the count covers the chunks that completed.
    pub async fn rebuild_address_spend_info(
        &self,
        cancel: &AtomicBool,
    ) -> Result<u64, ChainIndexError> {
        let vin_ids = self.store.all_vin_ids().await?;
        info!(vins = vin_ids.len(), "rebuilding address spend info");

        let mut updated = 0u64;
        for chunk in vin_ids.chunks(REBUILD_CHUNK) {
            if cancel.load(Ordering::SeqCst) {
                info!(updated, "address spend rebuild cancelled");
                return Ok(updated);
            }
            updated += self.store.set_spending_for_vin_ids(chunk).await?;
        }

        self.addr_cache.clear().await;
        info!(updated, "address spend info rebuilt");
        Ok(updated)
    }

    /// Re-derive every ticket's spend columns from the stored votes and
    /// revocations. Returns the number of ticket rows updated.
    pub async fn rebuild_ticket_spend_info(
        &self,
        cancel: &AtomicBool,
    ) -> Result<u64, ChainIndexError> {
        let votes = self.store.all_vote_spend_info().await?;
        let revocations = self.store.all_revocation_spend_info().await?;
        info!(
            votes = votes.len(),
            revocations = revocations.len(),
            "rebuilding ticket spend info"
        );

        // One consistent stake-node view classifies every revocation, same
        // as during ingestion.
        let revocation_statuses: Vec<PoolStatus> = {
            let node = self.stake.lock_best_node();
            revocations
                .iter()
                .map(|spend| {
                    if node.exists_expired_ticket(&spend.ticket_hash) {
                        PoolStatus::Expired
                    } else {
                        PoolStatus::Missed
                    }
                })
                .collect()
        };

        let mut updates = Vec::with_capacity(votes.len() + revocations.len());
        for spend in &votes {
            let ticket_row_id = match self.ticket_row_id(&spend.ticket_hash).await {
                Some(id) => id,
                None => continue,
            };
            updates.push(TicketSpendUpdate {
                ticket_row_id,
                spending_tx_row_id: spend.spending_tx_row_id,
                spend_height: spend.block_height,
                spend_type: TicketSpendType::Voted,
                pool_status: PoolStatus::Voted,
            });
        }
        for (spend, status) in revocations.iter().zip(revocation_statuses) {
            let ticket_row_id = match self.ticket_row_id(&spend.ticket_hash).await {
                Some(id) => id,
                None => continue,
            };
            updates.push(TicketSpendUpdate {
                ticket_row_id,
                spending_tx_row_id: spend.spending_tx_row_id,
                spend_height: spend.block_height,
                spend_type: TicketSpendType::Revoked,
                pool_status: status,
            });
        }

        let mut updated = 0u64;
        for chunk in updates.chunks(REBUILD_CHUNK) {
            if cancel.load(Ordering::SeqCst) {
                info!(updated, "ticket spend rebuild cancelled");
                return Ok(updated);
            }
            updated += self.store.set_spending_for_tickets(chunk).await?;
        }

        info!(updated, "ticket spend info rebuilt");
        Ok(updated)
    }

    /// Ticket row ID via the write-through cache without expiring the
    /// entry; rebuilds touch each ticket once but other readers may not
    /// be done with it.
    async fn ticket_row_id(&self, ticket_hash: &str) -> Option<u64> {
        match ticket_cache::ticket_row_id(
            self.ticket_cache.as_deref(),
            &*self.store,
            ticket_hash,
            false,
        )
        .await
        {
            Ok(id) => Some(id),
            Err(e) if e.is_not_found() => {
                warn!(ticket = ticket_hash, "spent ticket has no purchase row");
                None
            }
            Err(e) => {
                warn!(ticket = ticket_hash, "ticket row lookup failed: {e}");
                None
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use stakeindex_core::types::{AddrTxnKind, PoolStatus, TicketSpendType};

    use crate::testutil::*;

    async fn chain_with_spends() -> (crate::ChainDb, std::sync::Arc<MockTracker>) {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner"), ordinary("tx1", "cb0", 0, 40, "alice")],
            vec![ticket("t1", "cb0", 100, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1,
            vec![coinbase("cb2", 50, "miner")],
            vec![vote("v1", "t1")]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &["t1"]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();
        (db, tracker)
    }

    #[tokio::test]
    async fn address_spend_rebuild_recovers_debit_rows() {
        let (db, _tracker) = chain_with_spends().await;
        let cancel = AtomicBool::new(false);
        let updated = db.rebuild_address_spend_info(&cancel).await.unwrap();
        assert!(updated > 0);

        // The miner's spent output still shows as a debit afterwards.
        let rows = db
            .address_rows("miner", AddrTxnKind::Debit, 10, 0)
            .await
            .unwrap();
        assert!(rows.iter().any(|r| r.tx_hash == "tx1" || r.tx_hash == "t1"));
    }

    #[tokio::test]
    async fn ticket_spend_rebuild_restores_vote_linkage() {
        let (db, _tracker) = chain_with_spends().await;
        let cancel = AtomicBool::new(false);
        let updated = db.rebuild_ticket_spend_info(&cancel).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Voted, PoolStatus::Voted)
        );
    }

    #[tokio::test]
    async fn deferred_spend_updates_are_recovered_by_rebuilds() {
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

        // Batch-sync style ingestion: both spend-update passes deferred.
        db.store_block_ext(&b0, true, true, false, false).await.unwrap();
        db.store_block_ext(&b1, true, true, false, false).await.unwrap();
        db.store_block_ext(&b2, true, true, false, false).await.unwrap();

        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Unspent, PoolStatus::Live)
        );
        let debits = db
            .address_rows("miner", AddrTxnKind::Debit, 10, 0)
            .await
            .unwrap();
        assert!(debits.is_empty());

        let cancel = AtomicBool::new(false);
        db.rebuild_address_spend_info(&cancel).await.unwrap();
        db.rebuild_ticket_spend_info(&cancel).await.unwrap();

        assert_eq!(
            db.ticket_status("t1").await.unwrap(),
            (TicketSpendType::Voted, PoolStatus::Voted)
        );
        let debits = db
            .address_rows("miner", AddrTxnKind::Debit, 10, 0)
            .await
            .unwrap();
        assert!(!debits.is_empty());
    }

    #[tokio::test]
    async fn cancelled_rebuild_returns_partial_count() {
        let (db, _tracker) = chain_with_spends().await;
        let cancel = AtomicBool::new(false);
        cancel.store(true, Ordering::SeqCst);
        assert_eq!(db.rebuild_address_spend_info(&cancel).await.unwrap(), 0);
        assert_eq!(db.rebuild_ticket_spend_info(&cancel).await.unwrap(), 0);
    }
}
