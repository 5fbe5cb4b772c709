//! Stake-tracking collaborator traits and the ticket spend classifier.
//!
//! The tracker maintains its own height-indexed ticket pool state outside
//! this crate; the indexer only reads winners and the missed/expired sets
//! from it. All reads spanning one block's classification must happen under
//! a single [`StakeTracker::lock_best_node`] guard so the view is consistent,
//! and the critical section must stay short; the tracker's own
//! block-connection path blocks on the same lock.

use std::collections::{HashMap, HashSet};

use crate::types::{PoolStatus, TicketSpendType};

/// A consistent snapshot of the stake tracker's best node. Dropping the
/// boxed view releases the tracker's lock.
pub trait StakeNode {
    /// Whether the given ticket is known to have expired (as opposed to
    /// having merely missed a vote).
    fn exists_expired_ticket(&self, ticket_hash: &str) -> bool;

    /// Tickets that missed or expired as of the best block, possibly
    /// including some revoked in that block.
    fn missed_by_block(&self) -> Vec<String>;
}

/// The external stake-tracking collaborator.
pub trait StakeTracker: Send + Sync {
    /// The tracker's current best height.
    fn height(&self) -> u64;

    /// The winning (voting-eligible) ticket hashes selected by the block
    /// with the given hash, or `None` if the tracker does not know the
    /// block (e.g. a side-chain block it never connected).
    fn pool_info(&self, block_hash: &str) -> Option<Vec<String>>;

    /// Acquire a consistent view of the best stake node. Held for the whole
    /// classification of one block's spends.
    fn lock_best_node(&self) -> Box<dyn StakeNode + '_>;
}

/// One vote or revocation spending a ticket, with row linkage already
/// resolved.
#[derive(Debug, Clone)]
pub struct TicketSpend {
    pub ticket_hash: String,
    pub ticket_row_id: u64,
    /// Transactions-table row ID of the vote/revocation.
    pub spending_tx_row_id: u64,
    pub spend_type: TicketSpendType,
}

/// Classify each spend of one block: votes are `Voted`; revocations are
/// `Expired` when the stake node knows the ticket expired, else `Missed`.
///
/// Also returns the revoked tickets (hash → ticket row ID) so the caller can
/// exclude them from unspent-miss bookkeeping.
pub fn classify_spends(
    spends: &[TicketSpend],
    node: &dyn StakeNode,
) -> (Vec<PoolStatus>, HashMap<String, u64>) {
    let mut statuses = Vec::with_capacity(spends.len());
    let mut revokes = HashMap::new();

    for spend in spends {
        let status = match spend.spend_type {
            TicketSpendType::Voted => PoolStatus::Voted,
            TicketSpendType::Revoked => {
                revokes.insert(spend.ticket_hash.clone(), spend.ticket_row_id);
                if node.exists_expired_ticket(&spend.ticket_hash) {
                    PoolStatus::Expired
                } else {
                    PoolStatus::Missed
                }
            }
            TicketSpendType::Unspent => {
                // Spend collection only yields votes and revocations.
                tracing::warn!(ticket = %spend.ticket_hash, "unspent ticket in spend batch");
                PoolStatus::Live
            }
        };
        statuses.push(status);
    }

    (statuses, revokes)
}

/// Pool-status updates for winning-but-unspent tickets: unrevoked misses
/// become `Missed`, and unspent expired tickets reported by the stake node
/// become `Expired`. Tickets revoked in this block are excluded, since their
/// status was already set by [`classify_spends`].
pub fn unrevoked_miss_updates(
    misses: &[String],
    revokes: &HashMap<String, u64>,
    node: &dyn StakeNode,
) -> (Vec<String>, Vec<PoolStatus>) {
    let mut hashes = Vec::new();
    let mut statuses = Vec::new();
    let mut unspent_misses = HashSet::new();

    for miss in misses {
        if !revokes.contains_key(miss) {
            hashes.push(miss.clone());
            statuses.push(PoolStatus::Missed);
            unspent_misses.insert(miss.clone());
        }
    }

    // missed_by_block includes tickets that missed votes or expired, some of
    // which may have been revoked in this very block; keep only the actual
    // unspent expires.
    for hash in node.missed_by_block() {
        if !node.exists_expired_ticket(&hash) {
            continue;
        }
        if unspent_misses.contains(&hash) || revokes.contains_key(&hash) {
            continue;
        }
        hashes.push(hash);
        statuses.push(PoolStatus::Expired);
    }

    (hashes, statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed-answer stake node for classifier tests.
    struct FakeNode {
        expired: HashSet<String>,
        missed: Vec<String>,
    }

    impl StakeNode for FakeNode {
        fn exists_expired_ticket(&self, ticket_hash: &str) -> bool {
            self.expired.contains(ticket_hash)
        }
        fn missed_by_block(&self) -> Vec<String> {
            self.missed.clone()
        }
    }

    fn spend(hash: &str, spend_type: TicketSpendType) -> TicketSpend {
        TicketSpend {
            ticket_hash: hash.into(),
            ticket_row_id: 1,
            spending_tx_row_id: 2,
            spend_type,
        }
    }

    #[test]
    fn votes_classify_as_voted() {
        let node = FakeNode {
            expired: HashSet::new(),
            missed: vec![],
        };
        let (statuses, revokes) =
            classify_spends(&[spend("t1", TicketSpendType::Voted)], &node);
        assert_eq!(statuses, vec![PoolStatus::Voted]);
        assert!(revokes.is_empty());
    }

    #[test]
    fn revocation_of_expired_ticket_is_expired_not_missed() {
        let node = FakeNode {
            expired: ["t1".to_string()].into_iter().collect(),
            missed: vec![],
        };
        let (statuses, revokes) =
            classify_spends(&[spend("t1", TicketSpendType::Revoked)], &node);
        assert_eq!(statuses, vec![PoolStatus::Expired]);
        assert!(revokes.contains_key("t1"));
    }

    #[test]
    fn revocation_of_unexpired_ticket_is_missed() {
        let node = FakeNode {
            expired: HashSet::new(),
            missed: vec![],
        };
        let (statuses, _) = classify_spends(&[spend("t1", TicketSpendType::Revoked)], &node);
        assert_eq!(statuses, vec![PoolStatus::Missed]);
    }

    #[test]
    fn unrevoked_misses_and_expires() {
        let node = FakeNode {
            expired: ["e1".to_string(), "r1".to_string()].into_iter().collect(),
            missed: vec!["e1".into(), "m1".into(), "r1".into()],
        };
        let misses = vec!["m1".to_string(), "r1".to_string()];
        let revokes: HashMap<String, u64> = [("r1".to_string(), 9)].into_iter().collect();

        let (hashes, statuses) = unrevoked_miss_updates(&misses, &revokes, &node);

        // m1: unrevoked miss. e1: unspent expire. r1: revoked, excluded both
        // ways; the node's m1 entry is not expired so it is not re-added.
        assert_eq!(hashes, vec!["m1".to_string(), "e1".to_string()]);
        assert_eq!(statuses, vec![PoolStatus::Missed, PoolStatus::Expired]);
    }
}
