//! Ticket-ID cache — write-through map from ticket transaction hash to its
//! tickets-table row ID.
//!
//! Populated when ticket purchases are stored, and consulted when a ticket is
//! spent by a later vote or revocation, avoiding a store lookup per spend. A
//! ticket is looked up once, at spend time, so hits may expire the entry.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::ChainIndexError;
use crate::store::ChainStore;

/// Concurrent hash → row-ID map for unspent tickets.
#[derive(Default)]
pub struct TicketIdCache {
    ids: RwLock<HashMap<String, u64>>,
}

impl TicketIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a ticket's row ID. On a hit with `expire` set, the entry is
    /// removed (single-use semantics).
    pub fn get(&self, ticket_hash: &str, expire: bool) -> Option<u64> {
        let row_id = *self.ids.read().unwrap().get(ticket_hash)?;
        if expire {
            self.ids.write().unwrap().remove(ticket_hash);
        }
        Some(row_id)
    }

    /// Store one (ticket hash, row ID) pair.
    pub fn set(&self, ticket_hash: impl Into<String>, row_id: u64) {
        self.ids.write().unwrap().insert(ticket_hash.into(), row_id);
    }

    /// Store several pairs at once (cache preload, new-ticket batches).
    pub fn set_many(&self, ticket_hashes: &[String], row_ids: &[u64]) {
        let mut ids = self.ids.write().unwrap();
        for (hash, row_id) in ticket_hashes.iter().zip(row_ids) {
            ids.insert(hash.clone(), *row_id);
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.ids.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.read().unwrap().is_empty()
    }
}

/// Resolve a ticket's row ID via the cache, falling back to a store query on
/// a miss or when no cache is in use.
///
/// The cache is write-through from ingestion only: a miss does not populate
/// it, so a sustained miss rate means tickets purchased before the cache's
/// coverage window.
pub async fn ticket_row_id(
    cache: Option<&TicketIdCache>,
    store: &dyn ChainStore,
    ticket_hash: &str,
    expire: bool,
) -> Result<u64, ChainIndexError> {
    if let Some(cache) = cache {
        if let Some(row_id) = cache.get(ticket_hash, expire) {
            return Ok(row_id);
        }
    }
    store.ticket_row_id_by_hash(ticket_hash).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let cache = TicketIdCache::new();
        cache.set("ticket-a", 7);
        assert_eq!(cache.get("ticket-a", false), Some(7));
        assert_eq!(cache.get("ticket-a", false), Some(7)); // not expired
        assert_eq!(cache.get("ticket-b", false), None);
    }

    #[test]
    fn expiring_get_removes_entry() {
        let cache = TicketIdCache::new();
        cache.set("ticket-a", 7);
        assert_eq!(cache.get("ticket-a", true), Some(7));
        assert_eq!(cache.get("ticket-a", false), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_many_pairs() {
        let cache = TicketIdCache::new();
        let hashes = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        let ids = vec![1, 2, 3];
        cache.set_many(&hashes, &ids);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("t2", false), Some(2));
    }
}
