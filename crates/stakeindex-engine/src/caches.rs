//! Single-flight aggregate caches.
//!
//! Each cache pairs its data with the chain position it was computed at, so
//! a hit is only served when the chain has not advanced. The update paths
//! are gated so that concurrent requests for the same aggregate trigger one
//! backing query, with the rest either waiting on it or settling for stale
//! data, never stampeding the store.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard, RwLock};

use stakeindex_core::types::{AddressBalance, ChartInterval, TicketPoolCharts};

// ─── Address balances ────────────────────────────────────────────────────────

/// Per-address balance cache keyed by best-block height.
///
/// Reads go through the `RwLock` and never block each other; misses funnel
/// through one update gate, so concurrent misses trigger a single backing
/// query and the rest find the entry on their re-check.
#[derive(Default)]
pub struct AddressBalanceCache {
    inner: RwLock<HashMap<String, (u64, AddressBalance)>>,
    updating: Mutex<()>,
}

impl AddressBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached balance, only if it was computed at this height.
    pub async fn get(&self, address: &str, height: u64) -> Option<AddressBalance> {
        match self.inner.read().await.get(address) {
            Some((cached_height, balance)) if *cached_height == height => Some(balance.clone()),
            _ => None,
        }
    }

    /// Claim the update gate. Callers re-check [`Self::get`] after
    /// acquisition before querying the store.
    pub async fn begin_update(&self) -> MutexGuard<'_, ()> {
        self.updating.lock().await
    }

    pub async fn set(&self, address: &str, height: u64, balance: AddressBalance) {
        self.inner
            .write()
            .await
            .insert(address.to_string(), (height, balance));
    }

    /// Drop all cached balances. Called when a new block connects, since
    /// every entry is keyed to the previous height.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

// ─── Development fund ────────────────────────────────────────────────────────

/// Cached balance of the development-fund address, keyed by best-block hash.
///
/// Refreshes are gated by a try-lock so the async refresh spawned on each
/// connected block is skipped while one is already in flight.
#[derive(Default)]
pub struct DevFundCache {
    balance: RwLock<Option<(String, AddressBalance)>>,
    updating: Mutex<()>,
}

impl DevFundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached balance, if computed at the given block hash.
    pub async fn get(&self, block_hash: &str) -> Option<AddressBalance> {
        let cached = self.balance.read().await;
        match cached.as_ref() {
            Some((hash, balance)) if hash == block_hash => Some(balance.clone()),
            _ => None,
        }
    }

    /// Claim the refresh gate without blocking. `None` means a refresh is
    /// already in flight and this one should be skipped.
    pub fn try_begin_update(&self) -> Option<MutexGuard<'_, ()>> {
        self.updating.try_lock().ok()
    }

    /// Claim the refresh gate, waiting for any in-flight refresh first.
    pub async fn begin_update(&self) -> MutexGuard<'_, ()> {
        self.updating.lock().await
    }

    pub async fn set(&self, block_hash: &str, balance: AddressBalance) {
        *self.balance.write().await = Some((block_hash.to_string(), balance));
    }
}

// ─── Ticket pool charts ──────────────────────────────────────────────────────

/// Ticket-pool chart cache, one entry per grouping interval, each keyed by
/// the height it was computed at.
pub struct TicketPoolCache {
    charts: RwLock<HashMap<ChartInterval, (u64, TicketPoolCharts)>>,
    updating: HashMap<ChartInterval, Mutex<()>>,
}

impl TicketPoolCache {
    pub fn new() -> Self {
        let mut updating = HashMap::new();
        for interval in ChartInterval::ALL_INTERVALS {
            updating.insert(interval, Mutex::new(()));
        }
        Self {
            charts: RwLock::new(HashMap::new()),
            updating,
        }
    }

    /// The cached charts for an interval, with the height they were computed
    /// at. The caller decides whether a stale hit is acceptable.
    pub async fn cached(&self, interval: ChartInterval) -> Option<(u64, TicketPoolCharts)> {
        self.charts.read().await.get(&interval).cloned()
    }

    pub async fn set(&self, interval: ChartInterval, height: u64, charts: TicketPoolCharts) {
        self.charts.write().await.insert(interval, (height, charts));
    }

    /// Claim the update gate for an interval without blocking.
    pub fn try_update(&self, interval: ChartInterval) -> Option<MutexGuard<'_, ()>> {
        self.updating.get(&interval).and_then(|m| m.try_lock().ok())
    }

    /// Wait for the in-flight update of an interval to finish.
    pub async fn wait_update(&self, interval: ChartInterval) -> Option<MutexGuard<'_, ()>> {
        match self.updating.get(&interval) {
            Some(m) => Some(m.lock().await),
            None => None,
        }
    }

    /// Invalidate every interval. Called after a reorg, since cached charts
    /// may describe the abandoned branch.
    pub async fn clear(&self) {
        self.charts.write().await.clear();
    }
}

impl Default for TicketPoolCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_cache_keyed_by_hash() {
        let cache = DevFundCache::new();
        let balance = AddressBalance {
            address: "dev".into(),
            num_unspent: 3,
            total_unspent: 900,
            ..Default::default()
        };
        cache.set("b5", balance.clone()).await;

        assert_eq!(cache.get("b5").await, Some(balance));
        assert_eq!(cache.get("b6").await, None);
    }

    #[tokio::test]
    async fn dev_cache_refresh_gate_is_exclusive() {
        let cache = DevFundCache::new();
        let guard = cache.try_begin_update();
        assert!(guard.is_some());
        assert!(cache.try_begin_update().is_none());
        drop(guard);
        assert!(cache.try_begin_update().is_some());
    }

    #[tokio::test]
    async fn pool_cache_serves_per_interval() {
        let cache = TicketPoolCache::new();
        let charts = TicketPoolCharts::default();
        cache.set(ChartInterval::Day, 100, charts.clone()).await;

        assert_eq!(cache.cached(ChartInterval::Day).await, Some((100, charts)));
        assert_eq!(cache.cached(ChartInterval::Week).await, None);

        let guard = cache.try_update(ChartInterval::Day);
        assert!(guard.is_some());
        assert!(cache.try_update(ChartInterval::Day).is_none());
        // Other intervals update independently.
        assert!(cache.try_update(ChartInterval::Week).is_some());
    }

    #[tokio::test]
    async fn address_cache_hits_only_at_height() {
        let cache = AddressBalanceCache::new();
        let balance = AddressBalance {
            address: "addr".into(),
            num_unspent: 1,
            total_unspent: 50,
            ..Default::default()
        };
        cache.set("addr", 7, balance.clone()).await;

        assert_eq!(cache.get("addr", 7).await, Some(balance));
        // A different height means the chain moved; the entry is stale.
        assert_eq!(cache.get("addr", 8).await, None);
        assert_eq!(cache.get("other", 7).await, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
