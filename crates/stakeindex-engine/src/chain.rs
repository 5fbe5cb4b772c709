//! The [`ChainDb`] facade — one handle over the row store, the stake
//! tracker, and the aggregate caches.
//!
//! Ingestion ([`ChainDb::store_block`]), reorg handling
//! ([`ChainDb::tip_to_side_chain`]), and bulk rebuilds live in sibling
//! modules; this one holds the shared state, the constructor, and the read
//! surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::store::ChainStore;
use stakeindex_core::ticket_cache::TicketIdCache;
use stakeindex_core::types::{
    AddrTxnKind, AddressBalance, AddressRow, BlockStatus, ChainParams, ChartInterval,
    PoolStatus, TicketPoolCharts, TicketSpendType, TxRow,
};
use stakeindex_core::StakeTracker;

use crate::caches::{AddressBalanceCache, DevFundCache, TicketPoolCache};

/// Construction options for [`ChainDb`].
pub struct ChainDbConfig {
    pub params: ChainParams,
    /// Keep the ticket hash → row ID cache (preloaded with unspent tickets).
    pub enable_ticket_cache: bool,
    /// Refresh the dev-fund balance in the background on each stored block.
    pub dev_prefetch: bool,
}

impl Default for ChainDbConfig {
    fn default() -> Self {
        Self {
            params: ChainParams::default(),
            enable_ticket_cache: true,
            dev_prefetch: true,
        }
    }
}

/// The indexing engine: block ingestion, reorg reclassification, and cached
/// aggregate queries over one [`ChainStore`] backend.
pub struct ChainDb {
    pub(crate) store: Arc<dyn ChainStore>,
    pub(crate) stake: Arc<dyn StakeTracker>,
    pub(crate) params: ChainParams,
    pub(crate) ticket_cache: Option<Arc<TicketIdCache>>,

    /// Height and hash of the best mainchain block, `None` before the first.
    pub(crate) best: RwLock<Option<(u64, String)>>,
    /// Recently stored block hash → row ID, so parent linkage usually skips
    /// a store lookup.
    pub(crate) last_block: Mutex<HashMap<String, u64>>,

    pub(crate) addr_cache: AddressBalanceCache,
    pub(crate) dev_cache: Arc<DevFundCache>,
    pub(crate) pool_cache: TicketPoolCache,

    pub(crate) dev_prefetch: bool,
    pub(crate) in_batch_sync: AtomicBool,
    pub(crate) in_reorg: AtomicBool,
}

impl ChainDb {
    /// Open the engine over a store and stake tracker, loading the best
    /// block and preloading the ticket-ID cache with unspent tickets.
    pub async fn new(
        store: Arc<dyn ChainStore>,
        stake: Arc<dyn StakeTracker>,
        config: ChainDbConfig,
    ) -> Result<Self, ChainIndexError> {
        let ticket_cache = if config.enable_ticket_cache {
            let cache = TicketIdCache::new();
            let (ids, hashes) = store.unspent_tickets().await?;
            cache.set_many(&hashes, &ids);
            debug!(tickets = cache.len(), "ticket id cache preloaded");
            Some(Arc::new(cache))
        } else {
            None
        };

        let best = match store.best_block().await {
            Ok(best) => Some(best),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        match &best {
            Some((height, hash)) => info!(height, %hash, "chain db opened"),
            None => info!("chain db opened on empty store"),
        }

        Ok(Self {
            store,
            stake,
            params: config.params,
            ticket_cache,
            best: RwLock::new(best),
            last_block: Mutex::new(HashMap::new()),
            addr_cache: AddressBalanceCache::new(),
            dev_cache: Arc::new(DevFundCache::new()),
            pool_cache: TicketPoolCache::new(),
            dev_prefetch: config.dev_prefetch,
            in_batch_sync: AtomicBool::new(false),
            in_reorg: AtomicBool::new(false),
        })
    }

    // ── Engine state ─────────────────────────────────────────────────────────

    /// Height and hash of the best mainchain block, if any is stored.
    pub fn best_block(&self) -> Option<(u64, String)> {
        self.best.read().unwrap().clone()
    }

    pub fn best_height(&self) -> Option<u64> {
        self.best.read().unwrap().as_ref().map(|(h, _)| *h)
    }

    pub(crate) fn set_best(&self, height: u64, hash: &str) {
        *self.best.write().unwrap() = Some((height, hash.to_string()));
    }

    /// During an initial batch sync the per-block dev-fund refresh is
    /// skipped; one refresh at the end covers it.
    pub fn set_batch_sync(&self, in_batch_sync: bool) {
        self.in_batch_sync.store(in_batch_sync, Ordering::SeqCst);
    }

    /// Whether a reorg reclassification is currently in progress.
    pub fn in_reorg(&self) -> bool {
        self.in_reorg.load(Ordering::SeqCst)
    }

    // ── Store passthroughs ───────────────────────────────────────────────────

    pub async fn block_status(&self, hash: &str) -> Result<BlockStatus, ChainIndexError> {
        self.store.block_status(hash).await
    }

    pub async fn block_hash(&self, height: u64) -> Result<String, ChainIndexError> {
        self.store.block_hash(height).await
    }

    pub async fn block_height(&self, hash: &str) -> Result<u64, ChainIndexError> {
        self.store.block_height(hash).await
    }

    pub async fn side_chain_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        self.store.side_chain_blocks().await
    }

    pub async fn disapproved_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        self.store.disapproved_blocks().await
    }

    pub async fn transactions_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<TxRow>, ChainIndexError> {
        self.store.transactions_by_hash(tx_hash).await
    }

    pub async fn spending_transactions(
        &self,
        funding_tx_hash: &str,
    ) -> Result<Vec<(String, u32, u32)>, ChainIndexError> {
        self.store.spending_transactions(funding_tx_hash).await
    }

    pub async fn vout_values(&self, tx_hash: &str) -> Result<Vec<u64>, ChainIndexError> {
        self.store.vout_values(tx_hash).await
    }

    pub async fn ticket_status(
        &self,
        ticket_hash: &str,
    ) -> Result<(TicketSpendType, PoolStatus), ChainIndexError> {
        self.store.ticket_status(ticket_hash).await
    }

    pub async fn missed_votes_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<String>, ChainIndexError> {
        self.store.missed_votes_in_block(block_hash).await
    }

    pub async fn address_rows(
        &self,
        address: &str,
        kind: AddrTxnKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AddressRow>, ChainIndexError> {
        self.store.address_rows(address, kind, limit, offset).await
    }

    // ── Cached aggregates ────────────────────────────────────────────────────

    /// Balance of one address, served from the height-keyed cache when the
    /// chain has not advanced. Misses funnel through the cache's update
    /// gate, so concurrent misses share one store query while cached reads
    /// for other addresses proceed untouched.
    pub async fn address_balance(
        &self,
        address: &str,
    ) -> Result<AddressBalance, ChainIndexError> {
        let height = self.best_height().unwrap_or(0);

        if let Some(balance) = self.addr_cache.get(address, height).await {
            return Ok(balance);
        }
        let _guard = self.addr_cache.begin_update().await;
        // The previous gate holder may have been fetching this address.
        if let Some(balance) = self.addr_cache.get(address, height).await {
            return Ok(balance);
        }
        let balance = self.store.address_balance(address).await?;
        self.addr_cache.set(address, height, balance.clone()).await;
        Ok(balance)
    }

    /// A page of an address's ledger together with its balance. The balance
    /// goes through the same height-keyed cache as [`Self::address_balance`].
    pub async fn address_history(
        &self,
        address: &str,
        kind: AddrTxnKind,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AddressRow>, AddressBalance), ChainIndexError> {
        let rows = self.store.address_rows(address, kind, limit, offset).await?;
        let balance = self.address_balance(address).await?;
        Ok((rows, balance))
    }

    /// Balance of the development-fund address, keyed by best-block hash.
    pub async fn dev_balance(&self) -> Result<AddressBalance, ChainIndexError> {
        let Some((_, hash)) = self.best_block() else {
            return Ok(AddressBalance {
                address: self.params.dev_subsidy_address.clone(),
                ..Default::default()
            });
        };
        if let Some(balance) = self.dev_cache.get(&hash).await {
            return Ok(balance);
        }
        self.update_dev_balance().await?;
        match self.dev_cache.get(&hash).await {
            Some(balance) => Ok(balance),
            // A concurrent refresh stored a newer block's balance; query
            // directly rather than chasing the cache.
            None => self.store.address_balance(&self.params.dev_subsidy_address).await,
        }
    }

    /// Refresh the dev-fund cache for the current best block. Skipped when a
    /// refresh is already in flight.
    pub async fn update_dev_balance(&self) -> Result<(), ChainIndexError> {
        let Some(_guard) = self.dev_cache.try_begin_update() else {
            debug!("dev balance refresh already in flight");
            return Ok(());
        };
        let Some((_, hash)) = self.best_block() else {
            return Ok(());
        };
        let balance = self
            .store
            .address_balance(&self.params.dev_subsidy_address)
            .await?;
        self.dev_cache.set(&hash, balance).await;
        Ok(())
    }

    /// The ticket-pool charts for one grouping interval.
    ///
    /// A fresh cache entry is served directly. On a miss, the first caller
    /// claims the interval's update gate and recomputes; latecomers return
    /// stale data if they have any, and otherwise wait for the update.
    pub async fn ticket_pool_charts(
        &self,
        interval: ChartInterval,
    ) -> Result<TicketPoolCharts, ChainIndexError> {
        let height = self.best_height().unwrap_or(0);
        if let Some((cached_height, charts)) = self.pool_cache.cached(interval).await {
            if cached_height == height {
                return Ok(charts);
            }
        }

        match self.pool_cache.try_update(interval) {
            Some(_guard) => {
                let (computed_height, charts) = self.fetch_pool_charts(interval).await?;
                self.pool_cache
                    .set(interval, computed_height, charts.clone())
                    .await;
                Ok(charts)
            }
            None => {
                if let Some((cached_height, charts)) = self.pool_cache.cached(interval).await {
                    debug!(%interval, cached_height, "serving stale ticket pool charts");
                    return Ok(charts);
                }
                let _guard = self.pool_cache.wait_update(interval).await;
                self.pool_cache
                    .cached(interval)
                    .await
                    .map(|(_, charts)| charts)
                    .ok_or_else(|| {
                        ChainIndexError::Cache("ticket pool charts unavailable".into())
                    })
            }
        }
    }

    /// Compute the chart set from the store, retrying until the chain stops
    /// advancing underneath the queries so all three describe one height.
    async fn fetch_pool_charts(
        &self,
        interval: ChartInterval,
    ) -> Result<(u64, TicketPoolCharts), ChainIndexError> {
        loop {
            let height = self.best_height().unwrap_or(0);
            let maturity_height = height.saturating_sub(self.params.ticket_maturity);

            let by_date = self
                .store
                .tickets_by_purchase_date(maturity_height, interval.seconds())
                .await?;
            let by_price = self.store.tickets_by_price(maturity_height).await?;
            let donut = self.store.tickets_by_input_count().await?;

            if self.best_height().unwrap_or(0) != height {
                warn!(%interval, height, "chain advanced during chart queries, retrying");
                continue;
            }
            return Ok((
                height,
                TicketPoolCharts {
                    bars: vec![by_date, by_price],
                    donut,
                },
            ));
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use stakeindex_core::types::ChartInterval;

    use super::*;
    use crate::testutil::*;

    #[tokio::test]
    async fn address_balance_cache_tracks_the_tip() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        db.store_block(&b0, true, true).await.unwrap();

        let balance = db.address_balance("miner").await.unwrap();
        assert_eq!(balance.total_unspent, 50);
        assert_eq!(balance.num_unspent, 1);
        // Second read is served from the cache at the same height.
        assert_eq!(db.address_balance("miner").await.unwrap().total_unspent, 50);

        // A new block spends the output, and the cached entry is dropped.
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner"), ordinary("tx1", "cb0", 0, 40, "alice")],
            vec![]);
        db.store_block(&b1, true, true).await.unwrap();

        let balance = db.address_balance("miner").await.unwrap();
        assert_eq!(balance.total_unspent, 50);
        assert_eq!(balance.total_spent, 50);
        assert_eq!(db.address_balance("alice").await.unwrap().total_unspent, 40);
    }

    #[tokio::test]
    async fn concurrent_balance_readers_agree() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        db.store_block(&b0, true, true).await.unwrap();

        let (a, b) = tokio::join!(
            db.address_balance("miner"),
            db.address_balance("miner"),
        );
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn address_history_pairs_rows_with_balance() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        db.store_block(&b0, true, true).await.unwrap();

        let (rows, balance) = db
            .address_history("miner", AddrTxnKind::All, 10, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(balance.total_unspent, 50);
    }

    #[tokio::test]
    async fn dev_balance_reflects_the_dev_fund_address() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 50, "dev-fund")], vec![]);
        tracker.set_winners("b0", &[]);
        db.store_block(&b0, true, true).await.unwrap();

        let balance = db.dev_balance().await.unwrap();
        assert_eq!(balance.total_unspent, 50);
        // Repeat reads hit the cached entry for the same tip.
        assert_eq!(db.dev_balance().await.unwrap().total_unspent, 50);
    }

    #[tokio::test]
    async fn dev_balance_on_an_empty_chain_is_zero() {
        let (_store, _tracker, db) = engine().await;
        let balance = db.dev_balance().await.unwrap();
        assert_eq!(balance.total_unspent, 0);
        assert_eq!(balance.total_spent, 0);
    }

    #[tokio::test]
    async fn ticket_pool_charts_cover_the_live_pool() {
        let (_store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 200, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![ticket("t1", "cb0", 100, "staker"), ticket("t2", "cb0", 120, "staker")]);
        let b2 = raw_block(2, "b2", "b1", 1, vec![coinbase("cb2", 50, "miner")], vec![]);
        tracker.set_winners("b0", &[]);
        tracker.set_winners("b1", &[]);

        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        db.store_block(&b2, true, true).await.unwrap();

        let charts = db.ticket_pool_charts(ChartInterval::All).await.unwrap();
        assert_eq!(charts.bars.len(), 2);
        let by_date = &charts.bars[0];
        assert_eq!(by_date.count.iter().sum::<u64>(), 2);
        let donut = &charts.donut;
        // Both tickets were funded by a single input.
        assert_eq!(donut.count.len(), 1);
        assert_eq!(donut.count[0], 2);

        // A second call at the same height is a cache hit.
        let again = db.ticket_pool_charts(ChartInterval::All).await.unwrap();
        assert_eq!(again.bars[0], charts.bars[0]);
    }

    #[tokio::test]
    async fn ticket_cache_preloads_unspent_tickets() {
        let (store, tracker, db) = engine().await;
        let b0 = raw_block(0, "b0", stakeindex_core::ZERO_HASH, 1,
            vec![coinbase("cb0", 200, "miner")], vec![]);
        let b1 = raw_block(1, "b1", "b0", 1,
            vec![coinbase("cb1", 50, "miner")],
            vec![ticket("t1", "cb0", 100, "staker")]);
        tracker.set_winners("b0", &[]);
        db.store_block(&b0, true, true).await.unwrap();
        db.store_block(&b1, true, true).await.unwrap();
        drop(db);

        // A fresh engine over the same store warms its cache from the pool.
        let config = ChainDbConfig {
            params: stakeindex_core::ChainParams {
                ticket_maturity: 1,
                dev_subsidy_address: "dev-fund".into(),
                ..Default::default()
            },
            enable_ticket_cache: true,
            dev_prefetch: false,
        };
        let db = ChainDb::new(store, tracker, config).await.unwrap();
        let cache = db.ticket_cache.as_ref().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(db.best_block(), Some((1, "b1".to_string())));
    }
}
