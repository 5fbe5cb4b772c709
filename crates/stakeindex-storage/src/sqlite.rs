//! SQLite storage backend.
//!
//! Persists the full relational schema (blocks, transactions, vins, vouts,
//! tickets, votes, misses, addresses) to a single SQLite file. Uses `sqlx`
//! with WAL mode for concurrent read performance.
//!
//! Inserts upsert on natural keys and `RETURNING id`, so re-running a
//! partially-ingested block yields the same row IDs instead of duplicates.
//!
//! # Usage
//! ```rust,no_run
//! use stakeindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./index.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use stakeindex_core::error::ChainIndexError;
use stakeindex_core::store::{ChainStore, SpendingOp, TicketSpendUpdate, TxIoIds, VoteSpendInfo};
use stakeindex_core::types::{
    AddrTxnKind, AddressBalance, AddressRow, BlockRow, BlockStatus, PoolStatus, PoolTicketsData,
    TicketRow, TicketSpendType, TxRow, TxTree, TxType, VinRow, VoteRow, VoutRow, ZERO_HASH,
};

// ─── Enum text encoding ──────────────────────────────────────────────────────

fn tree_str(tree: TxTree) -> &'static str {
    match tree {
        TxTree::Regular => "regular",
        TxTree::Stake => "stake",
    }
}

fn tree_from(s: &str) -> TxTree {
    if s == "stake" {
        TxTree::Stake
    } else {
        TxTree::Regular
    }
}

fn tx_type_str(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Ordinary => "ordinary",
        TxType::Coinbase => "coinbase",
        TxType::Ticket => "ticket",
        TxType::Vote => "vote",
        TxType::Revocation => "revocation",
    }
}

fn tx_type_from(s: &str) -> TxType {
    match s {
        "coinbase" => TxType::Coinbase,
        "ticket" => TxType::Ticket,
        "vote" => TxType::Vote,
        "revocation" => TxType::Revocation,
        _ => TxType::Ordinary,
    }
}

fn spend_type_str(spend_type: TicketSpendType) -> &'static str {
    match spend_type {
        TicketSpendType::Unspent => "unspent",
        TicketSpendType::Voted => "voted",
        TicketSpendType::Revoked => "revoked",
    }
}

fn spend_type_from(s: &str) -> TicketSpendType {
    match s {
        "voted" => TicketSpendType::Voted,
        "revoked" => TicketSpendType::Revoked,
        _ => TicketSpendType::Unspent,
    }
}

fn pool_status_from(s: &str) -> PoolStatus {
    match s {
        "voted" => PoolStatus::Voted,
        "missed" => PoolStatus::Missed,
        "expired" => PoolStatus::Expired,
        _ => PoolStatus::Live,
    }
}

fn ids_json(ids: &[u64]) -> String {
    serde_json::to_string(ids).unwrap_or_else(|_| "[]".into())
}

fn ids_from_json(s: &str) -> Vec<u64> {
    serde_json::from_str(s).unwrap_or_default()
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn tx_from_row(row: &SqliteRow) -> TxRow {
    TxRow {
        block_hash: row.get("block_hash"),
        block_height: row.get::<i64, _>("block_height") as u64,
        block_time: row.get("block_time"),
        block_index: row.get::<i64, _>("block_index") as u32,
        tree: tree_from(&row.get::<String, _>("tree")),
        tx_type: tx_type_from(&row.get::<String, _>("tx_type")),
        hash: row.get("hash"),
        num_vin: row.get::<i64, _>("num_vin") as u32,
        num_vout: row.get::<i64, _>("num_vout") as u32,
        sent: row.get::<i64, _>("sent") as u64,
        vin_row_ids: ids_from_json(&row.get::<String, _>("vin_row_ids")),
        vout_row_ids: ids_from_json(&row.get::<String, _>("vout_row_ids")),
        is_valid: row.get("is_valid"),
        is_mainchain: row.get("is_mainchain"),
    }
}

fn block_status_from_row(row: &SqliteRow) -> BlockStatus {
    BlockStatus {
        is_valid: row.get("is_valid"),
        is_mainchain: row.get("is_mainchain"),
        height: row.get::<i64, _>("height") as u64,
        hash: row.get("hash"),
        prev_hash: row.get("prev_hash"),
        next_hash: row.get("next_hash"),
    }
}

fn address_row_from_row(row: &SqliteRow) -> AddressRow {
    AddressRow {
        address: row.get("address"),
        tx_hash: row.get("tx_hash"),
        io_index: row.get::<i64, _>("io_index") as u32,
        is_funding: row.get("is_funding"),
        value: row.get::<i64, _>("value") as u64,
        block_time: row.get("block_time"),
        matching_tx_hash: row.get("matching_tx_hash"),
        valid_mainchain: row.get("valid_mainchain"),
    }
}

/// SQLite-backed [`ChainStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ChainIndexError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ChainIndexError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), ChainIndexError> {
        // WAL mode for concurrent read throughput
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let tables = [
            "CREATE TABLE IF NOT EXISTS blocks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                height       INTEGER NOT NULL,
                hash         TEXT    NOT NULL UNIQUE,
                prev_hash    TEXT    NOT NULL,
                time         INTEGER NOT NULL,
                vote_bits    INTEGER NOT NULL,
                tx_count     INTEGER NOT NULL,
                stx_count    INTEGER NOT NULL,
                is_valid     BOOLEAN NOT NULL,
                is_mainchain BOOLEAN NOT NULL,
                tx_row_ids   TEXT    NOT NULL,
                stx_row_ids  TEXT    NOT NULL,
                next_hash    TEXT    NOT NULL DEFAULT ''
            );",
            "CREATE TABLE IF NOT EXISTS transactions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                block_hash   TEXT    NOT NULL,
                block_height INTEGER NOT NULL,
                block_time   INTEGER NOT NULL,
                block_index  INTEGER NOT NULL,
                tree         TEXT    NOT NULL,
                tx_type      TEXT    NOT NULL,
                hash         TEXT    NOT NULL,
                num_vin      INTEGER NOT NULL,
                num_vout     INTEGER NOT NULL,
                sent         INTEGER NOT NULL,
                vin_row_ids  TEXT    NOT NULL,
                vout_row_ids TEXT    NOT NULL,
                is_valid     BOOLEAN NOT NULL,
                is_mainchain BOOLEAN NOT NULL,
                UNIQUE (hash, block_hash)
            );",
            "CREATE TABLE IF NOT EXISTS vins (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash       TEXT    NOT NULL,
                tx_index      INTEGER NOT NULL,
                tx_tree       TEXT    NOT NULL,
                tx_type       TEXT    NOT NULL,
                prev_tx_hash  TEXT    NOT NULL,
                prev_tx_index INTEGER NOT NULL,
                prev_tx_tree  TEXT    NOT NULL,
                is_valid      BOOLEAN NOT NULL,
                is_mainchain  BOOLEAN NOT NULL,
                UNIQUE (tx_hash, tx_index)
            );",
            "CREATE TABLE IF NOT EXISTS vouts (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash   TEXT    NOT NULL,
                tx_index  INTEGER NOT NULL,
                tx_tree   TEXT    NOT NULL,
                value     INTEGER NOT NULL,
                script    TEXT    NOT NULL,
                addresses TEXT    NOT NULL,
                UNIQUE (tx_hash, tx_index, tx_tree)
            );",
            "CREATE TABLE IF NOT EXISTS tickets (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash            TEXT    NOT NULL,
                block_hash         TEXT    NOT NULL,
                block_height       INTEGER NOT NULL,
                purchase_tx_row_id INTEGER NOT NULL,
                price              INTEGER NOT NULL,
                num_inputs         INTEGER NOT NULL,
                spend_type         TEXT    NOT NULL,
                pool_status        TEXT    NOT NULL,
                spending_tx_row_id INTEGER,
                spend_height       INTEGER,
                is_mainchain       BOOLEAN NOT NULL,
                UNIQUE (tx_hash, block_hash)
            );",
            "CREATE TABLE IF NOT EXISTS votes (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                tx_hash         TEXT    NOT NULL,
                block_hash      TEXT    NOT NULL,
                block_height    INTEGER NOT NULL,
                ticket_hash     TEXT    NOT NULL,
                vote_bits       INTEGER NOT NULL,
                approves_parent BOOLEAN NOT NULL,
                is_mainchain    BOOLEAN NOT NULL,
                UNIQUE (tx_hash, block_hash)
            );",
            "CREATE TABLE IF NOT EXISTS misses (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                block_hash  TEXT NOT NULL,
                ticket_hash TEXT NOT NULL,
                UNIQUE (block_hash, ticket_hash)
            );",
            "CREATE TABLE IF NOT EXISTS addresses (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                address          TEXT    NOT NULL,
                tx_hash          TEXT    NOT NULL,
                io_index         INTEGER NOT NULL,
                is_funding       BOOLEAN NOT NULL,
                value            INTEGER NOT NULL,
                block_time       INTEGER NOT NULL,
                matching_tx_hash TEXT,
                valid_mainchain  BOOLEAN NOT NULL,
                UNIQUE (address, tx_hash, io_index, is_funding)
            );",
            // Indexes for common query patterns
            "CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks (height);",
            "CREATE INDEX IF NOT EXISTS idx_txns_block ON transactions (block_hash);",
            "CREATE INDEX IF NOT EXISTS idx_txns_hash ON transactions (hash);",
            "CREATE INDEX IF NOT EXISTS idx_vins_prev ON vins (prev_tx_hash);",
            "CREATE INDEX IF NOT EXISTS idx_tickets_hash ON tickets (tx_hash);",
            "CREATE INDEX IF NOT EXISTS idx_addresses_addr ON addresses (address);",
        ];
        for sql in tables {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    /// Insert the spending-side ledger rows for one previous outpoint and
    /// backfill `matching_tx_hash` on its funding rows.
    async fn apply_spending_op(&self, op: &SpendingOp) -> Result<u64, ChainIndexError> {
        let vout = sqlx::query(
            "SELECT value, addresses FROM vouts
             WHERE tx_hash = ? AND tx_index = ? AND tx_tree = ?",
        )
        .bind(&op.prev_tx_hash)
        .bind(op.prev_tx_index as i64)
        .bind(tree_str(op.prev_tx_tree))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let Some(vout) = vout else {
            return Ok(0);
        };
        let value: i64 = vout.get("value");
        let addresses: Vec<String> =
            serde_json::from_str(&vout.get::<String, _>("addresses")).unwrap_or_default();

        let mut touched = 0u64;
        for address in &addresses {
            sqlx::query(
                "INSERT INTO addresses
                 (address, tx_hash, io_index, is_funding, value, block_time,
                  matching_tx_hash, valid_mainchain)
                 VALUES (?, ?, ?, 0, ?, ?, ?, ?)
                 ON CONFLICT (address, tx_hash, io_index, is_funding) DO UPDATE SET
                    value = excluded.value,
                    block_time = excluded.block_time,
                    matching_tx_hash = excluded.matching_tx_hash,
                    valid_mainchain = excluded.valid_mainchain",
            )
            .bind(address)
            .bind(&op.spending_tx_hash)
            .bind(op.spending_tx_vin_index as i64)
            .bind(value)
            .bind(op.block_time)
            .bind(&op.prev_tx_hash)
            .bind(op.valid_mainchain)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            touched += 1;
        }

        let matched = sqlx::query(
            "UPDATE addresses SET matching_tx_hash = ?
             WHERE tx_hash = ? AND io_index = ? AND is_funding = 1",
        )
        .bind(&op.spending_tx_hash)
        .bind(&op.prev_tx_hash)
        .bind(op.prev_tx_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        Ok(touched + matched.rows_affected())
    }
}

#[async_trait]
impl ChainStore for SqliteStore {
    // ── Inserts ──────────────────────────────────────────────────────────────

    async fn insert_vouts(&self, vouts: &[VoutRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut ids = Vec::with_capacity(vouts.len());
        for vout in vouts {
            let addresses = serde_json::to_string(&vout.addresses)
                .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            let row = sqlx::query(
                "INSERT INTO vouts (tx_hash, tx_index, tx_tree, value, script, addresses)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_hash, tx_index, tx_tree) DO UPDATE SET value = excluded.value
                 RETURNING id",
            )
            .bind(&vout.tx_hash)
            .bind(vout.tx_index as i64)
            .bind(tree_str(vout.tx_tree))
            .bind(vout.value as i64)
            .bind(&vout.script)
            .bind(&addresses)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            ids.push(row.get::<i64, _>("id") as u64);
        }
        Ok(ids)
    }

    async fn insert_vins(&self, vins: &[VinRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut ids = Vec::with_capacity(vins.len());
        for vin in vins {
            let row = sqlx::query(
                "INSERT INTO vins
                 (tx_hash, tx_index, tx_tree, tx_type, prev_tx_hash, prev_tx_index,
                  prev_tx_tree, is_valid, is_mainchain)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_hash, tx_index) DO UPDATE SET
                    is_valid = excluded.is_valid,
                    is_mainchain = excluded.is_mainchain
                 RETURNING id",
            )
            .bind(&vin.tx_hash)
            .bind(vin.tx_index as i64)
            .bind(tree_str(vin.tx_tree))
            .bind(tx_type_str(vin.tx_type))
            .bind(&vin.prev_tx_hash)
            .bind(vin.prev_tx_index as i64)
            .bind(tree_str(vin.prev_tx_tree))
            .bind(vin.is_valid)
            .bind(vin.is_mainchain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            ids.push(row.get::<i64, _>("id") as u64);
        }
        Ok(ids)
    }

    async fn insert_txns(&self, txns: &[TxRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut ids = Vec::with_capacity(txns.len());
        for tx in txns {
            let row = sqlx::query(
                "INSERT INTO transactions
                 (block_hash, block_height, block_time, block_index, tree, tx_type, hash,
                  num_vin, num_vout, sent, vin_row_ids, vout_row_ids, is_valid, is_mainchain)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (hash, block_hash) DO UPDATE SET
                    vin_row_ids = excluded.vin_row_ids,
                    vout_row_ids = excluded.vout_row_ids,
                    is_valid = excluded.is_valid,
                    is_mainchain = excluded.is_mainchain
                 RETURNING id",
            )
            .bind(&tx.block_hash)
            .bind(tx.block_height as i64)
            .bind(tx.block_time)
            .bind(tx.block_index as i64)
            .bind(tree_str(tx.tree))
            .bind(tx_type_str(tx.tx_type))
            .bind(&tx.hash)
            .bind(tx.num_vin as i64)
            .bind(tx.num_vout as i64)
            .bind(tx.sent as i64)
            .bind(ids_json(&tx.vin_row_ids))
            .bind(ids_json(&tx.vout_row_ids))
            .bind(tx.is_valid)
            .bind(tx.is_mainchain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            ids.push(row.get::<i64, _>("id") as u64);
        }
        Ok(ids)
    }

    async fn insert_tickets(&self, tickets: &[TicketRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut ids = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            // On re-ingest the spend columns are untouched; classification
            // re-derives them afterward.
            let row = sqlx::query(
                "INSERT INTO tickets
                 (tx_hash, block_hash, block_height, purchase_tx_row_id, price, num_inputs,
                  spend_type, pool_status, spending_tx_row_id, spend_height, is_mainchain)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_hash, block_hash) DO UPDATE SET
                    is_mainchain = excluded.is_mainchain
                 RETURNING id",
            )
            .bind(&ticket.tx_hash)
            .bind(&ticket.block_hash)
            .bind(ticket.block_height as i64)
            .bind(ticket.purchase_tx_row_id as i64)
            .bind(ticket.price as i64)
            .bind(ticket.num_inputs as i64)
            .bind(spend_type_str(ticket.spend_type))
            .bind(ticket.pool_status.to_string())
            .bind(ticket.spending_tx_row_id.map(|id| id as i64))
            .bind(ticket.spend_height.map(|h| h as i64))
            .bind(ticket.is_mainchain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            ids.push(row.get::<i64, _>("id") as u64);
        }
        Ok(ids)
    }

    async fn insert_votes(&self, votes: &[VoteRow]) -> Result<Vec<u64>, ChainIndexError> {
        let mut ids = Vec::with_capacity(votes.len());
        for vote in votes {
            let row = sqlx::query(
                "INSERT INTO votes
                 (tx_hash, block_hash, block_height, ticket_hash, vote_bits,
                  approves_parent, is_mainchain)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_hash, block_hash) DO UPDATE SET
                    is_mainchain = excluded.is_mainchain
                 RETURNING id",
            )
            .bind(&vote.tx_hash)
            .bind(&vote.block_hash)
            .bind(vote.block_height as i64)
            .bind(&vote.ticket_hash)
            .bind(vote.vote_bits as i64)
            .bind(vote.approves_parent)
            .bind(vote.is_mainchain)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            ids.push(row.get::<i64, _>("id") as u64);
        }
        Ok(ids)
    }

    async fn insert_misses(
        &self,
        block_hash: &str,
        ticket_hashes: &[String],
    ) -> Result<u64, ChainIndexError> {
        let mut added = 0u64;
        for hash in ticket_hashes {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO misses (block_hash, ticket_hash) VALUES (?, ?)",
            )
            .bind(block_hash)
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            added += result.rows_affected();
        }
        Ok(added)
    }

    async fn insert_block(&self, block: &BlockRow) -> Result<u64, ChainIndexError> {
        // next_hash is preserved on conflict; only linkage updates may set it.
        let row = sqlx::query(
            "INSERT INTO blocks
             (height, hash, prev_hash, time, vote_bits, tx_count, stx_count,
              is_valid, is_mainchain, tx_row_ids, stx_row_ids)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (hash) DO UPDATE SET
                is_valid = excluded.is_valid,
                is_mainchain = excluded.is_mainchain,
                tx_row_ids = excluded.tx_row_ids,
                stx_row_ids = excluded.stx_row_ids
             RETURNING id",
        )
        .bind(block.height as i64)
        .bind(&block.hash)
        .bind(&block.prev_hash)
        .bind(block.time)
        .bind(block.vote_bits as i64)
        .bind(block.tx_count as i64)
        .bind(block.stx_count as i64)
        .bind(block.is_valid)
        .bind(block.is_mainchain)
        .bind(ids_json(&block.tx_row_ids))
        .bind(ids_json(&block.stx_row_ids))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let id = row.get::<i64, _>("id") as u64;
        debug!(height = block.height, hash = %block.hash, id, "block stored");
        Ok(id)
    }

    async fn insert_address_rows(&self, rows: &[AddressRow]) -> Result<u64, ChainIndexError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO addresses
                 (address, tx_hash, io_index, is_funding, value, block_time,
                  matching_tx_hash, valid_mainchain)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (address, tx_hash, io_index, is_funding) DO UPDATE SET
                    value = excluded.value,
                    block_time = excluded.block_time,
                    valid_mainchain = excluded.valid_mainchain",
            )
            .bind(&row.address)
            .bind(&row.tx_hash)
            .bind(row.io_index as i64)
            .bind(row.is_funding)
            .bind(row.value as i64)
            .bind(row.block_time)
            .bind(&row.matching_tx_hash)
            .bind(row.valid_mainchain)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        }
        Ok(rows.len() as u64)
    }

    // ── Block linkage and best block ─────────────────────────────────────────

    async fn set_block_next(
        &self,
        block_row_id: u64,
        next_hash: &str,
    ) -> Result<(), ChainIndexError> {
        let result = sqlx::query("UPDATE blocks SET next_hash = ? WHERE id = ?")
            .bind(next_hash)
            .bind(block_row_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(ChainIndexError::NotFound);
        }
        Ok(())
    }

    async fn block_row_id(&self, hash: &str) -> Result<u64, ChainIndexError> {
        let row = sqlx::query("SELECT id FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get::<i64, _>("id") as u64)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn best_block(&self) -> Result<(u64, String), ChainIndexError> {
        let row = sqlx::query(
            "SELECT height, hash FROM blocks WHERE is_mainchain = 1
             ORDER BY height DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| (r.get::<i64, _>("height") as u64, r.get("hash")))
            .ok_or(ChainIndexError::NotFound)
    }

    // ── Point/range retrievals ───────────────────────────────────────────────

    async fn block_status(&self, hash: &str) -> Result<BlockStatus, ChainIndexError> {
        let row = sqlx::query(
            "SELECT is_valid, is_mainchain, height, hash, prev_hash, next_hash
             FROM blocks WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| block_status_from_row(&r))
            .ok_or(ChainIndexError::NotFound)
    }

    async fn block_height(&self, hash: &str) -> Result<u64, ChainIndexError> {
        let row = sqlx::query("SELECT height FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get::<i64, _>("height") as u64)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn block_hash(&self, height: u64) -> Result<String, ChainIndexError> {
        let row = sqlx::query("SELECT hash FROM blocks WHERE height = ? AND is_mainchain = 1")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get("hash")).ok_or(ChainIndexError::NotFound)
    }

    async fn transactions_by_hash(&self, tx_hash: &str) -> Result<Vec<TxRow>, ChainIndexError> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE hash = ?")
            .bind(tx_hash)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(tx_from_row).collect())
    }

    async fn transactions_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<TxRow>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE block_hash = ? ORDER BY tree, block_index",
        )
        .bind(block_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(tx_from_row).collect())
    }

    async fn spending_transaction(
        &self,
        funding_tx_hash: &str,
        vout_index: u32,
    ) -> Result<(String, u32, TxTree), ChainIndexError> {
        let row = sqlx::query(
            "SELECT tx_hash, tx_index, tx_tree FROM vins
             WHERE prev_tx_hash = ? AND prev_tx_index = ? LIMIT 1",
        )
        .bind(funding_tx_hash)
        .bind(vout_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| {
            (
                r.get("tx_hash"),
                r.get::<i64, _>("tx_index") as u32,
                tree_from(&r.get::<String, _>("tx_tree")),
            )
        })
        .ok_or(ChainIndexError::NotFound)
    }

    async fn spending_transactions(
        &self,
        funding_tx_hash: &str,
    ) -> Result<Vec<(String, u32, u32)>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT tx_hash, tx_index, prev_tx_index FROM vins WHERE prev_tx_hash = ?",
        )
        .bind(funding_tx_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get("tx_hash"),
                    r.get::<i64, _>("tx_index") as u32,
                    r.get::<i64, _>("prev_tx_index") as u32,
                )
            })
            .collect())
    }

    async fn vout_value(&self, tx_hash: &str, vout_index: u32) -> Result<u64, ChainIndexError> {
        let row = sqlx::query("SELECT value FROM vouts WHERE tx_hash = ? AND tx_index = ?")
            .bind(tx_hash)
            .bind(vout_index as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get::<i64, _>("value") as u64)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn vout_values(&self, tx_hash: &str) -> Result<Vec<u64>, ChainIndexError> {
        let rows = sqlx::query("SELECT value FROM vouts WHERE tx_hash = ? ORDER BY tx_index")
            .bind(tx_hash)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("value") as u64).collect())
    }

    async fn missed_votes_in_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<String>, ChainIndexError> {
        let rows = sqlx::query("SELECT ticket_hash FROM misses WHERE block_hash = ?")
            .bind(block_hash)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get("ticket_hash")).collect())
    }

    async fn ticket_status(
        &self,
        ticket_hash: &str,
    ) -> Result<(TicketSpendType, PoolStatus), ChainIndexError> {
        let row = sqlx::query(
            "SELECT spend_type, pool_status FROM tickets WHERE tx_hash = ?
             ORDER BY is_mainchain DESC LIMIT 1",
        )
        .bind(ticket_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| {
            (
                spend_type_from(&r.get::<String, _>("spend_type")),
                pool_status_from(&r.get::<String, _>("pool_status")),
            )
        })
        .ok_or(ChainIndexError::NotFound)
    }

    async fn ticket_row_id_by_hash(&self, ticket_hash: &str) -> Result<u64, ChainIndexError> {
        let row = sqlx::query(
            "SELECT id FROM tickets WHERE tx_hash = ? ORDER BY is_mainchain DESC LIMIT 1",
        )
        .bind(ticket_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get::<i64, _>("id") as u64)
            .ok_or(ChainIndexError::NotFound)
    }

    async fn unspent_tickets(&self) -> Result<(Vec<u64>, Vec<String>), ChainIndexError> {
        let rows = sqlx::query(
            "SELECT id, tx_hash FROM tickets
             WHERE spend_type = 'unspent' AND is_mainchain = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        let mut ids = Vec::with_capacity(rows.len());
        let mut hashes = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.get::<i64, _>("id") as u64);
            hashes.push(row.get("tx_hash"));
        }
        Ok((ids, hashes))
    }

    async fn side_chain_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT is_valid, is_mainchain, height, hash, prev_hash, next_hash
             FROM blocks WHERE is_mainchain = 0 ORDER BY height",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(block_status_from_row).collect())
    }

    async fn disapproved_blocks(&self) -> Result<Vec<BlockStatus>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT is_valid, is_mainchain, height, hash, prev_hash, next_hash
             FROM blocks WHERE is_valid = 0 ORDER BY height",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(block_status_from_row).collect())
    }

    // ── Mainchain/validity flag flips ────────────────────────────────────────

    async fn set_block_mainchain(
        &self,
        hash: &str,
        is_mainchain: bool,
    ) -> Result<String, ChainIndexError> {
        let row = sqlx::query(
            "UPDATE blocks SET is_mainchain = ? WHERE hash = ? RETURNING prev_hash",
        )
        .bind(is_mainchain)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        row.map(|r| r.get("prev_hash")).ok_or(ChainIndexError::NotFound)
    }

    async fn set_block_valid(
        &self,
        block_row_id: u64,
        is_valid: bool,
    ) -> Result<(), ChainIndexError> {
        let result = sqlx::query("UPDATE blocks SET is_valid = ? WHERE id = ?")
            .bind(is_valid)
            .bind(block_row_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(ChainIndexError::NotFound);
        }
        Ok(())
    }

    async fn set_transactions_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query("UPDATE transactions SET is_mainchain = ? WHERE block_hash = ?")
            .bind(is_mainchain)
            .bind(block_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn block_vin_vout_ids(
        &self,
        block_hash: &str,
    ) -> Result<Vec<TxIoIds>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT hash, vin_row_ids, vout_row_ids, is_mainchain
             FROM transactions WHERE block_hash = ?",
        )
        .bind(block_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| TxIoIds {
                tx_hash: r.get("hash"),
                vin_row_ids: ids_from_json(&r.get::<String, _>("vin_row_ids")),
                vout_row_ids: ids_from_json(&r.get::<String, _>("vout_row_ids")),
                is_mainchain: r.get("is_mainchain"),
            })
            .collect())
    }

    async fn set_vins_mainchain(
        &self,
        vin_row_ids: &[u64],
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        if vin_row_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; vin_row_ids.len()].join(",");
        let sql = format!("UPDATE vins SET is_mainchain = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(is_mainchain);
        for id in vin_row_ids {
            query = query.bind(*id as i64);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_addresses_mainchain_by_ids(
        &self,
        vin_row_ids: &[u64],
        vout_row_ids: &[u64],
        valid_mainchain: bool,
    ) -> Result<(u64, u64), ChainIndexError> {
        let mut spending = 0u64;
        if !vin_row_ids.is_empty() {
            let placeholders = vec!["?"; vin_row_ids.len()].join(",");
            let sql = format!(
                "UPDATE addresses SET valid_mainchain = ?
                 WHERE is_funding = 0 AND (tx_hash, io_index) IN
                    (SELECT tx_hash, tx_index FROM vins WHERE id IN ({placeholders}))"
            );
            let mut query = sqlx::query(&sql).bind(valid_mainchain);
            for id in vin_row_ids {
                query = query.bind(*id as i64);
            }
            spending = query
                .execute(&self.pool)
                .await
                .map_err(|e| ChainIndexError::Storage(e.to_string()))?
                .rows_affected();
        }

        let mut funding = 0u64;
        if !vout_row_ids.is_empty() {
            let placeholders = vec!["?"; vout_row_ids.len()].join(",");
            let sql = format!(
                "UPDATE addresses SET valid_mainchain = ?
                 WHERE is_funding = 1 AND (tx_hash, io_index) IN
                    (SELECT tx_hash, tx_index FROM vouts WHERE id IN ({placeholders}))"
            );
            let mut query = sqlx::query(&sql).bind(valid_mainchain);
            for id in vout_row_ids {
                query = query.bind(*id as i64);
            }
            funding = query
                .execute(&self.pool)
                .await
                .map_err(|e| ChainIndexError::Storage(e.to_string()))?
                .rows_affected();
        }

        Ok((spending, funding))
    }

    async fn set_votes_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query("UPDATE votes SET is_mainchain = ? WHERE block_hash = ?")
            .bind(is_mainchain)
            .bind(block_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_tickets_mainchain(
        &self,
        block_hash: &str,
        is_mainchain: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query("UPDATE tickets SET is_mainchain = ? WHERE block_hash = ?")
            .bind(is_mainchain)
            .bind(block_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_regular_txns_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query(
            "UPDATE transactions SET is_valid = ?
             WHERE block_hash = ? AND tree = 'regular'",
        )
        .bind(is_valid)
        .bind(block_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_regular_vins_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query(
            "UPDATE vins SET is_valid = ?
             WHERE tx_hash IN
                (SELECT hash FROM transactions WHERE block_hash = ? AND tree = 'regular')",
        )
        .bind(is_valid)
        .bind(block_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn set_addresses_valid(
        &self,
        block_hash: &str,
        is_valid: bool,
    ) -> Result<u64, ChainIndexError> {
        let result = sqlx::query(
            "UPDATE addresses SET valid_mainchain = ?
             WHERE tx_hash IN
                (SELECT hash FROM transactions WHERE block_hash = ? AND tree = 'regular')",
        )
        .bind(is_valid)
        .bind(block_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    // ── Ticket spend bookkeeping ─────────────────────────────────────────────

    async fn set_spending_for_tickets(
        &self,
        updates: &[TicketSpendUpdate],
    ) -> Result<u64, ChainIndexError> {
        let mut count = 0u64;
        for update in updates {
            let result = sqlx::query(
                "UPDATE tickets SET
                    spending_tx_row_id = ?, spend_height = ?, spend_type = ?, pool_status = ?
                 WHERE id = ?",
            )
            .bind(update.spending_tx_row_id as i64)
            .bind(update.spend_height as i64)
            .bind(spend_type_str(update.spend_type))
            .bind(update.pool_status.to_string())
            .bind(update.ticket_row_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            count += result.rows_affected();
        }
        Ok(count)
    }

    async fn set_pool_statuses_by_hash(
        &self,
        ticket_hashes: &[String],
        statuses: &[PoolStatus],
    ) -> Result<u64, ChainIndexError> {
        let mut count = 0u64;
        for (hash, status) in ticket_hashes.iter().zip(statuses.iter()) {
            let result = sqlx::query(
                "UPDATE tickets SET pool_status = ?
                 WHERE id = (SELECT id FROM tickets WHERE tx_hash = ?
                             ORDER BY is_mainchain DESC LIMIT 1)",
            )
            .bind(status.to_string())
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            count += result.rows_affected();
        }
        Ok(count)
    }

    // ── Address ledger ───────────────────────────────────────────────────────

    async fn set_spending_for_funding_op(
        &self,
        op: &SpendingOp,
    ) -> Result<u64, ChainIndexError> {
        self.apply_spending_op(op).await
    }

    async fn address_rows(
        &self,
        address: &str,
        kind: AddrTxnKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AddressRow>, ChainIndexError> {
        let filter = match kind {
            AddrTxnKind::All => "",
            AddrTxnKind::Credit => " AND is_funding = 1",
            AddrTxnKind::Debit => " AND is_funding = 0",
            AddrTxnKind::MergedDebit => "",
        };
        let mut sql = if kind == AddrTxnKind::MergedDebit {
            "SELECT address, tx_hash, 0 AS io_index, is_funding, SUM(value) AS value,
                    MAX(block_time) AS block_time, NULL AS matching_tx_hash, valid_mainchain
             FROM addresses WHERE address = ? AND is_funding = 0
             GROUP BY tx_hash ORDER BY block_time DESC"
                .to_string()
        } else {
            format!(
                "SELECT address, tx_hash, io_index, is_funding, value, block_time,
                        matching_tx_hash, valid_mainchain
                 FROM addresses WHERE address = ?{filter} ORDER BY block_time DESC"
            )
        };
        if limit > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
        }

        let mut query = sqlx::query(&sql).bind(address);
        if limit > 0 {
            query = query.bind(limit).bind(offset.max(0));
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(address_row_from_row).collect())
    }

    async fn address_balance(&self, address: &str) -> Result<AddressBalance, ChainIndexError> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN matching_tx_hash IS NOT NULL THEN 1 ELSE 0 END), 0)
                    AS num_spent,
                COALESCE(SUM(CASE WHEN matching_tx_hash IS NULL THEN 1 ELSE 0 END), 0)
                    AS num_unspent,
                COALESCE(SUM(CASE WHEN matching_tx_hash IS NOT NULL THEN value ELSE 0 END), 0)
                    AS total_spent,
                COALESCE(SUM(CASE WHEN matching_tx_hash IS NULL THEN value ELSE 0 END), 0)
                    AS total_unspent
             FROM addresses
             WHERE address = ? AND valid_mainchain = 1 AND is_funding = 1",
        )
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        Ok(AddressBalance {
            address: address.to_string(),
            num_spent: row.get::<i64, _>("num_spent") as u64,
            num_unspent: row.get::<i64, _>("num_unspent") as u64,
            total_spent: row.get::<i64, _>("total_spent") as u64,
            total_unspent: row.get::<i64, _>("total_unspent") as u64,
        })
    }

    // ── Bulk rebuild support ─────────────────────────────────────────────────

    async fn all_vin_ids(&self) -> Result<Vec<u64>, ChainIndexError> {
        let rows = sqlx::query("SELECT id FROM vins ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("id") as u64).collect())
    }

    async fn set_spending_for_vin_ids(
        &self,
        vin_row_ids: &[u64],
    ) -> Result<u64, ChainIndexError> {
        let mut touched = 0u64;
        for id in vin_row_ids {
            let vin = sqlx::query(
                "SELECT tx_hash, tx_index, prev_tx_hash, prev_tx_index, prev_tx_tree
                 FROM vins WHERE id = ?",
            )
            .bind(*id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            let Some(vin) = vin else { continue };

            let prev_tx_hash: String = vin.get("prev_tx_hash");
            if prev_tx_hash == ZERO_HASH {
                continue;
            }
            let tx_hash: String = vin.get("tx_hash");

            let tx = sqlx::query(
                "SELECT block_time, is_valid, is_mainchain FROM transactions
                 WHERE hash = ? ORDER BY is_mainchain DESC LIMIT 1",
            )
            .bind(&tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
            let Some(tx) = tx else { continue };

            let op = SpendingOp {
                prev_tx_hash,
                prev_tx_index: vin.get::<i64, _>("prev_tx_index") as u32,
                prev_tx_tree: tree_from(&vin.get::<String, _>("prev_tx_tree")),
                spending_tx_hash: tx_hash,
                spending_tx_vin_index: vin.get::<i64, _>("tx_index") as u32,
                vin_row_id: *id,
                block_time: tx.get("block_time"),
                valid_mainchain: tx.get::<bool, _>("is_valid") && tx.get::<bool, _>("is_mainchain"),
            };
            touched += self.apply_spending_op(&op).await?;
        }
        Ok(touched)
    }

    async fn all_vote_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT t.id AS tx_id, v.block_height, v.ticket_hash
             FROM votes v
             JOIN transactions t ON t.hash = v.tx_hash AND t.block_hash = v.block_hash
             ORDER BY v.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| VoteSpendInfo {
                spending_tx_row_id: r.get::<i64, _>("tx_id") as u64,
                block_height: r.get::<i64, _>("block_height") as u64,
                ticket_hash: r.get("ticket_hash"),
            })
            .collect())
    }

    async fn all_revocation_spend_info(&self) -> Result<Vec<VoteSpendInfo>, ChainIndexError> {
        // A revocation's single input (index 0) spends the ticket.
        let rows = sqlx::query(
            "SELECT t.id AS tx_id, t.block_height, v.prev_tx_hash
             FROM transactions t
             JOIN vins v ON v.tx_hash = t.hash AND v.tx_index = 0
             WHERE t.tx_type = 'revocation'
             ORDER BY t.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| VoteSpendInfo {
                spending_tx_row_id: r.get::<i64, _>("tx_id") as u64,
                block_height: r.get::<i64, _>("block_height") as u64,
                ticket_hash: r.get("prev_tx_hash"),
            })
            .collect())
    }

    // ── Ticket pool charts ───────────────────────────────────────────────────

    async fn tickets_by_purchase_date(
        &self,
        maturity_height: u64,
        interval_secs: i64,
    ) -> Result<PoolTicketsData, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT (b.time - (b.time % ?)) AS bucket, COUNT(*) AS cnt, AVG(t.price) AS avg_price
             FROM tickets t JOIN blocks b ON b.hash = t.block_hash
             WHERE t.spend_type = 'unspent' AND t.pool_status = 'live'
               AND t.is_mainchain = 1 AND t.block_height <= ?
             GROUP BY bucket ORDER BY bucket",
        )
        .bind(interval_secs)
        .bind(maturity_height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let mut data = PoolTicketsData::default();
        for row in rows {
            data.time.push(row.get("bucket"));
            data.price.push(row.get::<f64, _>("avg_price") / 1e8);
            data.count.push(row.get::<i64, _>("cnt") as u64);
        }
        Ok(data)
    }

    async fn tickets_by_price(
        &self,
        maturity_height: u64,
    ) -> Result<PoolTicketsData, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT price, COUNT(*) AS cnt FROM tickets
             WHERE spend_type = 'unspent' AND pool_status = 'live'
               AND is_mainchain = 1 AND block_height <= ?
             GROUP BY price ORDER BY price",
        )
        .bind(maturity_height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        let mut data = PoolTicketsData::default();
        for row in rows {
            data.price.push(row.get::<i64, _>("price") as f64 / 1e8);
            data.count.push(row.get::<i64, _>("cnt") as u64);
        }
        Ok(data)
    }

    async fn tickets_by_input_count(&self) -> Result<PoolTicketsData, ChainIndexError> {
        let rows = sqlx::query(
            "SELECT num_inputs, COUNT(*) AS cnt FROM tickets
             WHERE spend_type = 'unspent' AND pool_status = 'live' AND is_mainchain = 1
             GROUP BY num_inputs ORDER BY num_inputs",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainIndexError::Storage(e.to_string()))?;

        // The time axis carries the input-count buckets for the donut chart.
        let mut data = PoolTicketsData::default();
        for row in rows {
            data.time.push(row.get::<i64, _>("num_inputs"));
            data.count.push(row.get::<i64, _>("cnt") as u64);
        }
        Ok(data)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
