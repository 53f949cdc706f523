//! SQLite storage backend for PulseIndex.
//!
//! Persists raw records, pulse metadata and the composed entities to a single
//! SQLite file. Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use pulseindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./pulseindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use pulseindex_core::cursor::Position;
use pulseindex_core::entities::{
    BalanceUpdate, Deposit, DepositUpdate, Member, MigrationAddress, Transfer,
    WasteMigrationAddress,
};
use pulseindex_core::error::IndexerError;
use pulseindex_core::storage::{Storage, StorageTx};
use pulseindex_core::types::{ExportedRecord, PulseInfo};

use crate::sql_err;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS raw_records (
        pulse         INTEGER NOT NULL,
        record_number INTEGER NOT NULL,
        record_id     TEXT    NOT NULL,
        body          TEXT    NOT NULL,
        PRIMARY KEY (pulse, record_number)
    )",
    "CREATE TABLE IF NOT EXISTS pulses (
        pulse     INTEGER PRIMARY KEY,
        entropy   TEXT    NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS members (
        member_ref        TEXT    PRIMARY KEY,
        balance           TEXT    NOT NULL,
        migration_address TEXT,
        account_state     TEXT    NOT NULL,
        status            TEXT    NOT NULL,
        pulse             INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_members_account_state ON members (account_state)",
    "CREATE TABLE IF NOT EXISTS transfers (
        tx_id       TEXT    PRIMARY KEY,
        amount      TEXT    NOT NULL,
        fee         TEXT    NOT NULL,
        from_member TEXT    NOT NULL,
        to_member   TEXT    NOT NULL,
        pulse       INTEGER NOT NULL,
        timestamp   INTEGER NOT NULL,
        status      TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS deposits (
        eth_hash          TEXT    PRIMARY KEY,
        member_ref        TEXT    NOT NULL,
        amount            TEXT    NOT NULL,
        balance           TEXT    NOT NULL,
        hold_release_date INTEGER NOT NULL,
        transfer_date     INTEGER NOT NULL,
        deposit_state     TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_deposits_state ON deposits (deposit_state)",
    "CREATE TABLE IF NOT EXISTS migration_addresses (
        addr      TEXT    PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        wasted    INTEGER NOT NULL DEFAULT 0
    )",
];

/// SQLite-backed storage.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./pulseindex.db"`) or a full
    /// SQLite URL (`"sqlite:./pulseindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(sql_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection that is never recycled: every connection
    /// to `sqlite::memory:` is a separate database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(sql_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(sql_err)?;
        }
        Ok(())
    }

    /// All members, ordered by reference.
    pub async fn members(&self) -> Result<Vec<Member>, IndexerError> {
        let rows = sqlx::query(
            "SELECT member_ref, balance, migration_address, account_state, status, pulse
             FROM members ORDER BY member_ref",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sql_err)?;

        rows.into_iter()
            .map(|row| -> Result<Member, IndexerError> {
                Ok(Member {
                    member_ref: row.get::<String, _>("member_ref").parse()?,
                    balance: row.get("balance"),
                    migration_address: row.get("migration_address"),
                    account_state: row.get::<String, _>("account_state").parse()?,
                    status: row.get::<String, _>("status").into(),
                    pulse: row.get::<i64, _>("pulse") as u32,
                })
            })
            .collect()
    }

    /// Number of rows in `table`.
    pub async fn count(&self, table: &str) -> Result<u64, IndexerError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Whether `address` has been handed out.
    pub async fn is_wasted(&self, address: &str) -> Result<Option<bool>, IndexerError> {
        let row = sqlx::query("SELECT wasted FROM migration_addresses WHERE addr = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(row.map(|r| r.get::<i64, _>("wasted") != 0))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, IndexerError> {
        let tx = self.pool.begin().await.map_err(sql_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn last_record_position(&self) -> Result<Option<Position>, IndexerError> {
        let row = sqlx::query(
            "SELECT pulse, record_number FROM raw_records
             ORDER BY pulse DESC, record_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_err)?;

        Ok(row.map(|r| {
            Position::new(
                r.get::<i64, _>("pulse") as u32,
                r.get::<i64, _>("record_number") as u32,
            )
        }))
    }

    async fn last_pulse(&self) -> Result<Option<PulseInfo>, IndexerError> {
        let row = sqlx::query(
            "SELECT pulse, entropy, timestamp FROM pulses ORDER BY pulse DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_err)?;

        Ok(row.map(|r| PulseInfo {
            number: r.get::<i64, _>("pulse") as u32,
            entropy: r.get("entropy"),
            timestamp: r.get("timestamp"),
        }))
    }
}

/// One open SQLite transaction.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StorageTx for SqliteTx {
    async fn insert_raw_records(&mut self, records: &[ExportedRecord]) -> Result<(), IndexerError> {
        for r in records {
            let body = serde_json::to_string(&r.record.body)
                .map_err(|e| IndexerError::Codec(e.to_string()))?;
            sqlx::query(
                "INSERT INTO raw_records (pulse, record_number, record_id, body)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (pulse, record_number) DO NOTHING",
            )
            .bind(r.record.pulse() as i64)
            .bind(r.record_number as i64)
            .bind(r.record.id.to_string())
            .bind(body)
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        debug!(count = records.len(), "raw records written");
        Ok(())
    }

    async fn insert_pulses(&mut self, pulses: &[PulseInfo]) -> Result<(), IndexerError> {
        for p in pulses {
            sqlx::query(
                "INSERT INTO pulses (pulse, entropy, timestamp) VALUES (?, ?, ?)
                 ON CONFLICT (pulse) DO NOTHING",
            )
            .bind(p.number as i64)
            .bind(&p.entropy)
            .bind(p.timestamp)
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn insert_members(&mut self, members: &[Member]) -> Result<(), IndexerError> {
        for m in members {
            sqlx::query(
                "INSERT INTO members
                    (member_ref, balance, migration_address, account_state, status, pulse)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (member_ref) DO NOTHING",
            )
            .bind(m.member_ref.to_string())
            .bind(&m.balance)
            .bind(&m.migration_address)
            .bind(m.account_state.to_string())
            .bind(m.status.as_str())
            .bind(m.pulse as i64)
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn update_balances(&mut self, updates: &[BalanceUpdate]) -> Result<(), IndexerError> {
        for u in updates {
            let done = sqlx::query(
                "UPDATE members SET account_state = ?, balance = COALESCE(?, balance)
                 WHERE account_state = ?",
            )
            .bind(u.new_state.to_string())
            .bind(&u.balance)
            .bind(u.prev_state.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
            if done.rows_affected() != 1 {
                return Err(IndexerError::row_count("members", u.prev_state, done.rows_affected()));
            }
        }
        Ok(())
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), IndexerError> {
        for t in transfers {
            sqlx::query(
                "INSERT INTO transfers
                    (tx_id, amount, fee, from_member, to_member, pulse, timestamp, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tx_id) DO NOTHING",
            )
            .bind(t.tx_id.to_string())
            .bind(&t.amount)
            .bind(&t.fee)
            .bind(t.from_member.to_string())
            .bind(t.to_member.to_string())
            .bind(t.pulse as i64)
            .bind(t.timestamp)
            .bind(t.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn insert_deposits(&mut self, deposits: &[Deposit]) -> Result<(), IndexerError> {
        for d in deposits {
            sqlx::query(
                "INSERT INTO deposits
                    (eth_hash, member_ref, amount, balance, hold_release_date, transfer_date, deposit_state)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (eth_hash) DO NOTHING",
            )
            .bind(&d.eth_hash)
            .bind(d.member_ref.to_string())
            .bind(&d.amount)
            .bind(&d.balance)
            .bind(d.hold_release_date)
            .bind(d.transfer_date)
            .bind(d.deposit_state.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn update_deposits(&mut self, updates: &[DepositUpdate]) -> Result<(), IndexerError> {
        for u in updates {
            let done = sqlx::query(
                "UPDATE deposits SET
                    deposit_state     = ?,
                    amount            = COALESCE(?, amount),
                    balance           = COALESCE(?, balance),
                    hold_release_date = COALESCE(?, hold_release_date)
                 WHERE deposit_state = ?",
            )
            .bind(u.new_state.to_string())
            .bind(&u.amount)
            .bind(&u.balance)
            .bind(u.hold_release_date)
            .bind(u.prev_state.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
            if done.rows_affected() != 1 {
                return Err(IndexerError::row_count("deposits", u.prev_state, done.rows_affected()));
            }
        }
        Ok(())
    }

    async fn insert_migration_addresses(
        &mut self,
        addresses: &[MigrationAddress],
    ) -> Result<(), IndexerError> {
        for a in addresses {
            sqlx::query(
                "INSERT INTO migration_addresses (addr, timestamp, wasted) VALUES (?, ?, ?)
                 ON CONFLICT (addr) DO NOTHING",
            )
            .bind(&a.address)
            .bind(a.timestamp)
            .bind(a.wasted)
            .execute(&mut *self.tx)
            .await
            .map_err(sql_err)?;
        }
        Ok(())
    }

    async fn waste_migration_addresses(
        &mut self,
        addresses: &[WasteMigrationAddress],
    ) -> Result<(), IndexerError> {
        for a in addresses {
            let done = sqlx::query("UPDATE migration_addresses SET wasted = 1 WHERE addr = ?")
                .bind(&a.address)
                .execute(&mut *self.tx)
                .await
                .map_err(sql_err)?;
            if done.rows_affected() != 1 {
                return Err(IndexerError::row_count(
                    "migration_addresses",
                    &a.address,
                    done.rows_affected(),
                ));
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.commit().await.map_err(sql_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        self.tx.rollback().await.map_err(sql_err)
    }
}
