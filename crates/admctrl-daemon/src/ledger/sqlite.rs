//! SQLite-backed ledger store.
//!
//! All tables live in one `ledger_rows` relation keyed by `(tbl, key)`, with
//! `seq` keeping duplicates in insertion order. The database runs in WAL mode,
//! so `authd` and `authdb` can hold the same file open; writers queue on
//! SQLite's lock for up to [`BUSY_TIMEOUT`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteExecutor, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};

use super::store::{StoreTxn, Table, TransactionalStore};
use super::LedgerError;

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS ledger_meta (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        revision INTEGER NOT NULL
    )",
    "INSERT OR IGNORE INTO ledger_meta (id, revision) VALUES (0, 0)",
    "CREATE TABLE IF NOT EXISTS ledger_rows (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        tbl TEXT NOT NULL,
        key BLOB NOT NULL,
        value BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ledger_rows_key ON ledger_rows (tbl, key, seq)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the ledger database at `path`.
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self::init(pool).await?;
        tracing::debug!("ledger database opened");
        Ok(store)
    }

    /// Private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection would get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, LedgerError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Number of transactions committed against this database.
    pub async fn revision(&self) -> Result<i64, LedgerError> {
        let rev = sqlx::query_scalar::<_, i64>("SELECT revision FROM ledger_meta WHERE id = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(rev)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn get_row<'e, E: SqliteExecutor<'e>>(
    ex: E,
    table: Table,
    key: &[u8],
) -> Result<Option<Vec<u8>>, LedgerError> {
    let row = sqlx::query_scalar::<_, Vec<u8>>(
        "SELECT value FROM ledger_rows WHERE tbl = ? AND key = ? ORDER BY seq LIMIT 1",
    )
    .bind(table.as_str())
    .bind(key)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

async fn dup_rows<'e, E: SqliteExecutor<'e>>(
    ex: E,
    table: Table,
    key: &[u8],
) -> Result<Vec<Vec<u8>>, LedgerError> {
    let rows = sqlx::query_scalar::<_, Vec<u8>>(
        "SELECT value FROM ledger_rows WHERE tbl = ? AND key = ? ORDER BY seq",
    )
    .bind(table.as_str())
    .bind(key)
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

async fn scan_rows<'e, E: SqliteExecutor<'e>>(
    ex: E,
    table: Table,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError> {
    let rows = sqlx::query_as::<_, (Vec<u8>, Vec<u8>)>(
        "SELECT key, value FROM ledger_rows WHERE tbl = ? ORDER BY key, seq",
    )
    .bind(table.as_str())
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

#[async_trait]
impl TransactionalStore for SqliteStore {
    type Txn = SqliteTxn;

    async fn begin(&self) -> Result<SqliteTxn, LedgerError> {
        let mut tx = self.pool.begin().await?;
        // First statement writes, so the lock is taken before any read.
        sqlx::query("UPDATE ledger_meta SET revision = revision + 1 WHERE id = 0")
            .execute(&mut *tx)
            .await?;
        Ok(SqliteTxn { tx: Some(tx) })
    }

    async fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        get_row(&self.pool, table, key).await
    }

    async fn duplicates(&self, table: Table, key: &[u8]) -> Result<Vec<Vec<u8>>, LedgerError> {
        dup_rows(&self.pool, table, key).await
    }

    async fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError> {
        scan_rows(&self.pool, table).await
    }
}

pub struct SqliteTxn {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTxn {
    fn conn(&mut self) -> Result<&mut SqliteConnection, LedgerError> {
        self.tx.as_deref_mut().ok_or(LedgerError::NoTxn)
    }
}

#[async_trait]
impl StoreTxn for SqliteTxn {
    async fn get(&mut self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        get_row(self.conn()?, table, key).await
    }

    async fn duplicates(&mut self, table: Table, key: &[u8]) -> Result<Vec<Vec<u8>>, LedgerError> {
        dup_rows(self.conn()?, table, key).await
    }

    async fn scan(&mut self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError> {
        scan_rows(self.conn()?, table).await
    }

    async fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), LedgerError> {
        self.delete(table, key).await?;
        self.put_dup(table, key, value).await
    }

    async fn put_dup(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO ledger_rows (tbl, key, value) VALUES (?, ?, ?)")
            .bind(table.as_str())
            .bind(key)
            .bind(value)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete(&mut self, table: Table, key: &[u8]) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM ledger_rows WHERE tbl = ? AND key = ?")
            .bind(table.as_str())
            .bind(key)
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(mut self) -> Result<(), LedgerError> {
        let tx = self.tx.take().ok_or(LedgerError::NoTxn)?;
        tx.commit().await?;
        Ok(())
    }
}

impl Drop for SqliteTxn {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!("ledger transaction rolled back");
        }
    }
}
