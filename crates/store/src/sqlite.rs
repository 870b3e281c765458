//! SQLite-backed token-cache table using sqlx.
//!
//! Schema: `<table>(partition_key, row_key, user_token_cache_id, cache_bits,
//! last_write)` with composite primary key `(partition_key, row_key)`.
//! `last_write` is stored as unix milliseconds.

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use tablecache_config::validate_table_name;
use tablecache_types::{CacheError, PARTITION_KEY, TokenRecord, TokenRecordStore, traits::Result};

type Row = (String, String, String, Vec<u8>, i64);

/// A persistent [`TokenRecordStore`] backed by `SQLite`.
pub struct SqliteTableStore {
    /// Connection pool to the `SQLite` database.
    pool: SqlitePool,
    table: String,
}

impl SqliteTableStore {
    /// Connects to a `SQLite` database (e.g. `"sqlite:./tokens.db"` or
    /// `"sqlite::memory:"`) and provisions `table`.
    ///
    /// Creates the database file if it does not exist. In-memory databases
    /// get a single long-lived connection so every query sees the same data.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for an invalid table name or URL, and
    /// storage errors if the connection or table creation fails.
    pub async fn new(database_url: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CacheError::Config(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true);

        let mut pool_opts = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") || database_url.contains("mode=memory") {
            pool_opts = pool_opts
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(CacheError::from_sqlx_read)?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_table().await?;
        Ok(store)
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

fn into_record(row: Row) -> Result<TokenRecord> {
    let (partition_key, row_key, user_token_cache_id, cache_bits, millis) = row;
    let last_write = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        CacheError::StorageQuery(format!(
            "row '{row_key}' has out-of-range last_write: {millis}"
        ))
    })?;
    Ok(TokenRecord {
        partition_key,
        row_key,
        user_token_cache_id,
        cache_bits,
        last_write,
    })
}

#[async_trait]
impl TokenRecordStore for SqliteTableStore {
    async fn ensure_table(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                partition_key        TEXT    NOT NULL,
                row_key              TEXT    NOT NULL,
                user_token_cache_id  TEXT    NOT NULL,
                cache_bits           BLOB    NOT NULL,
                last_write           INTEGER NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            )",
            self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from_sqlx_write)?;
        tracing::debug!(table = %self.table, "token cache table ready");
        Ok(())
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<TokenRecord>> {
        tracing::debug!(user_id, "fetching token cache rows");
        let sql = format!(
            "SELECT partition_key, row_key, user_token_cache_id, cache_bits, last_write
             FROM {} WHERE partition_key = ? AND row_key = ?",
            self.table
        );
        let rows: Vec<Row> = sqlx::query_as(&sql)
            .bind(PARTITION_KEY)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(CacheError::from_sqlx_read)?;

        rows.into_iter().map(into_record).collect()
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<()> {
        tracing::debug!(user_id = %record.row_key, "upserting token cache row");
        let sql = format!(
            "INSERT INTO {} (partition_key, row_key, user_token_cache_id, cache_bits, last_write)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(partition_key, row_key) DO UPDATE SET
                 user_token_cache_id = excluded.user_token_cache_id,
                 cache_bits = excluded.cache_bits,
                 last_write = excluded.last_write",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.partition_key)
            .bind(&record.row_key)
            .bind(&record.user_token_cache_id)
            .bind(&record.cache_bits)
            .bind(record.last_write_millis())
            .execute(&self.pool)
            .await
            .map_err(CacheError::from_sqlx_write)?;
        Ok(())
    }

    async fn delete(&self, record: &TokenRecord) -> Result<()> {
        tracing::debug!(user_id = %record.row_key, "deleting token cache row");
        let sql = format!(
            "DELETE FROM {} WHERE partition_key = ? AND row_key = ?",
            self.table
        );
        let done = sqlx::query(&sql)
            .bind(&record.partition_key)
            .bind(&record.row_key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::from_sqlx_write)?;

        if done.rows_affected() == 0 {
            return Err(CacheError::StorageWrite(format!(
                "no row for user '{}' to delete",
                record.row_key
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn mem() -> SqliteTableStore {
        SqliteTableStore::new("sqlite::memory:", "usertokencaches")
            .await
            .unwrap()
    }

    fn record(user: &str, bits: &[u8], ms: i64) -> TokenRecord {
        TokenRecord::new(user, bits.to_vec(), Utc.timestamp_millis_opt(ms).unwrap())
    }

    #[tokio::test]
    async fn test_upsert_and_fetch() {
        let s = mem().await;
        let r = record("alice", &[0, 159, 146, 150], 1_700_000_000_123);
        s.upsert(&r).await.unwrap();
        let rows = s.fetch_all("alice").await.unwrap();
        assert_eq!(rows, vec![r]);
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let s = mem().await;
        assert!(s.fetch_all("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_replaces() {
        let s = mem().await;
        s.upsert(&record("alice", b"first", 1)).await.unwrap();
        s.upsert(&record("alice", b"second", 2)).await.unwrap();
        s.upsert(&record("alice", b"second", 2)).await.unwrap();
        let rows = s.fetch_all("alice").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cache_bits, b"second");
        assert_eq!(rows[0].last_write_millis(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let s = mem().await;
        let r = record("alice", b"a", 1);
        s.upsert(&r).await.unwrap();
        s.delete(&r).await.unwrap();
        assert!(s.fetch_all("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_fails() {
        let s = mem().await;
        let err = s.delete(&record("alice", b"a", 1)).await.unwrap_err();
        assert!(matches!(err, CacheError::StorageWrite(_)));
    }

    #[tokio::test]
    async fn test_ensure_table_idempotent() {
        let s = mem().await;
        s.upsert(&record("alice", b"a", 1)).await.unwrap();
        s.ensure_table().await.unwrap();
        assert_eq!(s.fetch_all("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_table_name() {
        let s = SqliteTableStore::new("sqlite::memory:", "webtokens")
            .await
            .unwrap();
        assert_eq!(s.table(), "webtokens");
        s.upsert(&record("bob", b"b", 5)).await.unwrap();
        assert_eq!(s.fetch_all("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_table_name_rejected() {
        let err = SqliteTableStore::new("sqlite::memory:", "x; DROP TABLE y")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_unopenable_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("sub").join("tokens.db");
        let url = format!("sqlite://{}", path.display());
        let err = SqliteTableStore::new(&url, "usertokencaches")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::StorageUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_missing_table_classified() {
        let s = mem().await;
        sqlx::query("DROP TABLE usertokencaches")
            .execute(&s.pool)
            .await
            .unwrap();
        let read = s.fetch_all("alice").await.unwrap_err();
        assert!(matches!(read, CacheError::StorageQuery(_)));
        let write = s.upsert(&record("alice", b"a", 1)).await.unwrap_err();
        assert!(matches!(write, CacheError::StorageWrite(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_timestamp() {
        let s = mem().await;
        sqlx::query(
            "INSERT INTO usertokencaches VALUES ('usertoken', 'eve', 'eve', x'00', ?)",
        )
        .bind(i64::MAX)
        .execute(&s.pool)
        .await
        .unwrap();
        let err = s.fetch_all("eve").await.unwrap_err();
        assert!(matches!(err, CacheError::StorageQuery(_)));
    }
}
