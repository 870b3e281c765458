//! Table-storage backends for persisting per-user token caches.
//!
//! Provides an in-memory table for testing and a SQLite-backed table for
//! production, both behind [`TokenRecordStore`].

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTableStore;
pub use sqlite::SqliteTableStore;

use std::sync::Arc;
use tablecache_config::StorageConfig;
use tablecache_types::{TokenRecordStore, traits::Result};

/// Opens the backend named by `config.connection_string` and provisions its
/// table.
///
/// `memory` (or `memory:`) selects [`InMemoryTableStore`]; anything else is
/// handed to sqlx as a SQLite URL.
///
/// # Errors
///
/// Returns [`tablecache_types::CacheError::Config`] for an invalid config and
/// storage errors if the table cannot be provisioned.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn TokenRecordStore>> {
    config.validate()?;
    let conn = config.connection_string.trim();
    if conn == "memory" || conn == "memory:" {
        tracing::debug!("using in-memory token table");
        return Ok(Arc::new(InMemoryTableStore::new()));
    }
    let store = SqliteTableStore::new(conn, &config.table_name).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablecache_types::CacheError;

    #[tokio::test]
    async fn test_open_memory_store() {
        let cfg = StorageConfig {
            connection_string: "memory".into(),
            ..StorageConfig::default()
        };
        let store = open_store(&cfg).await.unwrap();
        assert!(store.fetch_all("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_sqlite_store() {
        let cfg = StorageConfig {
            connection_string: "sqlite::memory:".into(),
            ..StorageConfig::default()
        };
        let store = open_store(&cfg).await.unwrap();
        assert!(store.fetch_all("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_rejects_empty_connection_string() {
        let cfg = StorageConfig {
            connection_string: String::new(),
            ..StorageConfig::default()
        };
        let err = open_store(&cfg).await.err().unwrap();
        assert!(matches!(err, CacheError::Config(_)));
    }
}
