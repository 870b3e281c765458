//! In-memory table backed by a `HashMap` behind a `Mutex`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tablecache_types::{CacheError, PARTITION_KEY, TokenRecord, TokenRecordStore, traits::Result};

type RowKey = (String, String);

/// An in-memory [`TokenRecordStore`] for testing and ephemeral use.
pub struct InMemoryTableStore {
    /// Rows keyed by `(partition_key, row_key)`.
    rows: Mutex<HashMap<RowKey, TokenRecord>>,
}

impl InMemoryTableStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of rows across all partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |rows| rows.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RowKey, TokenRecord>>> {
        self.rows
            .lock()
            .map_err(|e| CacheError::StorageUnavailable(format!("table lock poisoned: {e}")))
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(record: &TokenRecord) -> RowKey {
    (record.partition_key.clone(), record.row_key.clone())
}

#[async_trait]
impl TokenRecordStore for InMemoryTableStore {
    async fn ensure_table(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_all(&self, user_id: &str) -> Result<Vec<TokenRecord>> {
        let key = (PARTITION_KEY.to_string(), user_id.to_string());
        Ok(self.lock()?.get(&key).cloned().into_iter().collect())
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<()> {
        self.lock()?.insert(key_of(record), record.clone());
        Ok(())
    }

    async fn delete(&self, record: &TokenRecord) -> Result<()> {
        match self.lock()?.remove(&key_of(record)) {
            Some(_) => Ok(()),
            None => Err(CacheError::StorageWrite(format!(
                "no row for user '{}' to delete",
                record.row_key
            ))),
        }
    }
}
