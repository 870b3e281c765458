//! The stored row shape: one encrypted cache blob per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition value shared by every user's row.
pub const PARTITION_KEY: &str = "usertoken";

/// A single user's persisted token cache.
///
/// Keyed by [`PARTITION_KEY`] and the user id as row key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub partition_key: String,
    pub row_key: String,
    pub user_token_cache_id: String,
    /// Protected serialized identity-cache state.
    pub cache_bits: Vec<u8>,
    pub last_write: DateTime<Utc>,
}

impl TokenRecord {
    /// Builds a record for `user_id`, truncating `last_write` to milliseconds
    /// so the value survives a storage round-trip unchanged.
    pub fn new(
        user_id: impl Into<String>,
        cache_bits: Vec<u8>,
        last_write: DateTime<Utc>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            partition_key: PARTITION_KEY.to_string(),
            row_key: user_id.clone(),
            user_token_cache_id: user_id,
            cache_bits,
            last_write: truncate_millis(last_write),
        }
    }

    /// The user this record belongs to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.row_key
    }

    /// `last_write` as unix milliseconds, the storage representation.
    #[must_use]
    pub fn last_write_millis(&self) -> i64 {
        self.last_write.timestamp_millis()
    }

    /// Returns `true` if this record was written strictly after `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &TokenRecord) -> bool {
        self.last_write > other.last_write
    }
}

/// Drops sub-millisecond precision.
#[must_use]
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Picks the record with the greatest `last_write`; ties go to the first one.
#[must_use]
pub fn latest(records: Vec<TokenRecord>) -> Option<TokenRecord> {
    records.into_iter().fold(None, |best, r| match best {
        Some(b) if !r.is_newer_than(&b) => Some(b),
        _ => Some(r),
    })
}
