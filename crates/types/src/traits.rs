//! Traits shared across all tablecache crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `tablecache-types`, not on each other.

use crate::{CacheError, TokenRecord};
use async_trait::async_trait;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Data access over the user token-cache table.
///
/// Each call is a single round trip: no retries, no batching.
#[async_trait]
pub trait TokenRecordStore: Send + Sync {
    /// Create the backing table if it does not exist.
    async fn ensure_table(&self) -> Result<()>;

    /// All records under the fixed partition whose row key is `user_id`.
    ///
    /// # Errors
    ///
    /// [`CacheError::StorageUnavailable`] on transport failure,
    /// [`CacheError::StorageQuery`] on malformed rows.
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<TokenRecord>>;

    /// Insert the record, or fully replace the row with the same keys.
    ///
    /// # Errors
    ///
    /// [`CacheError::StorageWrite`] if the backend rejects the write.
    async fn upsert(&self, record: &TokenRecord) -> Result<()>;

    /// Delete the row identified by the record's partition and row key.
    ///
    /// # Errors
    ///
    /// [`CacheError::StorageWrite`] if the row does not exist.
    async fn delete(&self, record: &TokenRecord) -> Result<()>;
}

/// Purpose-scoped symmetric protection of data at rest.
pub trait DataProtector: Send + Sync {
    /// Encrypt `plaintext` under `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encryption`] if the cipher fails.
    fn protect(&self, plaintext: &[u8], purpose: &str) -> Result<Vec<u8>>;

    /// Decrypt data produced by [`DataProtector::protect`] with the same purpose.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Decryption`] if the purpose or key differs, or the
    /// data is corrupted.
    fn unprotect(&self, ciphertext: &[u8], purpose: &str) -> Result<Vec<u8>>;
}

/// The identity library's side of the cache contract.
///
/// The library owns the state and the "changed" flag; the adapter only moves
/// bytes in and out.
pub trait TokenCacheState: Send {
    /// Serialize the whole cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the state cannot be encoded.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Replace the cache content. `None` or an empty slice yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if the bytes cannot be decoded.
    fn deserialize(&mut self, bytes: Option<&[u8]>) -> Result<()>;

    /// Whether the state changed since the flag was last reset.
    fn has_state_changed(&self) -> bool;

    fn set_state_changed(&mut self, changed: bool);

    /// The library's own in-memory clear.
    fn clear(&mut self);
}

/// Context the identity library passes with each access notification.
///
/// Only recorded as log fields on the hook events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessArgs {
    pub client_id: Option<String>,
    pub resource: Option<String>,
    pub unique_id: Option<String>,
    pub displayable_id: Option<String>,
}

impl AccessArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the signed-in account's unique and displayable ids.
    #[must_use]
    pub fn with_user(
        mut self,
        unique_id: impl Into<String>,
        displayable_id: impl Into<String>,
    ) -> Self {
        self.unique_id = Some(unique_id.into());
        self.displayable_id = Some(displayable_id.into());
        self
    }
}

/// Hook points an identity library calls around its cache critical section.
#[async_trait]
pub trait TokenCacheHooks: Send {
    /// Called right before the library reads cache content.
    async fn before_access(&mut self, args: &AccessArgs) -> Result<()>;

    /// Called right after the library's read/write critical section.
    async fn after_access(&mut self, args: &AccessArgs) -> Result<()>;

    /// Clears the in-memory cache and every stored record for the user.
    async fn clear(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_args_builders() {
        let args = AccessArgs::new()
            .with_client_id("app-1")
            .with_user("oid-42", "alice@contoso.example");
        assert_eq!(args.client_id.as_deref(), Some("app-1"));
        assert_eq!(args.unique_id.as_deref(), Some("oid-42"));
        assert_eq!(args.displayable_id.as_deref(), Some("alice@contoso.example"));
        assert!(args.resource.is_none());
    }
}
