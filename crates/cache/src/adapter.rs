//! Binds an identity cache to the token-cache table.
//!
//! Responsibilities:
//! - Before access: pull the freshest stored row for the user and load it
//!   into the identity cache (last write wins by `last_write`).
//! - After access: persist the cache only when the identity library reports a
//!   change.
//! - Clear: wipe the in-memory cache, then every stored row for the user.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tablecache_config::Config;
use tablecache_protect::AesGcmProtector;
use tablecache_store::open_store;
use tablecache_types::{
    AccessArgs, DataProtector, TokenCacheHooks, TokenCacheState, TokenRecord, TokenRecordStore,
    latest, traits::Result, truncate_millis,
};

/// Purpose string every cache blob is protected under.
pub const CACHE_PURPOSE: &str = "TableTokenCache";

/// Per-user persistence adapter around an identity cache `C`.
///
/// Meant to be created per request or session. Hooks take `&mut self`; share
/// an instance across tasks only behind a `tokio::sync::Mutex`.
pub struct TableTokenCache<C> {
    user_id: String,
    state: C,
    store: Arc<dyn TokenRecordStore>,
    protector: Arc<dyn DataProtector>,
    /// Last row this instance loaded or wrote.
    snapshot: Option<TokenRecord>,
}

impl<C: TokenCacheState> TableTokenCache<C> {
    pub fn new(
        user_id: impl Into<String>,
        state: C,
        store: Arc<dyn TokenRecordStore>,
        protector: Arc<dyn DataProtector>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            state,
            store,
            protector,
            snapshot: None,
        }
    }

    /// Opens the configured store and protector for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`tablecache_types::CacheError::Config`] for invalid settings
    /// or a missing master key, and storage errors from provisioning.
    pub async fn from_config(
        user_id: impl Into<String>,
        state: C,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        let protector = Arc::new(AesGcmProtector::from_config(&config.protection)?);
        let store = open_store(&config.storage).await?;
        Ok(Self::new(user_id, state, store, protector))
    }

    /// Runs `f` as the identity library's critical section, wrapped in the
    /// before/after hooks.
    ///
    /// # Errors
    ///
    /// Propagates any hook failure. If `after_access` fails, `f` has already
    /// run against the in-memory state.
    pub async fn access<R, F>(&mut self, args: &AccessArgs, f: F) -> Result<R>
    where
        F: FnOnce(&mut C) -> R + Send,
    {
        self.before_access(args).await?;
        let out = f(&mut self.state);
        self.after_access(args).await?;
        Ok(out)
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn state(&self) -> &C {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut C {
        &mut self.state
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&TokenRecord> {
        self.snapshot.as_ref()
    }

    pub fn into_inner(self) -> C {
        self.state
    }

    /// Write stamp for the next row: now, but never behind the previous one.
    fn next_write_time(&self) -> DateTime<Utc> {
        let now = truncate_millis(Utc::now());
        match &self.snapshot {
            Some(prev) if prev.last_write > now => prev.last_write,
            _ => now,
        }
    }
}

#[async_trait]
impl<C: TokenCacheState> TokenCacheHooks for TableTokenCache<C> {
    async fn before_access(&mut self, args: &AccessArgs) -> Result<()> {
        let fetched = latest(self.store.fetch_all(&self.user_id).await?);

        let replace = match (&self.snapshot, &fetched) {
            (None, _) => true,
            (Some(current), Some(candidate)) => candidate.is_newer_than(current),
            (Some(_), None) => false,
        };
        if replace && fetched.is_some() {
            tracing::debug!(
                user_id = %self.user_id,
                client_id = ?args.client_id,
                resource = ?args.resource,
                unique_id = ?args.unique_id,
                displayable_id = ?args.displayable_id,
                "loaded newer token cache from storage"
            );
        }
        if replace {
            self.snapshot = fetched;
        }

        let plaintext = match &self.snapshot {
            Some(record) => Some(self.protector.unprotect(&record.cache_bits, CACHE_PURPOSE)?),
            None => None,
        };
        self.state.deserialize(plaintext.as_deref())
    }

    async fn after_access(&mut self, args: &AccessArgs) -> Result<()> {
        if !self.state.has_state_changed() {
            return Ok(());
        }

        let bits = self
            .protector
            .protect(&self.state.serialize()?, CACHE_PURPOSE)?;
        let record = TokenRecord::new(self.user_id.clone(), bits, self.next_write_time());
        self.store.upsert(&record).await?;
        tracing::debug!(
            user_id = %self.user_id,
            client_id = ?args.client_id,
            unique_id = ?args.unique_id,
            displayable_id = ?args.displayable_id,
            last_write = %record.last_write,
            "persisted token cache"
        );

        self.snapshot = Some(record);
        self.state.set_state_changed(false);
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        self.state.clear();
        self.snapshot = None;

        let records = self.store.fetch_all(&self.user_id).await?;
        for (done, record) in records.iter().enumerate() {
            if let Err(e) = self.store.delete(record).await {
                tracing::warn!(
                    user_id = %self.user_id,
                    deleted = done,
                    remaining = records.len() - done,
                    error = %e,
                    "token cache clear stopped"
                );
                return Err(e);
            }
        }

        // Storage already matches the emptied cache.
        self.state.set_state_changed(false);
        tracing::info!(user_id = %self.user_id, rows = records.len(), "token cache cleared");
        Ok(())
    }
}
