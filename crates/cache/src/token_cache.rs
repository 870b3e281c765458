//! A minimal identity-library cache: token entries keyed by cache key.
//!
//! Stands in for the library-owned cache object that [`crate::TableTokenCache`]
//! persists. It tracks its own "changed" flag the way an identity library
//! would, and serializes to versioned JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tablecache_types::{CacheError, OAuthToken, TokenCacheState, traits::Result};

const WIRE_VERSION: u32 = 1;

#[derive(Serialize)]
struct WireRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, OAuthToken>,
}

#[derive(Deserialize)]
struct Wire {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, OAuthToken>,
}

/// Builds the key an entry is stored under.
#[must_use]
pub fn cache_key(authority: &str, resource: &str, client_id: &str) -> String {
    format!("{authority}|{resource}|{client_id}")
}

#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: BTreeMap<String, OAuthToken>,
    changed: bool,
}

impl InMemoryTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a token and marks the cache changed.
    pub fn insert(&mut self, key: impl Into<String>, token: OAuthToken) {
        self.entries.insert(key.into(), token);
        self.changed = true;
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OAuthToken> {
        self.entries.get(key)
    }

    /// Removes a token; only an actual removal marks the cache changed.
    pub fn remove(&mut self, key: &str) -> Option<OAuthToken> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OAuthToken)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenCacheState for InMemoryTokenCache {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&WireRef {
            version: WIRE_VERSION,
            entries: &self.entries,
        })?)
    }

    fn deserialize(&mut self, bytes: Option<&[u8]>) -> Result<()> {
        let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
            self.entries.clear();
            return Ok(());
        };
        let wire: Wire = serde_json::from_slice(bytes)?;
        if wire.version != WIRE_VERSION {
            return Err(CacheError::Serialization(serde::de::Error::custom(
                format!("unsupported token cache version {}", wire.version),
            )));
        }
        self.entries = wire.entries;
        Ok(())
    }

    fn has_state_changed(&self) -> bool {
        self.changed
    }

    fn set_state_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_marks_changed() {
        let mut c = InMemoryTokenCache::new();
        assert!(!c.has_state_changed());
        c.insert("k", OAuthToken::new("tok"));
        assert!(c.has_state_changed());
        assert_eq!(c.get("k").unwrap().access_token, "tok");
    }

    #[test]
    fn test_remove_missing_keeps_flag() {
        let mut c = InMemoryTokenCache::new();
        assert!(c.remove("nope").is_none());
        assert!(!c.has_state_changed());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut c = InMemoryTokenCache::new();
        let key = cache_key("https://login.example.com/common", "https://graph", "app-1");
        c.insert(&key, OAuthToken::new("access").with_refresh("refresh"));
        let bytes = c.serialize().unwrap();

        let mut restored = InMemoryTokenCache::new();
        restored.deserialize(Some(&bytes)).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(
            restored.get(&key).unwrap().refresh_token.as_deref(),
            Some("refresh")
        );
        assert!(!restored.has_state_changed());
    }

    #[test]
    fn test_deserialize_absent_or_empty_yields_empty() {
        let mut c = InMemoryTokenCache::new();
        c.insert("k", OAuthToken::new("tok"));
        c.deserialize(None).unwrap();
        assert!(c.is_empty());

        c.insert("k", OAuthToken::new("tok"));
        c.deserialize(Some(&[])).unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        let mut c = InMemoryTokenCache::new();
        let err = c.deserialize(Some(b"not json")).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_deserialize_unknown_version_fails() {
        let mut c = InMemoryTokenCache::new();
        let err = c.deserialize(Some(br#"{"version":99}"#)).unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_clear_marks_changed() {
        let mut c = InMemoryTokenCache::new();
        c.insert("k", OAuthToken::new("tok"));
        c.set_state_changed(false);
        c.clear();
        assert!(c.is_empty());
        assert!(c.has_state_changed());
    }

    #[test]
    fn test_keys_sorted() {
        let mut c = InMemoryTokenCache::new();
        c.insert("b", OAuthToken::new("2"));
        c.insert("a", OAuthToken::new("1"));
        assert_eq!(c.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
