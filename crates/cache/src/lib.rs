//! Token-cache persistence adapter for identity libraries.
//!
//! [`TableTokenCache`] implements [`tablecache_types::TokenCacheHooks`] for any
//! [`tablecache_types::TokenCacheState`], loading and saving the cache as one
//! protected row per user. [`InMemoryTokenCache`] is a ready-made cache state
//! for callers without their own.

pub mod adapter;
pub mod token_cache;

pub use adapter::{CACHE_PURPOSE, TableTokenCache};
pub use token_cache::{InMemoryTokenCache, cache_key};
