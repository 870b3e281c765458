//! Core types and traits for the tablecache workspace.
//!
//! This crate defines the shared abstractions used across every layer of the
//! token-cache persistence adapter: the error type, the stored row shape, the
//! token representation held by identity caches, and the async traits that
//! the storage, protection and cache layers implement.

pub mod error;
pub mod record;
pub mod token;
pub mod traits;

pub use error::CacheError;
pub use record::{PARTITION_KEY, TokenRecord, latest, truncate_millis};
pub use token::{OAuthToken, TokenState};
pub use traits::{
    AccessArgs, DataProtector, Result, TokenCacheHooks, TokenCacheState, TokenRecordStore,
};
