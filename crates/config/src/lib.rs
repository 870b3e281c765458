//! Configuration loading for the tablecache adapter.
//!
//! Uses figment to layer defaults, an optional YAML file and `TABLECACHE_`
//! environment variables into one [`Config`]. The adapter receives the
//! resulting struct explicitly; nothing reads process configuration later.

pub mod schema;

pub use schema::{
    Config, DEFAULT_TABLE_NAME, LogConfig, ProtectionConfig, StorageConfig, validate_table_name,
};
