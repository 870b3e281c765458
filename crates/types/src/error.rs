//! Unified error type for the tablecache workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across tablecache crates.
///
/// None of these are recovered locally; they propagate to the identity
/// library or the calling web framework.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The storage backend is unreachable or the transport failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A query returned rows of an unexpected shape.
    #[error("storage query error: {0}")]
    StorageQuery(String),

    /// An upsert or delete was rejected, or the target row was missing.
    #[error("storage write error: {0}")]
    StorageWrite(String),

    /// Stored ciphertext could not be unprotected (corrupted or re-keyed).
    #[error("decryption failure: {0}")]
    Decryption(String),

    /// Plaintext could not be protected.
    #[error("encryption failure: {0}")]
    Encryption(String),

    /// Identity-cache state could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated sqlx classifiers ────────────────────────────────────────────

/// `SQLite` result codes meaning the database cannot be reached at all:
/// BUSY, LOCKED, IOERR and CANTOPEN. Extended codes carry the primary code in
/// the low byte.
#[cfg(feature = "sqlx")]
fn is_unavailable_code(code: i32) -> bool {
    matches!(code & 0xff, 5 | 6 | 10 | 14)
}

#[cfg(feature = "sqlx")]
impl CacheError {
    /// Returns `true` if the sqlx error is a transport or pool failure, or a
    /// database error saying the backend itself cannot be used.
    fn is_transport(e: &sqlx::Error) -> bool {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(is_unavailable_code),
            _ => false,
        }
    }

    /// Classifies an error raised while reading rows.
    #[must_use]
    pub fn from_sqlx_read(e: sqlx::Error) -> Self {
        if Self::is_transport(&e) {
            Self::StorageUnavailable(e.to_string())
        } else {
            Self::StorageQuery(e.to_string())
        }
    }

    /// Classifies an error raised while writing or deleting rows.
    #[must_use]
    pub fn from_sqlx_write(e: sqlx::Error) -> Self {
        if Self::is_transport(&e) {
            Self::StorageUnavailable(e.to_string())
        } else {
            Self::StorageWrite(e.to_string())
        }
    }
}
