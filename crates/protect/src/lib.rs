//! Purpose-bound protection of token-cache blobs at rest.
//!
//! A single master key is expanded with HKDF-SHA256 into one AES-256-GCM key
//! per purpose string. Blobs protected under one purpose cannot be
//! unprotected under another, even with the same master key.
//!
//! Blob layout: `version (1) || nonce (12) || ciphertext+tag`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::Engine as _;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use tablecache_config::ProtectionConfig;
use tablecache_types::{CacheError, DataProtector, traits::Result};

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const INFO_PREFIX: &str = "tablecache:";

/// AES-256-GCM [`DataProtector`] with HKDF-derived per-purpose keys.
pub struct AesGcmProtector {
    master_key: [u8; KEY_LEN],
}

impl AesGcmProtector {
    /// Builds a protector from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] unless the key is exactly 32 bytes.
    pub fn new(master_key: &[u8]) -> Result<Self> {
        let master_key: [u8; KEY_LEN] = master_key.try_into().map_err(|_| {
            CacheError::Config(format!(
                "master key must be {KEY_LEN} bytes, got {}",
                master_key.len()
            ))
        })?;
        Ok(Self { master_key })
    }

    /// Builds a protector from a base64-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] for invalid base64 or a wrong key length.
    pub fn from_base64(master_key_b64: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(master_key_b64.trim())
            .map_err(|e| CacheError::Config(format!("invalid master key base64: {e}")))?;
        Self::new(&bytes)
    }

    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `protection.master_key` is missing or
    /// invalid.
    pub fn from_config(config: &ProtectionConfig) -> Result<Self> {
        let key = config
            .master_key
            .as_deref()
            .ok_or_else(|| CacheError::Config("protection.master_key is not set".into()))?;
        Self::from_base64(key)
    }

    /// A protector with a fresh random key. Data it protects is unreadable
    /// once the value is dropped.
    #[must_use]
    pub fn generate() -> Self {
        let mut master_key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut master_key);
        Self { master_key }
    }

    /// A fresh random master key, base64-encoded for configuration files.
    #[must_use]
    pub fn generate_key_b64() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        base64::engine::general_purpose::STANDARD.encode(key)
    }

    fn cipher_for(&self, purpose: &str) -> std::result::Result<Aes256Gcm, String> {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut okm = [0u8; KEY_LEN];
        hk.expand(format!("{INFO_PREFIX}{purpose}").as_bytes(), &mut okm)
            .map_err(|e| format!("key derivation failed: {e}"))?;
        Aes256Gcm::new_from_slice(&okm).map_err(|e| format!("cipher init failed: {e}"))
    }
}

impl fmt::Debug for AesGcmProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmProtector").finish_non_exhaustive()
    }
}

impl DataProtector for AesGcmProtector {
    fn protect(&self, plaintext: &[u8], purpose: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher_for(purpose).map_err(CacheError::Encryption)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let payload = Payload {
            msg: plaintext,
            aad: purpose.as_bytes(),
        };
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), payload)
            .map_err(|e| CacheError::Encryption(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn unprotect(&self, ciphertext: &[u8], purpose: &str) -> Result<Vec<u8>> {
        let Some((&version, rest)) = ciphertext.split_first() else {
            return Err(CacheError::Decryption("empty payload".into()));
        };
        if version != FORMAT_VERSION {
            return Err(CacheError::Decryption(format!(
                "unknown payload version {version}"
            )));
        }
        if rest.len() < NONCE_LEN {
            return Err(CacheError::Decryption("payload too short".into()));
        }
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

        let cipher = self.cipher_for(purpose).map_err(CacheError::Decryption)?;
        let payload = Payload {
            msg: sealed,
            aad: purpose.as_bytes(),
        };
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), payload)
            .map_err(|_| CacheError::Decryption("authentication tag mismatch".into()))
    }
}
