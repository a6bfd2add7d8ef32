//! Crypter configuration.
//!
//! A [`CrypterConfig`] is the serializable description of one crypter:
//! which mode it runs in, its cipher keys (hex-encoded), and either the
//! bucketizer ids (bucket mode) or the keyed-hash parameters (hash and
//! minimal modes). Configs round-trip through JSON so deployments can keep
//! them alongside the key material they reference.
//!
//! Bucketizers are persisted state, so the bucket-mode builder only opens
//! ids that were previously created against the same store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bucketizer::{Bucketizer, ByteBucketizer, LongBucketizer};
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::cipher::{AesCtr, AesKey, Cipher};
use crate::crypter::{Mode1Crypter, Mode2Crypter, Mode3Crypter};
use crate::error::{CryptcellError, Result};
use crate::hash::Sha256Hasher;
use crate::store::ColumnStore;

/// Which crypter a config describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Order-preserving bucket indexes; supports range scans.
    Bucket,
    /// Keyed-hash equality indexes; point lookups only.
    Hash,
    /// Row-only keyed-hash index with placeholder family and timestamp.
    Minimal,
}

/// A named, persisted bucketizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketizerRef {
    Byte { id: String },
    Long { id: String },
}

impl BucketizerRef {
    fn open(
        &self,
        store: Arc<dyn ColumnStore>,
        cache_capacity: usize,
    ) -> Result<Box<dyn Bucketizer>> {
        Ok(match self {
            BucketizerRef::Byte { id } => {
                Box::new(ByteBucketizer::open_with_cache(store, id, cache_capacity)?)
            }
            BucketizerRef::Long { id } => {
                Box::new(LongBucketizer::open_with_cache(store, id, cache_capacity)?)
            }
        })
    }
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// Serializable crypter description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrypterConfig {
    pub mode: Mode,
    /// Table the proxy built from this config serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Hex-encoded AES key sealing row, family, qualifier and timestamp
    /// into the wrapped qualifier.
    pub key_cipher_key: String,
    /// Hex-encoded AES key for cell values.
    pub value_cipher_key: String,
    /// Hex-encoded HMAC key; required for hash and minimal modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_key: Option<String>,
    /// Keep only this many leading hash bytes in index data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_trim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_bucketizer: Option<BucketizerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_bucketizer: Option<BucketizerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier_bucketizer: Option<BucketizerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_bucketizer: Option<BucketizerRef>,
    /// Per-bucketizer value cache capacity; zero disables caching.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| CryptcellError::Validation(format!("{field} is not valid hex: {e}")))
}

impl CrypterConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CryptcellError::Validation(format!("bad crypter config: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CryptcellError::Validation(format!("cannot serialize config: {e}")))
    }

    fn cipher_pair(&self) -> Result<(Box<dyn Cipher>, Box<dyn Cipher>)> {
        let key_cipher = AesCtr::new(AesKey::from_bytes(&decode_hex(
            "key_cipher_key",
            &self.key_cipher_key,
        )?)?);
        let value_cipher = AesCtr::new(AesKey::from_bytes(&decode_hex(
            "value_cipher_key",
            &self.value_cipher_key,
        )?)?);
        Ok((Box::new(key_cipher), Box::new(value_cipher)))
    }

    fn hasher(&self) -> Result<Sha256Hasher> {
        let hash_key = self
            .hash_key
            .as_deref()
            .ok_or(CryptcellError::MissingField("hash_key"))?;
        let key = decode_hex("hash_key", hash_key)?;
        match self.hash_trim {
            Some(trim) => Sha256Hasher::with_trim(&key, trim),
            None => Sha256Hasher::new(&key),
        }
    }

    fn require_mode(&self, expected: Mode) -> Result<()> {
        if self.mode != expected {
            return Err(CryptcellError::ParameterMismatch(format!(
                "config mode is {:?}, expected {:?}",
                self.mode, expected
            )));
        }
        Ok(())
    }

    /// Open the configured bucketizers against `store` and assemble the
    /// bucket-mode crypter.
    pub fn build_bucket(&self, store: Arc<dyn ColumnStore>) -> Result<Mode1Crypter> {
        self.require_mode(Mode::Bucket)?;
        let slot = |part: &'static str, slot: &Option<BucketizerRef>| -> Result<Box<dyn Bucketizer>> {
            slot.as_ref()
                .ok_or(CryptcellError::MissingField(part))?
                .open(store.clone(), self.cache_capacity)
        };
        let (key_cipher, value_cipher) = self.cipher_pair()?;
        Ok(Mode1Crypter::new(
            slot("row_bucketizer", &self.row_bucketizer)?,
            slot("family_bucketizer", &self.family_bucketizer)?,
            slot("qualifier_bucketizer", &self.qualifier_bucketizer)?,
            slot("timestamp_bucketizer", &self.timestamp_bucketizer)?,
            key_cipher,
            value_cipher,
        ))
    }

    pub fn build_hash(&self) -> Result<Mode2Crypter> {
        self.require_mode(Mode::Hash)?;
        let (key_cipher, value_cipher) = self.cipher_pair()?;
        Ok(Mode2Crypter::new(
            Box::new(self.hasher()?),
            Box::new(self.hasher()?),
            Box::new(self.hasher()?),
            Box::new(self.hasher()?),
            key_cipher,
            value_cipher,
        ))
    }

    pub fn build_minimal(&self) -> Result<Mode3Crypter> {
        self.require_mode(Mode::Minimal)?;
        let (key_cipher, value_cipher) = self.cipher_pair()?;
        Ok(Mode3Crypter::new(
            Box::new(self.hasher()?),
            key_cipher,
            value_cipher,
        ))
    }
}
