//! Keyed hashing for equality-searchable indexes.
//!
//! Index data in keyed-hash mode is an HMAC of the plaintext component,
//! optionally truncated. Truncation trades index size against collision
//! rate; collisions are tolerated because every read re-checks the wrapped
//! plaintext before returning a cell.

use ring::hmac;
use zeroize::Zeroizing;

use crate::error::{CryptcellError, Result};

/// Full HMAC-SHA256 output width in bytes.
pub const SHA256_SIZE: usize = 32;

/// A deterministic keyed hash with a fixed output size.
pub trait Hasher {
    fn hash(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Output width of [`Hasher::hash`], constant per instance.
    fn hash_size(&self) -> usize;
}

/// HMAC-SHA256, keeping the first `trim` bytes of the tag.
pub struct Sha256Hasher {
    key: hmac::Key,
    trim: usize,
}

impl Sha256Hasher {
    /// Full-width hasher.
    pub fn new(key: &[u8]) -> Result<Self> {
        Self::with_trim(key, SHA256_SIZE)
    }

    /// Hasher truncated to the first `trim` bytes, `1..=32`.
    pub fn with_trim(key: &[u8], trim: usize) -> Result<Self> {
        if key.is_empty() {
            return Err(CryptcellError::InvalidKey);
        }
        if trim == 0 || trim > SHA256_SIZE {
            return Err(CryptcellError::Validation(format!(
                "hash trim {} outside 1..={}",
                trim, SHA256_SIZE
            )));
        }
        let key = Zeroizing::new(key.to_vec());
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, &key),
            trim,
        })
    }
}

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Result<Vec<u8>> {
        let tag = hmac::sign(&self.key, data);
        Ok(tag.as_ref()[..self.trim].to_vec())
    }

    fn hash_size(&self) -> usize {
        self.trim
    }
}
