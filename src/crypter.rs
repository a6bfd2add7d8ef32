//! Wrap and unwrap protocols for encrypted cells.
//!
//! A crypter turns a plaintext cell `(row, family, qualifier, timestamp,
//! value)` into its stored encrypted form and back. Every wrapped key-part
//! is made of up to two pieces:
//!
//! * an *index datum*, stored in the clear as the literal key so the store
//!   can filter on it server-side, and
//! * for the qualifier only, an authoritative encrypted blob trailing the
//!   index datum: `E(len_row || len_family || len_qualifier || row ||
//!   family || qualifier || timestamp)` with 4-byte big-endian lengths and
//!   an 8-byte timestamp.
//!
//! Row, family and timestamp are never recovered from their own wrapped
//! forms; they are recovered by unwrapping the qualifier blob. Their own
//! wrapped forms exist purely as searchable index prefixes.
//!
//! The three modes differ in what produces the index datum:
//!
//! * [`Mode1Crypter`] - bucket values; order-preserving, supports scans,
//! * [`Mode2Crypter`] - keyed hashes; equality search only,
//! * [`Mode3Crypter`] - row hash only, placeholder family index, no
//!   qualifier index at all.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::bucketizer::Bucketizer;
use crate::bytes;
use crate::cipher::Cipher;
use crate::error::{CryptcellError, Result};
use crate::hash::Hasher;
use crate::store::TimeRange;

/// Length header ahead of the blob payload: three 4-byte sizes.
const BLOB_HEADER: usize = 12;

/// Base64-url length of `n` raw bytes, unpadded.
fn b64_len(n: usize) -> usize {
    (n * 8 + 5) / 6
}

fn require(part: &'static str, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(CryptcellError::MissingField(part));
    }
    Ok(())
}

/// The plaintext recovered from a qualifier's authoritative blob.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyParts {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
}

fn seal_key_parts(
    cipher: &dyn Cipher,
    row: &[u8],
    family: &[u8],
    qualifier: &[u8],
    ts: i64,
) -> Result<Vec<u8>> {
    let mut blob =
        Vec::with_capacity(BLOB_HEADER + row.len() + family.len() + qualifier.len() + 8);
    blob.extend_from_slice(&(row.len() as u32).to_be_bytes());
    blob.extend_from_slice(&(family.len() as u32).to_be_bytes());
    blob.extend_from_slice(&(qualifier.len() as u32).to_be_bytes());
    blob.extend_from_slice(row);
    blob.extend_from_slice(family);
    blob.extend_from_slice(qualifier);
    blob.extend_from_slice(&ts.to_be_bytes());
    cipher.encrypt(&blob)
}

fn open_key_parts(
    cipher: &dyn Cipher,
    wrapped_qualifier: &[u8],
    offset: usize,
) -> Result<KeyParts> {
    require("qualifier", wrapped_qualifier)?;
    let blob = cipher.decrypt_at(wrapped_qualifier, offset)?;
    let row_len = bytes::read_u32(&blob, 0)? as usize;
    let family_len = bytes::read_u32(&blob, 4)? as usize;
    let qualifier_len = bytes::read_u32(&blob, 8)? as usize;

    let row = bytes::slice(&blob, BLOB_HEADER, row_len)?.to_vec();
    let family = bytes::slice(&blob, BLOB_HEADER + row_len, family_len)?.to_vec();
    let qualifier =
        bytes::slice(&blob, BLOB_HEADER + row_len + family_len, qualifier_len)?.to_vec();
    let timestamp =
        bytes::read_i64(&blob, BLOB_HEADER + row_len + family_len + qualifier_len)?;

    Ok(KeyParts {
        row,
        family,
        qualifier,
        timestamp,
    })
}

/// The wrap/unwrap protocol for one mode.
///
/// `index_*_size` must equal the byte length the matching `index_*_data`
/// produces for any valid input; the proxy relies on this to compute
/// decrypt offsets and prefix filters. All `unwrap_*` methods take the
/// *wrapped qualifier*, the carrier of the authoritative blob.
///
/// Methods take `&mut self` because bucket-backed modes consult and update
/// a lookup cache.
pub trait Crypter {
    // --- row ---

    fn index_row_data(&mut self, row: &[u8]) -> Result<Vec<u8>>;
    fn index_row_size(&self) -> usize;

    fn wrap_row(&mut self, row: &[u8]) -> Result<Vec<u8>> {
        self.index_row_data(row)
    }

    fn unwrap_row(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>>;

    /// Encrypted scan bound for a plaintext row; order-preserving modes
    /// only.
    fn row_bucket(&mut self, _row: &[u8]) -> Result<Vec<u8>> {
        Err(CryptcellError::Unsupported(
            "row range bounds need an order-preserving index",
        ))
    }

    /// Next encrypted scan bound; `None` when the row falls in the last
    /// bucket. Order-preserving modes only.
    fn row_next_bucket(&mut self, _row: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(CryptcellError::Unsupported(
            "row range bounds need an order-preserving index",
        ))
    }

    // --- family ---

    fn index_family_data(&mut self, family: &[u8]) -> Result<Vec<u8>>;
    fn index_family_size(&self) -> usize;

    fn wrap_family(&mut self, family: &[u8]) -> Result<Vec<u8>> {
        self.index_family_data(family)
    }

    fn unwrap_family(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>>;

    // --- qualifier ---

    fn index_qualifier_data(&mut self, qualifier: &[u8]) -> Result<Vec<u8>>;
    fn index_qualifier_size(&self) -> usize;

    fn wrap_qualifier(
        &mut self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        ts: i64,
    ) -> Result<Vec<u8>>;

    fn unwrap_qualifier(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>>;

    /// Recover all four key-parts in one decryption.
    fn unwrap_key_parts(&mut self, wrapped_qualifier: &[u8]) -> Result<KeyParts>;

    // --- timestamp ---

    fn wrap_timestamp(&mut self, ts: i64) -> Result<i64>;
    fn unwrap_timestamp(&mut self, wrapped_qualifier: &[u8]) -> Result<i64>;

    /// Encrypted time-range lower bound; order-preserving modes only.
    fn timestamp_bucket(&mut self, _ts: i64) -> Result<i64> {
        Err(CryptcellError::Unsupported(
            "time range bounds need an order-preserving index",
        ))
    }

    /// Encrypted time-range upper bound; `None` when `ts` falls in the
    /// last bucket. Order-preserving modes only.
    fn timestamp_next_bucket(&mut self, _ts: i64) -> Result<Option<i64>> {
        Err(CryptcellError::Unsupported(
            "time range bounds need an order-preserving index",
        ))
    }

    /// Store-side time range covering every wrapped timestamp whose
    /// plaintext instant falls in the inclusive range `[min, max]`.
    ///
    /// Defaults to unbounded: modes without an order-preserving timestamp
    /// index cannot narrow the range server-side and rely on the proxy's
    /// post-decryption filtering instead.
    fn encrypted_time_range(&mut self, _min: i64, _max: i64) -> Result<TimeRange> {
        Ok(TimeRange::all())
    }

    // --- value ---

    fn wrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>>;
    fn unwrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>>;

    /// Whether encrypted row ranges preserve plaintext row order, the
    /// prerequisite for Scan.
    fn supports_scan(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Mode 1: bucket-value indexes
// ---------------------------------------------------------------------------

/// Bucket-value indexes for all four key-parts. The only mode whose index
/// data preserves plaintext order, and therefore the only one supporting
/// range queries and scans.
pub struct Mode1Crypter {
    row_bucketizer: Box<dyn Bucketizer>,
    family_bucketizer: Box<dyn Bucketizer>,
    qualifier_bucketizer: Box<dyn Bucketizer>,
    timestamp_bucketizer: Box<dyn Bucketizer>,
    key_cipher: Box<dyn Cipher>,
    value_cipher: Box<dyn Cipher>,
}

impl Mode1Crypter {
    pub fn new(
        row_bucketizer: Box<dyn Bucketizer>,
        family_bucketizer: Box<dyn Bucketizer>,
        qualifier_bucketizer: Box<dyn Bucketizer>,
        timestamp_bucketizer: Box<dyn Bucketizer>,
        key_cipher: Box<dyn Cipher>,
        value_cipher: Box<dyn Cipher>,
    ) -> Self {
        Self {
            row_bucketizer,
            family_bucketizer,
            qualifier_bucketizer,
            timestamp_bucketizer,
            key_cipher,
            value_cipher,
        }
    }
}

impl Crypter for Mode1Crypter {
    fn index_row_data(&mut self, row: &[u8]) -> Result<Vec<u8>> {
        require("row", row)?;
        self.row_bucketizer.bucket_value(row)
    }

    fn index_row_size(&self) -> usize {
        self.row_bucketizer.value_size()
    }

    fn unwrap_row(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.row)
    }

    fn row_bucket(&mut self, row: &[u8]) -> Result<Vec<u8>> {
        require("row", row)?;
        self.row_bucketizer.bucket_value(row)
    }

    fn row_next_bucket(&mut self, row: &[u8]) -> Result<Option<Vec<u8>>> {
        require("row", row)?;
        self.row_bucketizer.next_bucket_value(row)
    }

    fn index_family_data(&mut self, family: &[u8]) -> Result<Vec<u8>> {
        require("family", family)?;
        let bucket = self.family_bucketizer.bucket_value(family)?;
        Ok(URL_SAFE_NO_PAD.encode(bucket).into_bytes())
    }

    fn index_family_size(&self) -> usize {
        b64_len(self.family_bucketizer.value_size())
    }

    fn unwrap_family(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.family)
    }

    fn index_qualifier_data(&mut self, qualifier: &[u8]) -> Result<Vec<u8>> {
        require("qualifier", qualifier)?;
        self.qualifier_bucketizer.bucket_value(qualifier)
    }

    fn index_qualifier_size(&self) -> usize {
        self.qualifier_bucketizer.value_size()
    }

    fn wrap_qualifier(
        &mut self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        ts: i64,
    ) -> Result<Vec<u8>> {
        require("row", row)?;
        require("family", family)?;
        require("qualifier", qualifier)?;
        let mut out = self.index_qualifier_data(qualifier)?;
        out.extend(seal_key_parts(
            self.key_cipher.as_ref(),
            row,
            family,
            qualifier,
            ts,
        )?);
        Ok(out)
    }

    fn unwrap_qualifier(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.qualifier)
    }

    fn unwrap_key_parts(&mut self, wrapped_qualifier: &[u8]) -> Result<KeyParts> {
        open_key_parts(
            self.key_cipher.as_ref(),
            wrapped_qualifier,
            self.index_qualifier_size(),
        )
    }

    fn wrap_timestamp(&mut self, ts: i64) -> Result<i64> {
        let bucket = self.timestamp_bucketizer.bucket_value(&ts.to_be_bytes())?;
        Ok(bytes::to_i64(&bucket))
    }

    fn unwrap_timestamp(&mut self, wrapped_qualifier: &[u8]) -> Result<i64> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.timestamp)
    }

    fn timestamp_bucket(&mut self, ts: i64) -> Result<i64> {
        self.wrap_timestamp(ts)
    }

    fn timestamp_next_bucket(&mut self, ts: i64) -> Result<Option<i64>> {
        let next = self
            .timestamp_bucketizer
            .next_bucket_value(&ts.to_be_bytes())?;
        Ok(next.map(|b| bytes::to_i64(&b)))
    }

    fn encrypted_time_range(&mut self, min: i64, max: i64) -> Result<TimeRange> {
        let low = self.timestamp_bucket(min)?;
        // Anything at or before `max` wraps below the next bucket's value;
        // `max` past the last bucket leaves the range unbounded above.
        let high = self.timestamp_next_bucket(max)?.unwrap_or(i64::MAX);
        Ok(TimeRange::new(low, high))
    }

    fn wrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.encrypt(value)
    }

    fn unwrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.decrypt(value)
    }

    fn supports_scan(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Mode 2: keyed-hash indexes
// ---------------------------------------------------------------------------

/// Keyed-hash indexes for all four key-parts. Equality search only; hashes
/// do not preserve order, so range pushdown degrades to a point lookup at
/// best and scans are unsupported.
pub struct Mode2Crypter {
    row_hasher: Box<dyn Hasher>,
    family_hasher: Box<dyn Hasher>,
    qualifier_hasher: Box<dyn Hasher>,
    timestamp_hasher: Box<dyn Hasher>,
    key_cipher: Box<dyn Cipher>,
    value_cipher: Box<dyn Cipher>,
}

impl Mode2Crypter {
    pub fn new(
        row_hasher: Box<dyn Hasher>,
        family_hasher: Box<dyn Hasher>,
        qualifier_hasher: Box<dyn Hasher>,
        timestamp_hasher: Box<dyn Hasher>,
        key_cipher: Box<dyn Cipher>,
        value_cipher: Box<dyn Cipher>,
    ) -> Self {
        Self {
            row_hasher,
            family_hasher,
            qualifier_hasher,
            timestamp_hasher,
            key_cipher,
            value_cipher,
        }
    }
}

impl Crypter for Mode2Crypter {
    fn index_row_data(&mut self, row: &[u8]) -> Result<Vec<u8>> {
        require("row", row)?;
        let hash = self.row_hasher.hash(row)?;
        Ok(URL_SAFE_NO_PAD.encode(hash).into_bytes())
    }

    fn index_row_size(&self) -> usize {
        b64_len(self.row_hasher.hash_size())
    }

    fn unwrap_row(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.row)
    }

    fn index_family_data(&mut self, family: &[u8]) -> Result<Vec<u8>> {
        require("family", family)?;
        let hash = self.family_hasher.hash(family)?;
        Ok(URL_SAFE_NO_PAD.encode(hash).into_bytes())
    }

    fn index_family_size(&self) -> usize {
        b64_len(self.family_hasher.hash_size())
    }

    fn unwrap_family(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.family)
    }

    fn index_qualifier_data(&mut self, qualifier: &[u8]) -> Result<Vec<u8>> {
        require("qualifier", qualifier)?;
        self.qualifier_hasher.hash(qualifier)
    }

    fn index_qualifier_size(&self) -> usize {
        self.qualifier_hasher.hash_size()
    }

    fn wrap_qualifier(
        &mut self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        ts: i64,
    ) -> Result<Vec<u8>> {
        require("row", row)?;
        require("family", family)?;
        require("qualifier", qualifier)?;
        let mut out = self.index_qualifier_data(qualifier)?;
        out.extend(seal_key_parts(
            self.key_cipher.as_ref(),
            row,
            family,
            qualifier,
            ts,
        )?);
        Ok(out)
    }

    fn unwrap_qualifier(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.qualifier)
    }

    fn unwrap_key_parts(&mut self, wrapped_qualifier: &[u8]) -> Result<KeyParts> {
        open_key_parts(
            self.key_cipher.as_ref(),
            wrapped_qualifier,
            self.index_qualifier_size(),
        )
    }

    fn wrap_timestamp(&mut self, ts: i64) -> Result<i64> {
        let hash = self.timestamp_hasher.hash(&ts.to_be_bytes())?;
        Ok(bytes::to_i64(&hash))
    }

    fn unwrap_timestamp(&mut self, wrapped_qualifier: &[u8]) -> Result<i64> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.timestamp)
    }

    fn encrypted_time_range(&mut self, min: i64, max: i64) -> Result<TimeRange> {
        // Hashes do not preserve order; only a single plaintext instant can
        // be pushed down, as a point lookup at its wrapped value.
        if min == max {
            let wrapped = self.wrap_timestamp(min)?;
            return Ok(TimeRange::at(wrapped));
        }
        Ok(TimeRange::all())
    }

    fn wrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.encrypt(value)
    }

    fn unwrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.decrypt(value)
    }
}

// ---------------------------------------------------------------------------
// Mode 3: minimal index
// ---------------------------------------------------------------------------

/// Placeholder written for every wrapped family in Mode 3.
pub const MODE3_FAMILY_INDEX: &[u8] = b"a";

/// Placeholder written for every wrapped timestamp in Mode 3.
pub const MODE3_TIMESTAMP: i64 = 2;

/// Minimal-leakage mode: only the row carries a searchable index. Family
/// and timestamp are stored as fixed placeholders and the qualifier is the
/// bare authoritative blob with no index prefix. Everything is recovered by
/// unwrapping the qualifier.
pub struct Mode3Crypter {
    row_hasher: Box<dyn Hasher>,
    key_cipher: Box<dyn Cipher>,
    value_cipher: Box<dyn Cipher>,
}

impl Mode3Crypter {
    pub fn new(
        row_hasher: Box<dyn Hasher>,
        key_cipher: Box<dyn Cipher>,
        value_cipher: Box<dyn Cipher>,
    ) -> Self {
        Self {
            row_hasher,
            key_cipher,
            value_cipher,
        }
    }
}

impl Crypter for Mode3Crypter {
    fn index_row_data(&mut self, row: &[u8]) -> Result<Vec<u8>> {
        require("row", row)?;
        self.row_hasher.hash(row)
    }

    fn index_row_size(&self) -> usize {
        self.row_hasher.hash_size()
    }

    fn unwrap_row(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.row)
    }

    fn index_family_data(&mut self, _family: &[u8]) -> Result<Vec<u8>> {
        Ok(MODE3_FAMILY_INDEX.to_vec())
    }

    fn index_family_size(&self) -> usize {
        MODE3_FAMILY_INDEX.len()
    }

    fn unwrap_family(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.family)
    }

    fn index_qualifier_data(&mut self, _qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn index_qualifier_size(&self) -> usize {
        0
    }

    fn wrap_qualifier(
        &mut self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        ts: i64,
    ) -> Result<Vec<u8>> {
        require("row", row)?;
        require("family", family)?;
        require("qualifier", qualifier)?;
        seal_key_parts(self.key_cipher.as_ref(), row, family, qualifier, ts)
    }

    fn unwrap_qualifier(&mut self, wrapped_qualifier: &[u8]) -> Result<Vec<u8>> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.qualifier)
    }

    fn unwrap_key_parts(&mut self, wrapped_qualifier: &[u8]) -> Result<KeyParts> {
        open_key_parts(self.key_cipher.as_ref(), wrapped_qualifier, 0)
    }

    fn wrap_timestamp(&mut self, _ts: i64) -> Result<i64> {
        Ok(MODE3_TIMESTAMP)
    }

    fn unwrap_timestamp(&mut self, wrapped_qualifier: &[u8]) -> Result<i64> {
        Ok(self.unwrap_key_parts(wrapped_qualifier)?.timestamp)
    }

    fn wrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.encrypt(value)
    }

    fn unwrap_value(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        require("value", value)?;
        self.value_cipher.decrypt(value)
    }
}
