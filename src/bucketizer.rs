//! Order-preserving bucketization.
//!
//! A bucketizer maps plaintext inputs onto a much smaller, randomly spaced
//! set of bucket values while preserving order: if `a <= b` then
//! `bucket(a) <= bucket(b)`. Range queries over bucket values return a
//! superset of the true answer; the proxy filters false positives after
//! decryption.
//!
//! Bucket assignments live in two shared store tables so that every proxy
//! instance resolves the same mapping:
//!
//! * `bucket_info` - one row per bucketizer id holding its parameters,
//! * `bucket_values` - row = 4-byte big-endian bucket id, qualifier =
//!   bucketizer id, value = 4-byte big-endian bucket value.
//!
//! Values are assigned once at creation, walking bucket ids in order and
//! advancing the value by `1 + rand(gap)` each step. The random gaps keep
//! the mapping from being guessable from a bucket value alone.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bytes;
use crate::cache::{Cache, DEFAULT_CACHE_CAPACITY};
use crate::error::{CryptcellError, Result};
use crate::random::RandomSource;
use crate::store::{CellFilter, CellRef, ColumnStore, StoredCell};

const INFO_TABLE: &str = "bucket_info";
const VALUE_TABLE: &str = "bucket_values";
const FAMILY: &[u8] = b"f";

const Q_INPUT_BITS: &[u8] = b"in_bits";
const Q_MIN: &[u8] = b"min";
const Q_MAX: &[u8] = b"max";
const Q_DIVISOR: &[u8] = b"divisor";
const Q_BUCKETS: &[u8] = b"buckets";

/// Width in bytes of every serialized bucket value.
pub const BUCKET_VALUE_SIZE: usize = 4;

/// Internal cells carry a fixed timestamp so they can be addressed exactly.
const BUCKET_TS: i64 = 0;

/// An order-preserving mapping from inputs to persisted bucket values.
///
/// `next_bucket_value` and `prev_bucket_value` return `Ok(None)` when the
/// input already falls in the last (resp. first) bucket, which callers treat
/// as an unbounded range edge.
pub trait Bucketizer {
    fn bucket_value(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    fn next_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>>;

    fn prev_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Serialized width of a bucket value, constant per instance.
    fn value_size(&self) -> usize {
        BUCKET_VALUE_SIZE
    }

    /// Pre-load the id-to-value cache from the store.
    fn fill_cache(&mut self) -> Result<()>;

    /// Delete this bucketizer's rows from the shared tables.
    fn remove(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Shared store plumbing
// ---------------------------------------------------------------------------

struct BucketStorage {
    store: Arc<dyn ColumnStore>,
    id: Vec<u8>,
    cache: Cache,
}

impl BucketStorage {
    fn new(store: Arc<dyn ColumnStore>, id: &str, cache_capacity: usize) -> Result<Self> {
        if id.is_empty() {
            return Err(CryptcellError::Validation(
                "bucketizer id is empty".into(),
            ));
        }
        store.create_table(INFO_TABLE, &[FAMILY.to_vec()])?;
        store.create_table(VALUE_TABLE, &[FAMILY.to_vec()])?;
        Ok(Self {
            store,
            id: id.as_bytes().to_vec(),
            cache: Cache::new(cache_capacity),
        })
    }

    fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    fn info_exists(&self) -> Result<bool> {
        let cells = self
            .store
            .get(INFO_TABLE, &self.id, &CellFilter::new().key_only())?;
        Ok(!cells.is_empty())
    }

    fn read_info(&self, qualifier: &[u8]) -> Result<Option<Vec<u8>>> {
        let filter = CellFilter::new()
            .family(FAMILY.to_vec())
            .qualifier_prefix(qualifier.to_vec());
        let cells = self.store.get(INFO_TABLE, &self.id, &filter)?;
        Ok(cells
            .into_iter()
            .find(|c| c.qualifier == qualifier)
            .map(|c| c.value))
    }

    fn require_info(&self, qualifier: &[u8]) -> Result<Vec<u8>> {
        self.read_info(qualifier)?.ok_or_else(|| {
            CryptcellError::NotFound(format!(
                "parameter {} of bucketizer {}",
                String::from_utf8_lossy(qualifier),
                self.id_str()
            ))
        })
    }

    fn write_info(&self, qualifier: &[u8], value: Vec<u8>) -> Result<()> {
        self.store.put(
            INFO_TABLE,
            &self.id,
            &[StoredCell {
                family: FAMILY.to_vec(),
                qualifier: qualifier.to_vec(),
                timestamp: BUCKET_TS,
                value,
            }],
        )
    }

    fn write_bucket_value(&self, bucket_id: u32, value: u32) -> Result<()> {
        self.store.put(
            VALUE_TABLE,
            &bucket_id.to_be_bytes(),
            &[StoredCell {
                family: FAMILY.to_vec(),
                qualifier: self.id.clone(),
                timestamp: BUCKET_TS,
                value: value.to_be_bytes().to_vec(),
            }],
        )
    }

    /// Cached id-to-value lookup. A missing mapping is a hard error since
    /// creation writes every id.
    fn bucket_value(&mut self, bucket_id: u32) -> Result<Vec<u8>> {
        let key = bucket_id.to_be_bytes();
        if let Some(value) = self.cache.get(&key) {
            return Ok(value.to_vec());
        }
        let filter = CellFilter::new()
            .family(FAMILY.to_vec())
            .qualifier_prefix(self.id.clone());
        let cells = self.store.get(VALUE_TABLE, &key, &filter)?;
        let value = cells
            .into_iter()
            .find(|c| c.qualifier == self.id)
            .map(|c| c.value)
            .ok_or_else(|| {
                CryptcellError::NotFound(format!(
                    "bucket {} of bucketizer {}",
                    bucket_id,
                    self.id_str()
                ))
            })?;
        self.cache.put(&key, &value);
        Ok(value)
    }

    fn fill_cache(&mut self, bucket_count: u32) -> Result<()> {
        let limit = (self.cache.capacity() as u64).min(bucket_count as u64) as u32;
        for bucket_id in 0..limit {
            self.bucket_value(bucket_id)?;
        }
        Ok(())
    }

    fn remove(&mut self, info_qualifiers: &[&[u8]], bucket_count: u32) -> Result<()> {
        let targets: Vec<CellRef> = info_qualifiers
            .iter()
            .map(|q| CellRef {
                family: FAMILY.to_vec(),
                qualifier: q.to_vec(),
                timestamp: BUCKET_TS,
            })
            .collect();
        self.store.delete(INFO_TABLE, &self.id, &targets)?;

        let target = [CellRef {
            family: FAMILY.to_vec(),
            qualifier: self.id.clone(),
            timestamp: BUCKET_TS,
        }];
        for bucket_id in 0..bucket_count {
            self.store
                .delete(VALUE_TABLE, &bucket_id.to_be_bytes(), &target)?;
        }
        self.cache = Cache::new(self.cache.capacity());
        Ok(())
    }

    /// Assign and persist a value for every bucket id. Values start near
    /// zero and advance by `1 + rand(gap)` per id; `gap` must be a power of
    /// two.
    fn assign_values(
        &self,
        bucket_count: u32,
        gap: u32,
        rng: &dyn RandomSource,
    ) -> Result<()> {
        info!(
            bucketizer = %self.id_str(),
            buckets = bucket_count,
            "assigning bucket values"
        );
        let mut value: i64 = -1;
        for bucket_id in 0..bucket_count {
            if bucket_id % 10_000 == 0 && bucket_id > 0 {
                debug!(bucketizer = %self.id_str(), finished = bucket_id, "bucket progress");
            }
            value += 1 + i64::from(rng.below(gap)?);
            self.write_bucket_value(bucket_id, value as u32)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Byte bucketizer
// ---------------------------------------------------------------------------

/// Bucketizes arbitrary byte strings by their leading `input_bits` bits.
///
/// The bucket id is the big-endian value of the first four bytes of the
/// input (zero-padded on the right when shorter), logically shifted down to
/// `input_bits` bits. `input_bits` ranges over `1..=30`.
pub struct ByteBucketizer {
    storage: BucketStorage,
    input_bits: u32,
    bucket_count: u32,
}

fn check_input_bits(input_bits: u32) -> Result<()> {
    if !(1..=30).contains(&input_bits) {
        return Err(CryptcellError::Validation(format!(
            "input bits {} outside 1..=30",
            input_bits
        )));
    }
    Ok(())
}

impl ByteBucketizer {
    /// Create the bucketizer and persist its bucket assignments. Fails with
    /// `AlreadyExists` when the id is taken.
    pub fn create(
        store: Arc<dyn ColumnStore>,
        id: &str,
        input_bits: u32,
        rng: &dyn RandomSource,
    ) -> Result<Self> {
        check_input_bits(input_bits)?;
        let storage = BucketStorage::new(store, id, DEFAULT_CACHE_CAPACITY)?;
        if storage.info_exists()? {
            return Err(CryptcellError::AlreadyExists(format!(
                "bucketizer {}",
                id
            )));
        }
        storage.write_info(Q_INPUT_BITS, input_bits.to_be_bytes().to_vec())?;

        let bucket_count = 1u32 << input_bits;
        // Average spacing between values: one out of 2^30 output values per
        // bucket.
        let gap = 1u32 << (30 - input_bits);
        storage.assign_values(bucket_count, gap, rng)?;

        Ok(Self {
            storage,
            input_bits,
            bucket_count,
        })
    }

    /// Open an existing bucketizer, reading its parameters from the store.
    pub fn open(store: Arc<dyn ColumnStore>, id: &str) -> Result<Self> {
        Self::open_with_cache(store, id, DEFAULT_CACHE_CAPACITY)
    }

    pub fn open_with_cache(
        store: Arc<dyn ColumnStore>,
        id: &str,
        cache_capacity: usize,
    ) -> Result<Self> {
        let storage = BucketStorage::new(store, id, cache_capacity)?;
        if !storage.info_exists()? {
            return Err(CryptcellError::NotFound(format!("bucketizer {}", id)));
        }
        let input_bits = bytes::read_u32(&storage.require_info(Q_INPUT_BITS)?, 0)?;
        check_input_bits(input_bits)?;
        Ok(Self {
            storage,
            input_bits,
            bucket_count: 1u32 << input_bits,
        })
    }

    /// Open an existing bucketizer and verify it was created with
    /// `input_bits`. Fails with `ParameterMismatch` on disagreement.
    pub fn open_checked(
        store: Arc<dyn ColumnStore>,
        id: &str,
        input_bits: u32,
    ) -> Result<Self> {
        let opened = Self::open(store, id)?;
        if opened.input_bits != input_bits {
            return Err(CryptcellError::ParameterMismatch(format!(
                "bucketizer {} has input bits {}, expected {}",
                id, opened.input_bits, input_bits
            )));
        }
        Ok(opened)
    }

    fn bucket_id(&self, input: &[u8]) -> Result<u32> {
        if input.is_empty() {
            return Err(CryptcellError::Validation(
                "bucketizer input is empty".into(),
            ));
        }
        let mut first = [0u8; 4];
        let n = input.len().min(4);
        first[..n].copy_from_slice(&input[..n]);
        Ok(u32::from_be_bytes(first) >> (32 - self.input_bits))
    }
}

impl Bucketizer for ByteBucketizer {
    fn bucket_value(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let id = self.bucket_id(input)?;
        self.storage.bucket_value(id)
    }

    fn next_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        let id = self.bucket_id(input)?;
        if id >= self.bucket_count - 1 {
            return Ok(None);
        }
        self.storage.bucket_value(id + 1).map(Some)
    }

    fn prev_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        let id = self.bucket_id(input)?;
        if id == 0 {
            return Ok(None);
        }
        self.storage.bucket_value(id - 1).map(Some)
    }

    fn fill_cache(&mut self) -> Result<()> {
        self.storage.fill_cache(self.bucket_count)
    }

    fn remove(&mut self) -> Result<()> {
        self.storage.remove(&[Q_INPUT_BITS], self.bucket_count)
    }
}

// ---------------------------------------------------------------------------
// Long bucketizer
// ---------------------------------------------------------------------------

/// Bucketizes 64-bit integers over a fixed domain `[min, max)` split into
/// `bucket_count` equal partitions.
pub struct LongBucketizer {
    storage: BucketStorage,
    min: i64,
    max: i64,
    divisor: i64,
    bucket_count: u32,
}

const LONG_GAP: u32 = 8;

fn check_long_params(min: i64, max: i64, bucket_count: u32) -> Result<i64> {
    if min >= max {
        return Err(CryptcellError::Validation(format!(
            "min {} is not below max {}",
            min, max
        )));
    }
    if bucket_count == 0 {
        return Err(CryptcellError::Validation(
            "bucket count is zero".into(),
        ));
    }
    let divisor = ((max as i128 - min as i128) / bucket_count as i128) as i64;
    if divisor < 1 {
        return Err(CryptcellError::Validation(format!(
            "domain of width {} is narrower than {} buckets",
            max as i128 - min as i128,
            bucket_count
        )));
    }
    Ok(divisor)
}

impl LongBucketizer {
    /// Create the bucketizer and persist its bucket assignments. Fails with
    /// `AlreadyExists` when the id is taken.
    pub fn create(
        store: Arc<dyn ColumnStore>,
        id: &str,
        min: i64,
        max: i64,
        bucket_count: u32,
        rng: &dyn RandomSource,
    ) -> Result<Self> {
        let divisor = check_long_params(min, max, bucket_count)?;
        let storage = BucketStorage::new(store, id, DEFAULT_CACHE_CAPACITY)?;
        if storage.info_exists()? {
            return Err(CryptcellError::AlreadyExists(format!(
                "bucketizer {}",
                id
            )));
        }
        storage.write_info(Q_MIN, min.to_be_bytes().to_vec())?;
        storage.write_info(Q_MAX, max.to_be_bytes().to_vec())?;
        storage.write_info(Q_DIVISOR, divisor.to_be_bytes().to_vec())?;
        storage.write_info(Q_BUCKETS, bucket_count.to_be_bytes().to_vec())?;
        storage.assign_values(bucket_count, LONG_GAP, rng)?;

        Ok(Self {
            storage,
            min,
            max,
            divisor,
            bucket_count,
        })
    }

    pub fn open(store: Arc<dyn ColumnStore>, id: &str) -> Result<Self> {
        Self::open_with_cache(store, id, DEFAULT_CACHE_CAPACITY)
    }

    pub fn open_with_cache(
        store: Arc<dyn ColumnStore>,
        id: &str,
        cache_capacity: usize,
    ) -> Result<Self> {
        let storage = BucketStorage::new(store, id, cache_capacity)?;
        if !storage.info_exists()? {
            return Err(CryptcellError::NotFound(format!("bucketizer {}", id)));
        }
        let min = bytes::read_i64(&storage.require_info(Q_MIN)?, 0)?;
        let max = bytes::read_i64(&storage.require_info(Q_MAX)?, 0)?;
        let divisor = bytes::read_i64(&storage.require_info(Q_DIVISOR)?, 0)?;
        let bucket_count = bytes::read_u32(&storage.require_info(Q_BUCKETS)?, 0)?;
        if divisor < 1 || bucket_count == 0 {
            return Err(CryptcellError::Validation(format!(
                "stored parameters of bucketizer {} are corrupt",
                id
            )));
        }
        Ok(Self {
            storage,
            min,
            max,
            divisor,
            bucket_count,
        })
    }

    /// Open an existing bucketizer and verify it was created over the same
    /// domain. Fails with `ParameterMismatch` on disagreement.
    pub fn open_checked(
        store: Arc<dyn ColumnStore>,
        id: &str,
        min: i64,
        max: i64,
        bucket_count: u32,
    ) -> Result<Self> {
        let divisor = check_long_params(min, max, bucket_count)?;
        let opened = Self::open(store, id)?;
        if opened.min != min
            || opened.max != max
            || opened.divisor != divisor
            || opened.bucket_count != bucket_count
        {
            return Err(CryptcellError::ParameterMismatch(format!(
                "bucketizer {} was created over a different domain",
                id
            )));
        }
        Ok(opened)
    }

    /// Unclamped partition index; out-of-domain inputs land outside
    /// `0..bucket_count`.
    fn bucket_id(&self, input: &[u8]) -> Result<i64> {
        if input.is_empty() {
            return Err(CryptcellError::Validation(
                "bucketizer input is empty".into(),
            ));
        }
        let value = bytes::to_i64(input);
        Ok(((value as i128 - self.min as i128) / self.divisor as i128) as i64)
    }
}

impl Bucketizer for LongBucketizer {
    fn bucket_value(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let id = self
            .bucket_id(input)?
            .clamp(0, i64::from(self.bucket_count) - 1);
        self.storage.bucket_value(id as u32)
    }

    fn next_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        let id = self.bucket_id(input)?;
        if id < 0 || id >= i64::from(self.bucket_count) - 1 {
            return Ok(None);
        }
        self.storage.bucket_value(id as u32 + 1).map(Some)
    }

    fn prev_bucket_value(&mut self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        let id = self.bucket_id(input)?;
        if id <= 0 || id >= i64::from(self.bucket_count) {
            return Ok(None);
        }
        self.storage.bucket_value(id as u32 - 1).map(Some)
    }

    fn fill_cache(&mut self) -> Result<()> {
        self.storage.fill_cache(self.bucket_count)
    }

    fn remove(&mut self) -> Result<()> {
        self.storage
            .remove(&[Q_MIN, Q_MAX, Q_DIVISOR, Q_BUCKETS], self.bucket_count)
    }
}
