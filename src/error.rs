//! Error types for cryptcell.
//!
//! One error enum covers the whole crate. Variants mirror the failure
//! taxonomy of the proxy: validation problems are surfaced immediately and
//! never retried here; backing-store failures are passed through unmodified —
//! retry policy belongs to the caller, not to this layer.

use std::fmt;

/// The single error type for all cryptcell operations.
#[derive(Debug)]
pub enum CryptcellError {
    /// A required input was missing, empty, or out of range.
    Validation(String),

    /// A cell component required by a wrap/unwrap operation was null or empty.
    MissingField(&'static str),

    /// A cryptographic key was invalid (wrong length, empty, malformed).
    InvalidKey,

    /// Input too short to encrypt, or too short to contain the framing
    /// (IV, offset prefix) a decrypt expects.
    InsufficientData,

    /// Decryption failed in the underlying primitive (bad padding etc).
    DecryptionFailure,

    /// The system's random number generator failed to produce bytes.
    RandomnessFailure,

    /// A referenced bucketizer, table, or bucket entry does not exist.
    NotFound(String),

    /// Creation was attempted for a bucketizer or table that already exists.
    AlreadyExists(String),

    /// A reopened bucketizer's persisted parameters disagree with the
    /// caller's expectation. Signals an id-reuse or versioning bug upstream.
    ParameterMismatch(String),

    /// The operation is not supported by the selected crypter mode.
    Unsupported(&'static str),

    /// A failure reported by the backing store, propagated unmodified.
    Store(String),
}

impl fmt::Display for CryptcellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation failed: {}", msg),
            Self::MissingField(field) => write!(f, "missing or empty field: {}", field),
            Self::InvalidKey => write!(f, "invalid key"),
            Self::InsufficientData => write!(f, "insufficient data"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::NotFound(what) => write!(f, "not found: {}", what),
            Self::AlreadyExists(what) => write!(f, "already exists: {}", what),
            Self::ParameterMismatch(what) => write!(f, "parameter mismatch: {}", what),
            Self::Unsupported(op) => write!(f, "unsupported operation: {}", op),
            Self::Store(msg) => write!(f, "backing store error: {}", msg),
        }
    }
}

impl std::error::Error for CryptcellError {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CryptcellError>;
