//! # cryptcell
//!
//! Searchable-encryption middleware for sparse wide-column stores.
//!
//! Cells are encrypted on the client; the server only ever sees searchable
//! index data derived from keys and timestamps. Bucket-based indexes keep
//! order at bucket granularity and support range scans; keyed-hash indexes
//! support equality lookups only. Either way the full plaintext key is
//! sealed inside the wrapped qualifier, so candidates returned by the
//! coarse server-side filters can be re-validated before being surfaced.
//!
//! ## Public API
//!
//! Construct a crypter (directly, or from a [`config::CrypterConfig`]),
//! hand it to a [`proxy::Proxy`] over a [`store::ColumnStore`], and issue
//! plaintext [`query`] operations against it.

pub mod bucketizer;
pub(crate) mod bytes;
pub mod cache;
pub mod cipher;
pub mod config;
pub mod crypter;
pub mod error;
pub mod hash;
pub mod proxy;
pub mod query;
pub mod random;
pub mod scanner;
pub mod store;

pub use crate::error::{CryptcellError, Result};
pub use crate::proxy::{Proxy, ProxyMode1, ProxyMode2};
