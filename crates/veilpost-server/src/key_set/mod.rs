//! Verification key resolution.
//!
//! Signers publish a key-set document at a URI; verifiers resolve
//! `(uri, key_id)` through a [`KeySetCache`] backed by a [`KeySetSource`].
//!
//! # Concurrency
//!
//! The cache lock is never held across the fetch. A slow key-set host delays
//! only the requests that need its keys; lookups for cached keys proceed.

mod cache;
mod error;
mod source;

pub use cache::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_TTL, DEFAULT_MAX_KEYS, KeySetCache, KeySetCacheConfig,
};
pub use error::KeySetError;
#[cfg(feature = "http")]
pub use source::HttpKeySetSource;
pub use source::{KeySetSource, StaticKeySetSource};
