//! Key-set resolution errors

use std::time::Duration;

use thiserror::Error;
use veilpost_core::{ErrorKind, signature::SignatureError};

/// Errors from fetching or reading a published key set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySetError {
    /// Transport failure talking to the key-set host
    #[error("fetching key set {uri} failed: {reason}")]
    Fetch {
        /// Key-set URI
        uri: String,
        /// Transport error description
        reason: String,
    },

    /// Fetch did not finish in time
    #[error("fetching key set {uri} timed out after {timeout:?}")]
    Timeout {
        /// Key-set URI
        uri: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Host answered with a non-success status
    #[error("key set {uri} returned status {status}")]
    Status {
        /// Key-set URI
        uri: String,
        /// HTTP status code
        status: u16,
    },

    /// Response body is not a key-set document
    #[error("key set {uri} is not a valid document: {reason}")]
    InvalidDocument {
        /// Key-set URI
        uri: String,
        /// Parser failure description
        reason: String,
    },

    /// Document fetched but the key is absent or unusable
    #[error(transparent)]
    Key(#[from] SignatureError),
}

impl KeySetError {
    /// Whether retrying the fetch later could succeed.
    ///
    /// The cache never retries; this is for the transport layer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidDocument { .. } | Self::Key(_) => false,
        }
    }

    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Key(err) => err.kind(),
            _ => ErrorKind::InvalidKey,
        }
    }
}
