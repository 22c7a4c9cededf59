//! Error taxonomy shared by every component.
//!
//! Each component has its own strongly-typed error enum carrying context.
//! All of them map onto [`ErrorKind`] so transport layers can pick a response
//! (reject as unauthenticated, reject as malformed, ask for a fresh proof)
//! without matching on component internals.
//!
//! Every cryptographic or replay violation is terminal for the message it was
//! raised for. Nothing in this crate retries.

use std::fmt;

use thiserror::Error;

use crate::{dpop::ProofError, group::GroupError, ratchet::RatchetError, signature::SignatureError};

/// Coarse classification of protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Malformed signature header, failed verification, unsupported algorithm
    SignatureInvalid,
    /// Signature or proof older than the tolerated skew, or past its expiry
    Expired,
    /// AEAD tag mismatch or corrupt ciphertext
    DecryptionFailed,
    /// Nonce or sequence number already seen
    NonceReused,
    /// Per-device counter did not increase
    CounterRegression,
    /// Timestamp outside the accepted window or moving backwards
    TimestampSkew,
    /// Key lookup miss or wrong key type
    InvalidKey,
    /// Operation not permitted in the current state
    InvalidOperation,
}

impl ErrorKind {
    /// Stable identifier, suitable for log fields and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::DecryptionFailed => "decryption_failed",
            Self::NonceReused => "nonce_reused",
            Self::CounterRegression => "counter_regression",
            Self::TimestampSkew => "timestamp_skew",
            Self::InvalidKey => "invalid_key",
            Self::InvalidOperation => "invalid_operation",
        }
    }

    /// Whether the failure is attributable to the request's authentication
    /// (maps to a 401-class response) rather than its shape (400-class).
    pub fn is_authentication_failure(self) -> bool {
        matches!(self, Self::SignatureInvalid | Self::Expired | Self::InvalidKey)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure raised by the core engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Pairwise session failure
    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    /// Group key tree failure
    #[error(transparent)]
    Group(#[from] GroupError),

    /// Signature codec failure
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Possession proof failure
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// Envelope could not be serialized or parsed
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Parser failure description
        reason: String,
    },
}

impl ProtocolError {
    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ratchet(err) => err.kind(),
            Self::Group(err) => err.kind(),
            Self::Signature(err) => err.kind(),
            Self::Proof(err) => err.kind(),
            Self::MalformedEnvelope { .. } => ErrorKind::SignatureInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_identifiers_are_unique() {
        let kinds = [
            ErrorKind::SignatureInvalid,
            ErrorKind::Expired,
            ErrorKind::DecryptionFailed,
            ErrorKind::NonceReused,
            ErrorKind::CounterRegression,
            ErrorKind::TimestampSkew,
            ErrorKind::InvalidKey,
            ErrorKind::InvalidOperation,
        ];
        let names: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();

        assert_eq!(names.len(), kinds.len());
    }

    #[test]
    fn authentication_failures_are_distinguished() {
        assert!(ErrorKind::SignatureInvalid.is_authentication_failure());
        assert!(ErrorKind::Expired.is_authentication_failure());
        assert!(!ErrorKind::NonceReused.is_authentication_failure());
        assert!(!ErrorKind::DecryptionFailed.is_authentication_failure());
    }

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let err = ProtocolError::from(RatchetError::Replayed { sequence: 3 });
        assert_eq!(err.kind(), ErrorKind::NonceReused);
    }
}
