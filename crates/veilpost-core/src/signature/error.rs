//! Error types for request and receipt signatures

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors from signature construction, parsing, and verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// `Signature-Input` or `Signature` header could not be parsed
    #[error("malformed {header} header: {reason}")]
    MalformedHeader {
        /// Which header
        header: &'static str,
        /// Parser failure description
        reason: String,
    },

    /// A covered field is absent from the request
    #[error("covered component {name} missing from request")]
    MissingComponent {
        /// Field name as listed in the covered components
        name: String,
    },

    /// `created` is further from now than the tolerated clock skew
    #[error("signature created at {created} outside {tolerance_secs}s of now ({now})")]
    ClockSkew {
        /// `created` parameter
        created: i64,
        /// Verifier clock
        now: i64,
        /// Tolerance in seconds
        tolerance_secs: u64,
    },

    /// `expires` is in the past
    #[error("signature expired at {expires} (now {now})")]
    Expired {
        /// `expires` parameter
        expires: i64,
        /// Verifier clock
        now: i64,
    },

    /// `alg` names an algorithm this codec does not verify
    #[error("unsupported signature algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// Offending `alg` value
        algorithm: String,
    },

    /// Signature did not verify over the rebuilt base
    #[error("signature verification failed")]
    VerificationFailed,

    /// `Content-Digest` does not match the body
    #[error("content digest mismatch")]
    DigestMismatch,

    /// Key-set entry unusable for verification
    #[error("invalid key {key_id}: {reason}")]
    InvalidKey {
        /// `kid` of the entry
        key_id: String,
        /// Why it was rejected
        reason: String,
    },

    /// No key with this id in the key set
    #[error("key {key_id} not found in key set")]
    KeyNotFound {
        /// Requested `kid`
        key_id: String,
    },
}

impl SignatureError {
    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ClockSkew { .. } | Self::Expired { .. } => ErrorKind::Expired,
            Self::InvalidKey { .. } | Self::KeyNotFound { .. } => ErrorKind::InvalidKey,
            Self::MalformedHeader { .. }
            | Self::MissingComponent { .. }
            | Self::UnsupportedAlgorithm { .. }
            | Self::VerificationFailed
            | Self::DigestMismatch => ErrorKind::SignatureInvalid,
        }
    }
}
