//! Error types for possession proofs

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors from proof creation and verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// Not a three-part compact token, or a part failed to decode
    #[error("malformed proof: {reason}")]
    Malformed {
        /// Parser failure description
        reason: String,
    },

    /// `typ` or `alg` is not `dpop+jwt` / `ES256`
    #[error("invalid proof header: {reason}")]
    InvalidHeader {
        /// Which check failed
        reason: String,
    },

    /// Embedded JWK is not a usable P-256 public key
    #[error("invalid proof key: {reason}")]
    InvalidKey {
        /// Why it was rejected
        reason: String,
    },

    /// Signature does not verify against the embedded key
    #[error("proof signature invalid")]
    SignatureInvalid,

    /// `htm` does not match the request method
    #[error("proof method mismatch: expected {expected}, got {actual}")]
    MethodMismatch {
        /// Request method
        expected: String,
        /// `htm` claim
        actual: String,
    },

    /// `htu` does not match the request URI
    #[error("proof URI mismatch: expected {expected}, got {actual}")]
    UriMismatch {
        /// Normalized request URI
        expected: String,
        /// `htu` claim
        actual: String,
    },

    /// `ath` missing, unexpected, or not the hash of the presented token
    #[error("access token binding failed: {reason}")]
    AccessTokenMismatch {
        /// Which check failed
        reason: String,
    },

    /// `exp` is in the past
    #[error("proof expired at {exp} (now {now})")]
    Expired {
        /// `exp` claim
        exp: i64,
        /// Verifier clock
        now: i64,
    },

    /// `iat` is further in the future than the tolerated skew
    #[error("proof issued in the future at {iat} (now {now})")]
    NotYetValid {
        /// `iat` claim
        iat: i64,
        /// Verifier clock
        now: i64,
    },

    /// `iat` is older than the freshness window
    #[error("proof issued at {iat} is too old (now {now})")]
    Stale {
        /// `iat` claim
        iat: i64,
        /// Verifier clock
        now: i64,
    },

    /// `jti` was already accepted
    #[error("proof {jti} already used")]
    Replayed {
        /// Reused identifier
        jti: String,
    },
}

impl ProofError {
    /// Taxonomy bucket for this failure.
    ///
    /// Time failures map to `Expired`, which tells a client to mint a new
    /// proof rather than a new access token.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired { .. } | Self::NotYetValid { .. } | Self::Stale { .. } => {
                ErrorKind::Expired
            },
            Self::InvalidKey { .. } => ErrorKind::InvalidKey,
            Self::Replayed { .. } => ErrorKind::NonceReused,
            Self::Malformed { .. }
            | Self::InvalidHeader { .. }
            | Self::SignatureInvalid
            | Self::MethodMismatch { .. }
            | Self::UriMismatch { .. }
            | Self::AccessTokenMismatch { .. } => ErrorKind::SignatureInvalid,
        }
    }
}
