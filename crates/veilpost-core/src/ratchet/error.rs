//! Error types for pairwise sessions

use std::fmt;

use thiserror::Error;

use crate::error::ErrorKind;

/// Which chain an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    /// Outbound chain
    Sending,
    /// Inbound chain
    Receiving,
}

impl fmt::Display for ChainDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sending => f.write_str("sending"),
            Self::Receiving => f.write_str("receiving"),
        }
    }
}

/// Errors from ratchet operations.
///
/// On every error the input state is left untouched; the caller keeps using
/// it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatchetError {
    /// Sequence number already accepted, or below the highest accepted one
    #[error("sequence {sequence} already received")]
    Replayed {
        /// Rejected sequence number
        sequence: u32,
    },

    /// Authentication failed under the current receive chain key
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong (never includes key material)
        reason: String,
    },

    /// Operation needs a chain that has not been established yet
    #[error("no {direction} chain established")]
    MissingChain {
        /// Chain that was needed
        direction: ChainDirection,
    },

    /// Peer public key unusable for key agreement
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// 32-bit sequence or chain index space exhausted
    #[error("{direction} sequence space exhausted")]
    SequenceExhausted {
        /// Chain that ran out
        direction: ChainDirection,
    },

    /// Ratchet step requested with the key already in use
    #[error("public key is already the current peer key")]
    StaleRatchetKey,
}

impl RatchetError {
    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Replayed { .. } => ErrorKind::NonceReused,
            Self::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            Self::InvalidKey { .. } => ErrorKind::InvalidKey,
            Self::MissingChain { .. } | Self::SequenceExhausted { .. } | Self::StaleRatchetKey => {
                ErrorKind::InvalidOperation
            },
        }
    }
}
