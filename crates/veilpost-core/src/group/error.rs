//! Error types for the group key tree

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors from group operations.
///
/// The input state is never modified; on error the caller keeps it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// A member tried to remove itself through `remove_member`
    #[error("cannot remove own leaf {index}")]
    SelfRemoval {
        /// Our leaf index
        index: u32,
    },

    /// Leaf index beyond the tree
    #[error("leaf index {index} out of range (tree has {leaf_count} leaves)")]
    IndexOutOfRange {
        /// Requested index
        index: u32,
        /// Leaves in the tree
        leaf_count: u32,
    },

    /// Leaf already blank
    #[error("leaf {index} was already removed")]
    AlreadyRemoved {
        /// Requested index
        index: u32,
    },

    /// Member id already active in the group
    #[error("member {member_id} is already in the group")]
    DuplicateMember {
        /// Offending id
        member_id: String,
    },

    /// A member tried to apply the update path it produced itself
    #[error("cannot process own update path")]
    OwnUpdatePath,

    /// Update path targets an epoch other than the next one
    #[error("epoch mismatch: expected {expected}, got {actual}")]
    EpochMismatch {
        /// `current + 1`
        expected: u64,
        /// Epoch in the update path
        actual: u64,
    },

    /// The update path removes the local member
    #[error("removed from group {group_id}")]
    Removed {
        /// Group we were removed from
        group_id: String,
    },

    /// Update path or welcome inconsistent with the tree
    #[error("malformed update path: {reason}")]
    MalformedPath {
        /// What did not line up
        reason: String,
    },

    /// A derived node key did not match the announced public key
    #[error("derived key for node {node} does not match the announced public key")]
    PathKeyMismatch {
        /// Node index
        node: u32,
    },

    /// No sealed path secret could be opened with our keys
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure description
        reason: String,
    },

    /// Member public key unusable
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Failure description
        reason: String,
    },

    /// Welcome cannot be built or does not describe a consistent group
    #[error("invalid welcome: {reason}")]
    InvalidWelcome {
        /// What was wrong
        reason: String,
    },

    /// Epoch counter cannot advance further
    #[error("epoch counter exhausted")]
    EpochExhausted,
}

impl GroupError {
    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            Self::InvalidKey { .. } | Self::PathKeyMismatch { .. } => ErrorKind::InvalidKey,
            Self::SelfRemoval { .. }
            | Self::IndexOutOfRange { .. }
            | Self::AlreadyRemoved { .. }
            | Self::DuplicateMember { .. }
            | Self::OwnUpdatePath
            | Self::EpochMismatch { .. }
            | Self::Removed { .. }
            | Self::MalformedPath { .. }
            | Self::InvalidWelcome { .. }
            | Self::EpochExhausted => ErrorKind::InvalidOperation,
        }
    }
}
