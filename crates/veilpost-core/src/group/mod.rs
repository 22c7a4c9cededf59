//! Tree-based group key agreement.
//!
//! Each member holds a [`GroupState`]: a complete binary tree of X25519 keys
//! with members at the leaves, plus one epoch secret shared by every member.
//! Any membership change (add, remove, or a plain key refresh) is a commit:
//! the committing member draws a fresh leaf secret, hashes it up its direct
//! path to the root, and seals each ancestor's path secret to the copath so
//! every other member can follow. The root path secret feeds the next epoch
//! secret.
//!
//! # Security
//!
//! - Removed members lose future access: their leaf and ancestors are
//!   blanked before the commit, so no path secret is sealed to any key they
//!   hold
//! - Every epoch secret mixes in fresh leaf material and the previous epoch
//!   secret, so no two epochs share a secret
//! - Receivers check every derived node key against the announced public key
//!   and reject paths that disagree
//!
//! # Invariants
//!
//! - Leaf indices are stable for the life of the group
//! - Epochs advance by exactly one per processed update path

mod engine;
mod error;
mod messages;
mod schedule;
mod state;
mod tree;
pub mod treemath;

pub use engine::{GroupKeyTree, MemberKeyPair};
pub use error::GroupError;
pub use messages::{EncryptedPathSecret, GroupChange, GroupMessage, GroupSnapshot, UpdatePath, Welcome};
pub use state::GroupState;
pub use tree::{RatchetTree, TreeNode};
