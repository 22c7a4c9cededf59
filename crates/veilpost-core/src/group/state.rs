//! Group state value

use std::fmt;

use veilpost_crypto::{KEY_SIZE, SecretKey};

use super::{messages::GroupSnapshot, tree::RatchetTree};

/// Immutable snapshot of one member's view of a group.
///
/// # Invariants
///
/// - `leaves.len() == tree.leaf_count()`; a removed member keeps its slot as
///   `None` and its leaf stays blank, so indices never shift
/// - `epoch` strictly increases across the states a member adopts
/// - `epoch_secret` is derived afresh for every epoch
#[derive(Clone)]
pub struct GroupState {
    pub(crate) group_id: String,
    pub(crate) epoch: u64,
    pub(crate) epoch_secret: SecretKey,
    pub(crate) tree: RatchetTree,
    pub(crate) leaves: Vec<Option<String>>,
    pub(crate) my_index: u32,
}

impl GroupState {
    /// Group identifier.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Shared secret for the current epoch.
    pub fn epoch_secret(&self) -> &SecretKey {
        &self.epoch_secret
    }

    /// Our leaf index.
    pub fn my_index(&self) -> u32 {
        self.my_index
    }

    /// Active member ids in leaf order.
    pub fn members(&self) -> Vec<String> {
        self.leaves.iter().flatten().cloned().collect()
    }

    /// Member id at a leaf, `None` if out of range or removed.
    pub fn member_at(&self, leaf: u32) -> Option<&str> {
        self.leaves.get(leaf as usize)?.as_deref()
    }

    /// Leaf index of an active member.
    pub fn index_of(&self, member_id: &str) -> Option<u32> {
        self.leaves.iter().position(|m| m.as_deref() == Some(member_id)).map(|i| i as u32)
    }

    /// Leaves in the tree, including removed ones.
    pub fn tree_size(&self) -> u32 {
        self.tree.leaf_count()
    }

    /// Public key of a leaf; `None` for removed leaves and out-of-range
    /// indices.
    pub fn leaf_public_key(&self, leaf: u32) -> Option<[u8; KEY_SIZE]> {
        self.tree.leaf(leaf).and_then(|node| node.public_key())
    }

    /// The ratchet tree.
    pub fn tree(&self) -> &RatchetTree {
        &self.tree
    }

    /// Secret-free summary for diagnostics.
    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            members: self.members(),
            my_index: self.my_index,
            tree_size: self.tree_size(),
        }
    }
}

impl fmt::Debug for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupState")
            .field("group_id", &self.group_id)
            .field("epoch", &self.epoch)
            .field("members", &self.leaves)
            .field("my_index", &self.my_index)
            .finish_non_exhaustive()
    }
}
