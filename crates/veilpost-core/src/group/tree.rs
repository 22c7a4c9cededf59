//! Ratchet tree storage

use std::fmt;

use veilpost_crypto::{KEY_SIZE, KeyPair, SecretKey};

use super::treemath;

/// One node of the ratchet tree.
///
/// Every member sees the same public keys. Private keys and path secrets are
/// present only for nodes the local member owns or derived while processing
/// a path update.
#[derive(Clone, Default)]
pub struct TreeNode {
    public_key: Option<[u8; KEY_SIZE]>,
    private_key: Option<SecretKey>,
    path_secret: Option<SecretKey>,
}

impl TreeNode {
    /// Node known only by its public key.
    pub fn with_public_key(public_key: [u8; KEY_SIZE]) -> Self {
        Self { public_key: Some(public_key), private_key: None, path_secret: None }
    }

    /// Node whose private key we hold.
    pub(crate) fn owned(key_pair: &KeyPair, path_secret: Option<SecretKey>) -> Self {
        Self {
            public_key: Some(key_pair.public_bytes()),
            private_key: Some(key_pair.secret()),
            path_secret,
        }
    }

    /// Public key, `None` when blank.
    pub fn public_key(&self) -> Option<[u8; KEY_SIZE]> {
        self.public_key
    }

    /// Whether the node is blank (removed member or invalidated parent).
    pub fn is_blank(&self) -> bool {
        self.public_key.is_none()
    }

    /// Whether we hold the private key.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub(crate) fn key_pair(&self) -> Option<KeyPair> {
        self.private_key.as_ref().map(KeyPair::from_secret)
    }

    pub(crate) fn path_secret(&self) -> Option<&SecretKey> {
        self.path_secret.as_ref()
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("blank", &self.is_blank())
            .field("owned", &self.has_private_key())
            .finish()
    }
}

/// Complete binary tree of member keys.
///
/// # Invariants
///
/// - `nodes.len() == 2 * capacity - 1` with `capacity` a power of two
/// - `leaf_count <= capacity`; leaves at or beyond `leaf_count` are blank
/// - Leaf indices are never reused or renumbered; removal leaves a blank
#[derive(Clone, Debug)]
pub struct RatchetTree {
    nodes: Vec<TreeNode>,
    leaf_count: u32,
}

impl RatchetTree {
    /// Tree holding a single leaf.
    pub(crate) fn single(leaf: TreeNode) -> Self {
        Self { nodes: vec![leaf], leaf_count: 1 }
    }

    /// Rebuild a tree from public keys (as carried in a Welcome).
    ///
    /// Returns `None` if the node count is not a complete tree or cannot hold
    /// `leaf_count` leaves.
    pub(crate) fn from_public_keys(
        public_keys: &[Option<[u8; KEY_SIZE]>],
        leaf_count: u32,
    ) -> Option<Self> {
        let width = u32::try_from(public_keys.len()).ok()?;
        let capacity = (width + 1) / 2;
        if leaf_count == 0
            || !capacity.is_power_of_two()
            || treemath::node_width(capacity) != width
            || leaf_count > capacity
        {
            return None;
        }

        let nodes = public_keys
            .iter()
            .map(|key| TreeNode { public_key: *key, private_key: None, path_secret: None })
            .collect();
        Some(Self { nodes, leaf_count })
    }

    /// Number of leaves ever added, including blanked ones.
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// Leaf slots available before the tree must grow.
    pub fn capacity(&self) -> u32 {
        (self.nodes.len() as u32 + 1) / 2
    }

    /// Node by array index.
    pub fn node(&self, index: u32) -> Option<&TreeNode> {
        self.nodes.get(index as usize)
    }

    /// Leaf node by leaf index.
    pub fn leaf(&self, leaf: u32) -> Option<&TreeNode> {
        if leaf >= self.leaf_count {
            return None;
        }
        self.node(treemath::leaf_to_node(leaf))
    }

    /// Public keys of all nodes in array order.
    pub fn public_keys(&self) -> Vec<Option<[u8; KEY_SIZE]>> {
        self.nodes.iter().map(TreeNode::public_key).collect()
    }

    /// Ancestors of a leaf, bottom to top.
    pub fn direct_path(&self, leaf: u32) -> Vec<u32> {
        treemath::direct_path(treemath::leaf_to_node(leaf), self.capacity())
    }

    /// Copath of a leaf, aligned with [`Self::direct_path`].
    pub fn copath(&self, leaf: u32) -> Vec<u32> {
        treemath::copath(treemath::leaf_to_node(leaf), self.capacity())
    }

    /// Minimal set of non-blank nodes covering every leaf below `index`.
    pub fn resolution(&self, index: u32) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_resolution(index, &mut out);
        out
    }

    fn collect_resolution(&self, index: u32, out: &mut Vec<u32>) {
        let Some(node) = self.node(index) else {
            return;
        };
        if !node.is_blank() {
            out.push(index);
            return;
        }
        if let (Some(left), Some(right)) = (treemath::left(index), treemath::right(index)) {
            self.collect_resolution(left, out);
            self.collect_resolution(right, out);
        }
    }

    /// Append a leaf, doubling capacity when full. Returns its leaf index.
    pub(crate) fn push_leaf(&mut self, leaf: TreeNode) -> u32 {
        if self.leaf_count == self.capacity() {
            let new_width = treemath::node_width(self.capacity() * 2) as usize;
            self.nodes.resize_with(new_width, TreeNode::default);
        }
        let index = self.leaf_count;
        self.nodes[treemath::leaf_to_node(index) as usize] = leaf;
        self.leaf_count += 1;
        index
    }

    /// Overwrite a node.
    pub(crate) fn set(&mut self, index: u32, node: TreeNode) {
        if let Some(slot) = self.nodes.get_mut(index as usize) {
            *slot = node;
        }
    }

    /// Blank one node.
    pub(crate) fn blank(&mut self, index: u32) {
        self.set(index, TreeNode::default());
    }

    /// Blank every ancestor of a leaf.
    pub(crate) fn blank_direct_path(&mut self, leaf: u32) {
        for index in self.direct_path(leaf) {
            self.blank(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(byte: u8) -> TreeNode {
        TreeNode::with_public_key([byte; KEY_SIZE])
    }

    #[test]
    fn push_grows_to_next_power_of_two() {
        let mut tree = RatchetTree::single(member(1));
        assert_eq!(tree.capacity(), 1);

        assert_eq!(tree.push_leaf(member(2)), 1);
        assert_eq!(tree.capacity(), 2);

        assert_eq!(tree.push_leaf(member(3)), 2);
        assert_eq!(tree.capacity(), 4);
        assert_eq!(tree.public_keys().len(), 7);
        assert_eq!(tree.leaf(2).unwrap().public_key(), Some([3; KEY_SIZE]));
        assert!(tree.leaf(3).is_none(), "padding slot is not a leaf");
    }

    #[test]
    fn resolution_skips_blank_nodes() {
        let mut tree = RatchetTree::single(member(1));
        tree.push_leaf(member(2));
        tree.push_leaf(member(3));

        // all parents blank: resolution of the root is every leaf
        assert_eq!(tree.resolution(3), vec![0, 2, 4]);

        tree.set(1, member(9));
        assert_eq!(tree.resolution(3), vec![1, 4]);

        tree.blank(4);
        assert_eq!(tree.resolution(5), Vec::<u32>::new());
    }

    #[test]
    fn from_public_keys_rejects_incomplete_trees() {
        assert!(RatchetTree::from_public_keys(&[None, None], 1).is_none());
        assert!(RatchetTree::from_public_keys(&[None, None, None], 3).is_none());
        assert!(RatchetTree::from_public_keys(&[Some([1; 32]), None, None], 2).is_some());
    }
}
