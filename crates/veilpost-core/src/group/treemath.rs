//! Array-tree arithmetic.
//!
//! Nodes of a complete binary tree laid out in an array: leaves at even
//! indices, parents at odd ones. Leaf `i` sits at node `2i`. A node's level
//! is the number of trailing one bits in its index. The tree always has a
//! power-of-two leaf capacity, so growing it only appends nodes and never
//! renumbers existing ones: the old root becomes the new root's left child.
//!
//! ```text
//!               3
//!         ┌─────┴─────┐
//!         1           5
//!      ┌──┴──┐     ┌──┴──┐
//!      0     2     4     6
//!   leaf 0  leaf 1  leaf 2  leaf 3
//! ```

/// Node index of a leaf.
pub fn leaf_to_node(leaf: u32) -> u32 {
    leaf * 2
}

/// Leaf index of a leaf node.
pub fn node_to_leaf(node: u32) -> u32 {
    node / 2
}

/// Whether a node index is a leaf.
pub fn is_leaf(node: u32) -> bool {
    node % 2 == 0
}

/// Height of a node above the leaves.
pub fn level(node: u32) -> u32 {
    node.trailing_ones()
}

/// Number of nodes in a tree with `capacity` leaves (a power of two).
pub fn node_width(capacity: u32) -> u32 {
    2 * capacity - 1
}

/// Root node of a tree with `capacity` leaves (a power of two).
pub fn root(capacity: u32) -> u32 {
    capacity - 1
}

/// Left child of a parent node; `None` for leaves.
pub fn left(node: u32) -> Option<u32> {
    let k = level(node);
    (k > 0).then(|| node ^ (1 << (k - 1)))
}

/// Right child of a parent node; `None` for leaves.
pub fn right(node: u32) -> Option<u32> {
    let k = level(node);
    (k > 0).then(|| node ^ (3 << (k - 1)))
}

/// Parent of a node in an unbounded complete tree.
pub fn parent(node: u32) -> u32 {
    let k = level(node);
    let b = (node >> (k + 1)) & 1;
    (node | (1 << k)) ^ (b << (k + 1))
}

/// The other child of `node`'s parent.
pub fn sibling(node: u32) -> u32 {
    let p = parent(node);
    let k = level(p);
    if node < p { p ^ (3 << (k - 1)) } else { p ^ (1 << (k - 1)) }
}

/// Ancestors of `node` from its parent up to and including the root.
pub fn direct_path(node: u32, capacity: u32) -> Vec<u32> {
    let root = root(capacity);
    let mut path = Vec::new();
    let mut current = node;
    while current != root {
        current = parent(current);
        path.push(current);
    }
    path
}

/// Siblings of `node` and of each ancestor below the root.
///
/// Index-aligned with [`direct_path`]: `copath[i]` is the child of
/// `direct_path[i]` that is not on the path.
pub fn copath(node: u32, capacity: u32) -> Vec<u32> {
    let mut path = vec![node];
    path.extend(direct_path(node, capacity));
    path.pop();
    path.into_iter().map(sibling).collect()
}

/// Lowest common ancestor of two distinct leaves.
pub fn common_ancestor(a: u32, b: u32) -> u32 {
    if a == b {
        return a;
    }
    let (mut x, mut y) = (a, b);
    let mut k = 0;
    while x != y {
        x >>= 1;
        y >>= 1;
        k += 1;
    }
    (x << k) + (1 << (k - 1)) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_leaf_tree_shape() {
        assert_eq!(root(4), 3);
        assert_eq!(node_width(4), 7);
        assert_eq!(left(3), Some(1));
        assert_eq!(right(3), Some(5));
        assert_eq!(left(0), None);
        assert_eq!(parent(0), 1);
        assert_eq!(parent(2), 1);
        assert_eq!(parent(4), 5);
        assert_eq!(parent(1), 3);
        assert_eq!(parent(5), 3);
    }

    #[test]
    fn paths_for_leaf_two() {
        let node = leaf_to_node(2);
        assert_eq!(direct_path(node, 4), vec![5, 3]);
        assert_eq!(copath(node, 4), vec![6, 1]);
    }

    #[test]
    fn single_leaf_tree_has_empty_paths() {
        assert_eq!(root(1), 0);
        assert!(direct_path(0, 1).is_empty());
        assert!(copath(0, 1).is_empty());
    }

    #[test]
    fn growing_keeps_old_root_as_left_child() {
        assert_eq!(left(root(4)), Some(1));
        assert_eq!(left(root(8)), Some(root(4)));
    }

    #[test]
    fn common_ancestors() {
        assert_eq!(common_ancestor(0, 2), 1);
        assert_eq!(common_ancestor(0, 4), 3);
        assert_eq!(common_ancestor(4, 6), 5);
        assert_eq!(common_ancestor(2, 12), 7);
    }

    #[test]
    fn sibling_is_involution() {
        for node in 0..14 {
            assert_eq!(sibling(sibling(node)), node);
        }
    }
}
