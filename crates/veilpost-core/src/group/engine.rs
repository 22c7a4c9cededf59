//! Group operations

use veilpost_crypto::{
    CryptoError, KEY_SIZE, KeyPair, SealedBox, SecretKey, aead, open_sealed, seal_to,
};
use zeroize::Zeroizing;

use super::{
    error::GroupError,
    messages::{EncryptedPathSecret, GroupChange, GroupMessage, GroupSnapshot, UpdatePath, Welcome},
    schedule,
    state::GroupState,
    tree::{RatchetTree, TreeNode},
    treemath,
};
use crate::env::Environment;

/// Leaf key pair a prospective member publishes so it can be added.
#[derive(Clone, Debug)]
pub struct MemberKeyPair {
    key_pair: KeyPair,
}

impl MemberKeyPair {
    /// Generate a fresh leaf key pair.
    pub fn generate<E: Environment>(env: &E) -> Self {
        Self { key_pair: KeyPair::from_secret_bytes(env.random_array()) }
    }

    /// Public half, handed to the member that performs the add.
    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.key_pair.public_bytes()
    }
}

/// Stateless group engine.
///
/// Every operation takes a [`GroupState`] by reference and returns a new one.
/// Callers serialize writers per group: two commits built from the same
/// epoch would fork the group.
#[derive(Clone)]
pub struct GroupKeyTree<E: Environment> {
    env: E,
}

impl<E: Environment> GroupKeyTree<E> {
    /// Create an engine over an environment.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Create a group containing only the founder, at epoch 0.
    pub fn init_group(&self, group_id: &str, founder_id: &str) -> GroupState {
        let leaf_secret = self.random_secret();
        let key_pair = schedule::node_key_pair(&leaf_secret);
        let tree = RatchetTree::single(TreeNode::owned(&key_pair, Some(leaf_secret.clone())));

        let commit_secret = schedule::commit_secret(&leaf_secret);
        let initial = SecretKey::from_bytes(schedule::INITIAL_EPOCH_SECRET);
        let epoch_secret = schedule::epoch_secret(&initial, &commit_secret, group_id, 0);

        tracing::info!(group_id, founder_id, "created group");

        GroupState {
            group_id: group_id.to_string(),
            epoch: 0,
            epoch_secret,
            tree,
            leaves: vec![Some(founder_id.to_string())],
            my_index: 0,
        }
    }

    /// Add a member and rotate the local member's path.
    ///
    /// The new leaf is appended (growing the tree when full) and its
    /// ancestors are blanked. Then the local member refreshes its own leaf
    /// and every ancestor, which moves the group to `epoch + 1`.
    ///
    /// # Errors
    ///
    /// - `DuplicateMember`: `member_id` is already active
    /// - `InvalidKey`: `member_public_key` is unusable for key agreement
    pub fn add_member(
        &self,
        state: &GroupState,
        member_id: &str,
        member_public_key: &[u8; KEY_SIZE],
    ) -> Result<(UpdatePath, GroupState), GroupError> {
        if state.index_of(member_id).is_some() {
            return Err(GroupError::DuplicateMember { member_id: member_id.to_string() });
        }

        let change =
            GroupChange::Add { member_id: member_id.to_string(), public_key: *member_public_key };
        let mut next = state.clone();
        apply_change(&mut next, &change);

        let (path, next) = self.commit(next, change)?;
        tracing::info!(group_id = %next.group_id, epoch = next.epoch, member_id, "added member");
        Ok((path, next))
    }

    /// Remove a member and rotate the local member's path.
    ///
    /// The target leaf and its ancestors are blanked (never deleted) so every
    /// other leaf keeps its index.
    ///
    /// # Errors
    ///
    /// - `SelfRemoval`: `member_index` is our own leaf
    /// - `IndexOutOfRange`: no such leaf
    /// - `AlreadyRemoved`: leaf is already blank
    pub fn remove_member(
        &self,
        state: &GroupState,
        member_index: u32,
    ) -> Result<(UpdatePath, GroupState), GroupError> {
        if member_index == state.my_index {
            return Err(GroupError::SelfRemoval { index: member_index });
        }
        check_removable(state, member_index)?;

        let change = GroupChange::Remove { member_index };
        let mut next = state.clone();
        apply_change(&mut next, &change);

        let (path, next) = self.commit(next, change)?;
        tracing::info!(group_id = %next.group_id, epoch = next.epoch, member_index, "removed member");
        Ok((path, next))
    }

    /// Refresh the local member's keys without changing membership.
    pub fn update_own_key(&self, state: &GroupState) -> Result<(UpdatePath, GroupState), GroupError> {
        let (path, next) = self.commit(state.clone(), GroupChange::Update)?;
        tracing::info!(group_id = %next.group_id, epoch = next.epoch, "refreshed own path");
        Ok((path, next))
    }

    /// Apply another member's update path.
    ///
    /// Mirrors the membership change, installs the sender's new public keys,
    /// opens the path secret sealed to us at the lowest ancestor we share with
    /// the sender, and re-derives every key above it. Each derived public key
    /// must match the announced one.
    ///
    /// # Errors
    ///
    /// - `OwnUpdatePath`: `sender_index` is our own leaf
    /// - `EpochMismatch`: path is not for `epoch + 1`
    /// - `Removed`: the path removes us
    /// - `MalformedPath`: lengths or indices inconsistent with the tree
    /// - `DecryptionFailed`: no sealed secret opens with our keys
    /// - `PathKeyMismatch`: derived keys disagree with the announced ones
    pub fn process_update_path(
        &self,
        state: &GroupState,
        path: &UpdatePath,
    ) -> Result<GroupState, GroupError> {
        if path.sender_index == state.my_index {
            return Err(GroupError::OwnUpdatePath);
        }
        let expected = state.epoch.checked_add(1).ok_or(GroupError::EpochExhausted)?;
        if path.epoch != expected {
            return Err(GroupError::EpochMismatch { expected, actual: path.epoch });
        }
        if state.member_at(path.sender_index).is_none() {
            return Err(malformed(format!("sender {} is not an active member", path.sender_index)));
        }
        self.check_incoming_change(state, path)?;

        let mut next = state.clone();
        apply_change(&mut next, &path.change);

        let sender = path.sender_index;
        let direct_path = next.tree.direct_path(sender);
        let copath = next.tree.copath(sender);
        if path.path_public_keys.len() != direct_path.len()
            || path.encrypted_path_secrets.len() != direct_path.len()
        {
            return Err(malformed(format!(
                "expected {} path entries, got {} keys and {} secret lists",
                direct_path.len(),
                path.path_public_keys.len(),
                path.encrypted_path_secrets.len()
            )));
        }

        next.tree.set(
            treemath::leaf_to_node(sender),
            TreeNode::with_public_key(path.leaf_public_key),
        );
        for (node, public_key) in direct_path.iter().zip(&path.path_public_keys) {
            next.tree.set(*node, TreeNode::with_public_key(*public_key));
        }

        let ancestor = treemath::common_ancestor(
            treemath::leaf_to_node(sender),
            treemath::leaf_to_node(next.my_index),
        );
        let position = direct_path
            .iter()
            .position(|&node| node == ancestor)
            .ok_or_else(|| malformed("no common ancestor on sender path"))?;

        let resolution = next.tree.resolution(copath[position]);
        let sealed = &path.encrypted_path_secrets[position];
        if sealed.len() != resolution.len() {
            return Err(malformed(format!(
                "expected {} sealed secrets for node {ancestor}, got {}",
                resolution.len(),
                sealed.len()
            )));
        }

        let context = schedule::path_secret_context(&next.group_id, path.epoch, ancestor);
        let mut path_secret = open_first(&next.tree, &resolution, sealed, &context)?;

        for (offset, node) in direct_path.iter().enumerate().skip(position) {
            let key_pair = schedule::node_key_pair(&path_secret);
            if key_pair.public_bytes() != path.path_public_keys[offset] {
                return Err(GroupError::PathKeyMismatch { node: *node });
            }
            next.tree.set(*node, TreeNode::owned(&key_pair, Some(path_secret.clone())));
            if offset + 1 < direct_path.len() {
                path_secret = schedule::next_path_secret(&path_secret);
            }
        }

        let commit_secret = schedule::commit_secret(&path_secret);
        next.epoch_secret =
            schedule::epoch_secret(&state.epoch_secret, &commit_secret, &next.group_id, path.epoch);
        next.epoch = path.epoch;

        tracing::info!(
            group_id = %next.group_id,
            epoch = next.epoch,
            sender_index = sender,
            "applied update path"
        );
        Ok(next)
    }

    /// Build the Welcome for a member added in the commit that produced
    /// `state`.
    ///
    /// Seals the epoch secret and the path secret of the lowest ancestor we
    /// share with the new leaf to the new member's leaf key.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange` / `AlreadyRemoved`: no active leaf at `member_index`
    /// - `InvalidWelcome`: `member_index` is ours, or we hold no path secret
    ///   for the shared ancestor (we did not perform the add)
    pub fn create_welcome(&self, state: &GroupState, member_index: u32) -> Result<Welcome, GroupError> {
        if member_index == state.my_index {
            return Err(GroupError::InvalidWelcome { reason: "cannot welcome own leaf".into() });
        }
        let leaf_key = state.leaf_public_key(member_index).ok_or_else(|| {
            if member_index >= state.tree_size() {
                GroupError::IndexOutOfRange { index: member_index, leaf_count: state.tree_size() }
            } else {
                GroupError::AlreadyRemoved { index: member_index }
            }
        })?;

        let ancestor = treemath::common_ancestor(
            treemath::leaf_to_node(state.my_index),
            treemath::leaf_to_node(member_index),
        );
        let path_secret = state
            .tree
            .node(ancestor)
            .and_then(TreeNode::path_secret)
            .ok_or_else(|| GroupError::InvalidWelcome {
                reason: format!("no path secret held for node {ancestor}"),
            })?;

        let path_context = schedule::path_secret_context(&state.group_id, state.epoch, ancestor);
        let epoch_context = schedule::welcome_context(&state.group_id, state.epoch, member_index);

        Ok(Welcome {
            group_id: state.group_id.clone(),
            epoch: state.epoch,
            tree: state.tree.public_keys(),
            leaves: state.leaves.clone(),
            member_index,
            path_secret_node: ancestor,
            encrypted_path_secret: self.seal(&leaf_key, path_secret, &path_context)?,
            encrypted_epoch_secret: self.seal(&leaf_key, &state.epoch_secret, &epoch_context)?,
        })
    }

    /// Join a group from a Welcome addressed to `key_pair`.
    ///
    /// # Errors
    ///
    /// - `InvalidWelcome`: tree shape or indices inconsistent
    /// - `InvalidKey`: the Welcome's leaf key is not `key_pair`
    /// - `DecryptionFailed`: sealed secrets do not open
    /// - `PathKeyMismatch`: derived keys disagree with the tree
    pub fn join_group(
        &self,
        welcome: &Welcome,
        key_pair: &MemberKeyPair,
    ) -> Result<GroupState, GroupError> {
        let invalid = |reason: &str| GroupError::InvalidWelcome { reason: reason.to_string() };

        let leaf_count =
            u32::try_from(welcome.leaves.len()).map_err(|_| invalid("too many leaves"))?;
        let mut tree = RatchetTree::from_public_keys(&welcome.tree, leaf_count)
            .ok_or_else(|| invalid("tree is not a complete binary tree"))?;

        let my_index = welcome.member_index;
        if welcome.leaves.get(my_index as usize).and_then(Option::as_ref).is_none() {
            return Err(invalid("member index is not an active leaf"));
        }
        if tree.leaf(my_index).and_then(TreeNode::public_key) != Some(key_pair.public_key()) {
            return Err(GroupError::InvalidKey {
                reason: "welcome is not addressed to this key".into(),
            });
        }

        let epoch_context = schedule::welcome_context(&welcome.group_id, welcome.epoch, my_index);
        let epoch_secret =
            open_secret(&key_pair.key_pair, &welcome.encrypted_epoch_secret, &epoch_context)?;

        let direct_path = tree.direct_path(my_index);
        let position = direct_path
            .iter()
            .position(|&node| node == welcome.path_secret_node)
            .ok_or_else(|| invalid("path secret node is not an ancestor"))?;
        let path_context = schedule::path_secret_context(
            &welcome.group_id,
            welcome.epoch,
            welcome.path_secret_node,
        );
        let mut path_secret =
            open_secret(&key_pair.key_pair, &welcome.encrypted_path_secret, &path_context)?;

        tree.set(treemath::leaf_to_node(my_index), TreeNode::owned(&key_pair.key_pair, None));
        for node in direct_path.iter().skip(position) {
            let node_keys = schedule::node_key_pair(&path_secret);
            if tree.node(*node).and_then(TreeNode::public_key) != Some(node_keys.public_bytes()) {
                return Err(GroupError::PathKeyMismatch { node: *node });
            }
            tree.set(*node, TreeNode::owned(&node_keys, Some(path_secret.clone())));
            path_secret = schedule::next_path_secret(&path_secret);
        }

        tracing::info!(group_id = %welcome.group_id, epoch = welcome.epoch, my_index, "joined group");

        Ok(GroupState {
            group_id: welcome.group_id.clone(),
            epoch: welcome.epoch,
            epoch_secret,
            tree,
            leaves: welcome.leaves.clone(),
            my_index,
        })
    }

    /// Diagnostic snapshot: ids, epoch and sizes only.
    pub fn export_group_state(&self, state: &GroupState) -> GroupSnapshot {
        state.snapshot()
    }

    /// Encrypt an application message under the current epoch.
    pub fn encrypt_message(&self, state: &GroupState, plaintext: &[u8]) -> GroupMessage {
        let key = schedule::application_key(&state.epoch_secret, state.my_index);
        let nonce = self.env.random_array();
        let aad = message_context(&state.group_id, state.epoch, state.my_index);
        let ciphertext = aead::seal(&key, &nonce, plaintext, &aad);

        GroupMessage {
            group_id: state.group_id.clone(),
            epoch: state.epoch,
            sender_index: state.my_index,
            nonce,
            ciphertext,
        }
    }

    /// Decrypt an application message from the current epoch.
    ///
    /// # Errors
    ///
    /// - `EpochMismatch`: message from another epoch or group
    /// - `AlreadyRemoved` / `IndexOutOfRange`: sender is not a member
    /// - `DecryptionFailed`: tampered or foreign ciphertext
    pub fn decrypt_message(
        &self,
        state: &GroupState,
        message: &GroupMessage,
    ) -> Result<Vec<u8>, GroupError> {
        if message.group_id != state.group_id || message.epoch != state.epoch {
            return Err(GroupError::EpochMismatch { expected: state.epoch, actual: message.epoch });
        }
        if state.member_at(message.sender_index).is_none() {
            return Err(if message.sender_index >= state.tree_size() {
                GroupError::IndexOutOfRange {
                    index: message.sender_index,
                    leaf_count: state.tree_size(),
                }
            } else {
                GroupError::AlreadyRemoved { index: message.sender_index }
            });
        }

        let key = schedule::application_key(&state.epoch_secret, message.sender_index);
        let aad = message_context(&state.group_id, state.epoch, message.sender_index);
        aead::open(&key, &message.nonce, &message.ciphertext, &aad).map_err(|_| {
            GroupError::DecryptionFailed { reason: "group message authentication failed".into() }
        })
    }

    /// Refresh our leaf and every ancestor, seal the new path secrets to the
    /// copath, and advance the epoch. `next` already has the change applied.
    fn commit(
        &self,
        mut next: GroupState,
        change: GroupChange,
    ) -> Result<(UpdatePath, GroupState), GroupError> {
        let epoch = next.epoch.checked_add(1).ok_or(GroupError::EpochExhausted)?;
        let my_index = next.my_index;
        let direct_path = next.tree.direct_path(my_index);
        let copath = next.tree.copath(my_index);

        let mut path_secret = self.random_secret();
        let leaf_keys = schedule::node_key_pair(&path_secret);
        next.tree.set(
            treemath::leaf_to_node(my_index),
            TreeNode::owned(&leaf_keys, Some(path_secret.clone())),
        );

        let mut path_public_keys = Vec::with_capacity(direct_path.len());
        let mut encrypted_path_secrets = Vec::with_capacity(direct_path.len());

        for (node, copath_child) in direct_path.iter().zip(&copath) {
            path_secret = schedule::next_path_secret(&path_secret);
            let node_keys = schedule::node_key_pair(&path_secret);
            let context = schedule::path_secret_context(&next.group_id, epoch, *node);

            let mut sealed = Vec::new();
            for recipient in next.tree.resolution(*copath_child) {
                let Some(public_key) = next.tree.node(recipient).and_then(TreeNode::public_key)
                else {
                    continue;
                };
                sealed.push(self.seal(&public_key, &path_secret, &context)?);
            }

            next.tree.set(*node, TreeNode::owned(&node_keys, Some(path_secret.clone())));
            path_public_keys.push(node_keys.public_bytes());
            encrypted_path_secrets.push(sealed);
        }

        let commit_secret = schedule::commit_secret(&path_secret);
        next.epoch_secret =
            schedule::epoch_secret(&next.epoch_secret, &commit_secret, &next.group_id, epoch);
        next.epoch = epoch;

        let path = UpdatePath {
            sender_index: my_index,
            leaf_public_key: leaf_keys.public_bytes(),
            path_public_keys,
            epoch,
            change,
            encrypted_path_secrets,
        };
        Ok((path, next))
    }

    /// Validate the membership change of an incoming path against our view.
    fn check_incoming_change(&self, state: &GroupState, path: &UpdatePath) -> Result<(), GroupError> {
        match &path.change {
            GroupChange::Add { member_id, .. } => {
                if state.index_of(member_id).is_some() {
                    return Err(malformed(format!("{member_id} is already a member")));
                }
            },
            GroupChange::Remove { member_index } => {
                if *member_index == state.my_index {
                    tracing::warn!(group_id = %state.group_id, "update path removes local member");
                    return Err(GroupError::Removed { group_id: state.group_id.clone() });
                }
                if *member_index == path.sender_index {
                    return Err(malformed("sender cannot remove itself"));
                }
                check_removable(state, *member_index).map_err(|err| malformed(err.to_string()))?;
            },
            GroupChange::Update => {},
        }
        Ok(())
    }

    fn seal(
        &self,
        recipient: &[u8; KEY_SIZE],
        secret: &SecretKey,
        context: &[u8],
    ) -> Result<EncryptedPathSecret, GroupError> {
        let sealed = seal_to(
            recipient,
            secret.as_bytes(),
            context,
            self.env.random_array(),
            self.env.random_array(),
        )
        .map_err(|err: CryptoError| GroupError::InvalidKey { reason: err.to_string() })?;
        Ok(sealed.into())
    }

    fn random_secret(&self) -> SecretKey {
        SecretKey::from_bytes(self.env.random_array())
    }
}

fn apply_change(state: &mut GroupState, change: &GroupChange) {
    match change {
        GroupChange::Add { member_id, public_key } => {
            let leaf = state.tree.push_leaf(TreeNode::with_public_key(*public_key));
            state.leaves.push(Some(member_id.clone()));
            state.tree.blank_direct_path(leaf);
        },
        GroupChange::Remove { member_index } => {
            state.tree.blank(treemath::leaf_to_node(*member_index));
            state.tree.blank_direct_path(*member_index);
            if let Some(slot) = state.leaves.get_mut(*member_index as usize) {
                *slot = None;
            }
        },
        GroupChange::Update => {},
    }
}

fn check_removable(state: &GroupState, member_index: u32) -> Result<(), GroupError> {
    if member_index >= state.tree_size() {
        return Err(GroupError::IndexOutOfRange {
            index: member_index,
            leaf_count: state.tree_size(),
        });
    }
    if state.member_at(member_index).is_none() {
        return Err(GroupError::AlreadyRemoved { index: member_index });
    }
    Ok(())
}

/// Open the first sealed secret addressed to a node we hold a key for.
fn open_first(
    tree: &RatchetTree,
    resolution: &[u32],
    sealed: &[EncryptedPathSecret],
    context: &[u8],
) -> Result<SecretKey, GroupError> {
    for (node, secret) in resolution.iter().zip(sealed) {
        if let Some(key_pair) = tree.node(*node).and_then(TreeNode::key_pair) {
            return open_secret(&key_pair, secret, context);
        }
    }
    Err(GroupError::DecryptionFailed { reason: "no path secret addressed to our keys".into() })
}

fn open_secret(
    key_pair: &KeyPair,
    sealed: &EncryptedPathSecret,
    context: &[u8],
) -> Result<SecretKey, GroupError> {
    let plaintext = Zeroizing::new(
        open_sealed(key_pair, &SealedBox::from(sealed), context)
            .map_err(|err| GroupError::DecryptionFailed { reason: err.to_string() })?,
    );
    SecretKey::from_slice(&plaintext)
        .ok_or_else(|| GroupError::DecryptionFailed { reason: "sealed secret has wrong length".into() })
}

fn message_context(group_id: &str, epoch: u64, sender_index: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(group_id.len() + 12);
    aad.extend_from_slice(group_id.as_bytes());
    aad.extend_from_slice(&epoch.to_be_bytes());
    aad.extend_from_slice(&sender_index.to_be_bytes());
    aad
}

fn malformed(reason: impl Into<String>) -> GroupError {
    GroupError::MalformedPath { reason: reason.into() }
}
