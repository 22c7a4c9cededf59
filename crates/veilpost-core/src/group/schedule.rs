//! Group key schedule
//!
//! ```text
//! leaf path secret ─"path"─▶ parent path secret ─"path"─▶ ... ─▶ root path secret
//!        │                          │                                │
//!      "node"                     "node"                          "commit"
//!        ▼                          ▼                                ▼
//!   leaf key pair             parent key pair                  commit secret
//!
//! epoch secret(n) = HKDF(salt = epoch secret(n-1), ikm = commit secret,
//!                        info = "epoch-secret" || group id || n)
//! ```
//!
//! Each epoch secret mixes the previous one with a commit secret derived from
//! freshly generated leaf material, so no two epochs share a secret.

use veilpost_crypto::{KEY_SIZE, KeyPair, SecretKey, derive_key, derive_key_with_salt};

const PATH_LABEL: &[u8] = b"path";
const NODE_LABEL: &[u8] = b"node";
const COMMIT_LABEL: &[u8] = b"commit";
const EPOCH_LABEL: &[u8] = b"epoch-secret";
const APPLICATION_LABEL: &[u8] = b"application";
const PATH_SECRET_CONTEXT: &[u8] = b"veilpost-path-secret";
const WELCOME_CONTEXT: &[u8] = b"veilpost-welcome";

/// Epoch secret chained from before the group's first epoch.
pub(crate) const INITIAL_EPOCH_SECRET: [u8; KEY_SIZE] = [0u8; KEY_SIZE];

pub(crate) fn next_path_secret(path_secret: &SecretKey) -> SecretKey {
    derive_key(path_secret.as_bytes(), PATH_LABEL)
}

pub(crate) fn node_key_pair(path_secret: &SecretKey) -> KeyPair {
    let seed = derive_key(path_secret.as_bytes(), NODE_LABEL);
    KeyPair::from_secret(&seed)
}

pub(crate) fn commit_secret(root_path_secret: &SecretKey) -> SecretKey {
    derive_key(root_path_secret.as_bytes(), COMMIT_LABEL)
}

pub(crate) fn epoch_secret(
    previous: &SecretKey,
    commit_secret: &SecretKey,
    group_id: &str,
    epoch: u64,
) -> SecretKey {
    let mut info = Vec::with_capacity(EPOCH_LABEL.len() + group_id.len() + 8);
    info.extend_from_slice(EPOCH_LABEL);
    info.extend_from_slice(group_id.as_bytes());
    info.extend_from_slice(&epoch.to_be_bytes());
    derive_key_with_salt(previous.as_bytes(), commit_secret.as_bytes(), &info)
}

/// Per-sender application key for group messages in one epoch.
pub(crate) fn application_key(epoch_secret: &SecretKey, sender_index: u32) -> SecretKey {
    derive_key_with_salt(&sender_index.to_be_bytes(), epoch_secret.as_bytes(), APPLICATION_LABEL)
}

/// Associated data binding a sealed path secret to its group, epoch and node.
pub(crate) fn path_secret_context(group_id: &str, epoch: u64, node: u32) -> Vec<u8> {
    context(PATH_SECRET_CONTEXT, group_id, epoch, node)
}

/// Associated data for secrets sealed inside a Welcome.
pub(crate) fn welcome_context(group_id: &str, epoch: u64, leaf: u32) -> Vec<u8> {
    context(WELCOME_CONTEXT, group_id, epoch, leaf)
}

fn context(label: &[u8], group_id: &str, epoch: u64, index: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(label.len() + 4 + group_id.len() + 12);
    aad.extend_from_slice(label);
    aad.extend_from_slice(&(group_id.len() as u32).to_be_bytes());
    aad.extend_from_slice(group_id.as_bytes());
    aad.extend_from_slice(&epoch.to_be_bytes());
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}
