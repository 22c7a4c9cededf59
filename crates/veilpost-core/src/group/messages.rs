//! Wire types exchanged between group members

use serde::{Deserialize, Serialize};
use veilpost_crypto::{KEY_SIZE, NONCE_SIZE, SealedBox};

use crate::encoding::{b64, b64_array, b64_keys, b64_optional_keys};

/// Membership change carried by an update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupChange {
    /// New leaf appended for `member_id`
    Add {
        /// Identifier of the new member
        member_id: String,
        /// New member's leaf public key
        #[serde(with = "b64_array")]
        public_key: [u8; KEY_SIZE],
    },
    /// Leaf blanked
    Remove {
        /// Leaf index of the removed member
        member_index: u32,
    },
    /// Committer refreshed its own keys only
    Update,
}

/// A path secret sealed to one node of a copath resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPathSecret {
    /// Sender's ephemeral X25519 key
    #[serde(with = "b64_array")]
    pub ephemeral_public_key: [u8; KEY_SIZE],
    /// AEAD nonce
    #[serde(with = "b64_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Sealed 32-byte path secret
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

impl From<SealedBox> for EncryptedPathSecret {
    fn from(sealed: SealedBox) -> Self {
        Self {
            ephemeral_public_key: sealed.ephemeral_public,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        }
    }
}

impl From<&EncryptedPathSecret> for SealedBox {
    fn from(secret: &EncryptedPathSecret) -> Self {
        Self {
            ephemeral_public: secret.ephemeral_public_key,
            nonce: secret.nonce,
            ciphertext: secret.ciphertext.clone(),
        }
    }
}

/// Key refresh broadcast by the member that changed the group.
///
/// ```json
/// {"senderIndex": 0, "leafPublicKey": "<b64url>", "pathPublicKeys": ["<b64url>"],
///  "epoch": 1, "change": {"type": "update"}, "encryptedPathSecrets": [[...]]}
/// ```
///
/// `path_public_keys[i]` and `encrypted_path_secrets[i]` both describe the
/// sender's `i`-th ancestor. The secrets for that ancestor are sealed to each
/// node of the resolution of the matching copath child, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePath {
    /// Committer's leaf index
    pub sender_index: u32,
    /// Committer's refreshed leaf key
    #[serde(with = "b64_array")]
    pub leaf_public_key: [u8; KEY_SIZE],
    /// Refreshed ancestor keys, leaf to root
    #[serde(with = "b64_keys")]
    pub path_public_keys: Vec<[u8; KEY_SIZE]>,
    /// Epoch this path creates
    pub epoch: u64,
    /// Membership change applied before the refresh
    pub change: GroupChange,
    /// Sealed ancestor path secrets
    pub encrypted_path_secrets: Vec<Vec<EncryptedPathSecret>>,
}

/// Everything a newly added member needs to join at the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    /// Group identifier
    pub group_id: String,
    /// Epoch the joiner enters at
    pub epoch: u64,
    /// Public keys of every tree node, array order
    #[serde(with = "b64_optional_keys")]
    pub tree: Vec<Option<[u8; KEY_SIZE]>>,
    /// Member id per leaf, `None` for removed leaves
    pub leaves: Vec<Option<String>>,
    /// The joiner's leaf index
    pub member_index: u32,
    /// Node whose path secret is sealed below (lowest ancestor shared with the
    /// adding member)
    pub path_secret_node: u32,
    /// Path secret of `path_secret_node`, sealed to the joiner's leaf key
    pub encrypted_path_secret: EncryptedPathSecret,
    /// Epoch secret, sealed to the joiner's leaf key
    pub encrypted_epoch_secret: EncryptedPathSecret,
}

/// Diagnostic view of a group. Never contains secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    /// Group identifier
    pub group_id: String,
    /// Current epoch
    pub epoch: u64,
    /// Active members in leaf order
    pub members: Vec<String>,
    /// Our leaf index
    pub my_index: u32,
    /// Leaves in the tree, including removed ones
    pub tree_size: u32,
}

/// Application message encrypted under the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    /// Group identifier
    pub group_id: String,
    /// Epoch the message was encrypted in
    pub epoch: u64,
    /// Sender's leaf index
    pub sender_index: u32,
    /// AEAD nonce
    #[serde(with = "b64_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with appended tag
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_path_uses_camel_case_wire_names() {
        let path = UpdatePath {
            sender_index: 2,
            leaf_public_key: [1; KEY_SIZE],
            path_public_keys: vec![[2; KEY_SIZE]],
            epoch: 4,
            change: GroupChange::Remove { member_index: 1 },
            encrypted_path_secrets: vec![Vec::new()],
        };

        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json["senderIndex"], 2);
        assert_eq!(json["epoch"], 4);
        assert_eq!(json["change"]["type"], "remove");
        assert_eq!(json["change"]["memberIndex"], 1);
        assert_eq!(json["pathPublicKeys"].as_array().unwrap().len(), 1);

        let parsed: UpdatePath = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn add_change_carries_member_key() {
        let change = GroupChange::Add { member_id: "bob".into(), public_key: [7; KEY_SIZE] };
        let json = serde_json::to_value(&change).unwrap();

        assert_eq!(json["type"], "add");
        assert_eq!(json["memberId"], "bob");
        assert!(json["publicKey"].is_string());
    }
}
