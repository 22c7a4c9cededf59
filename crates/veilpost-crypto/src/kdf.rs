//! Key derivation using HKDF-SHA256
//!
//! Every derived key is bound to a context label. Two derivations from the
//! same input keying material with different labels are independent, which
//! is what lets one chain key yield both a message key and its successor.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::secret::{KEY_SIZE, SecretKey};

/// Salt used when the caller has none: 32 zero bytes.
const ZERO_SALT: [u8; KEY_SIZE] = [0u8; KEY_SIZE];

/// Label for the initial root key of a pairwise session
pub const ROOT_INIT_LABEL: &[u8] = b"root-init";

/// Label for the initial sending (initiator) / receiving (responder) chain
pub const SENDING_INIT_LABEL: &[u8] = b"sending-init";

/// Label for a one-time message key derived from a chain key
pub const MESSAGE_KEY_LABEL: &[u8] = b"message-key";

/// Label for the successor of a chain key
pub const CHAIN_KEY_LABEL: &[u8] = b"chain-key";

/// Label for a root-key ratchet step
pub const ROOT_RATCHET_LABEL: &[u8] = b"root-ratchet";

/// Derive a 32-byte key from `ikm` under `label` with an all-zero salt.
///
/// # Security
///
/// - Deterministic: same inputs always produce the same key
/// - Distinct labels give independent keys from the same `ikm`
pub fn derive_key(ikm: &[u8], label: &[u8]) -> SecretKey {
    derive_key_with_salt(&ZERO_SALT, ikm, label)
}

/// Derive a 32-byte key from `ikm` with an explicit salt and info string.
#[allow(clippy::expect_used)]
pub fn derive_key_with_salt(salt: &[u8], ikm: &[u8], info: &[u8]) -> SecretKey {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .expect("invariant: 32 bytes is a valid HKDF-SHA256 output length");

    let key = SecretKey::from_bytes(okm);
    okm.zeroize();
    key
}

/// Root-key ratchet: mix a DH output into the root key.
///
/// The current root key salts the extraction, so the new keys depend on both
/// the previous root and the fresh agreement. Returns `(new_root, chain_key)`.
#[allow(clippy::expect_used)]
pub fn kdf_root(root_key: &SecretKey, dh_output: &SecretKey) -> (SecretKey, SecretKey) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key.as_bytes()), dh_output.as_bytes());

    let mut okm = [0u8; 2 * KEY_SIZE];
    hkdf.expand(ROOT_RATCHET_LABEL, &mut okm)
        .expect("invariant: 64 bytes is a valid HKDF-SHA256 output length");

    let (root_half, chain_half) = okm.split_at(KEY_SIZE);
    let mut root = [0u8; KEY_SIZE];
    let mut chain = [0u8; KEY_SIZE];
    root.copy_from_slice(root_half);
    chain.copy_from_slice(chain_half);
    okm.zeroize();

    (SecretKey::from_bytes(root), SecretKey::from_bytes(chain))
}

/// Symmetric chain step. Returns `(message_key, next_chain_key)`.
///
/// The caller owns zeroizing the previous chain key; both outputs zeroize on
/// drop.
pub fn kdf_chain(chain_key: &SecretKey) -> (SecretKey, SecretKey) {
    let message_key = derive_key(chain_key.as_bytes(), MESSAGE_KEY_LABEL);
    let next_chain_key = derive_key(chain_key.as_bytes(), CHAIN_KEY_LABEL);
    (message_key, next_chain_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key(&[1u8; 32], ROOT_INIT_LABEL);
        let b = derive_key(&[1u8; 32], ROOT_INIT_LABEL);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn labels_separate_domains() {
        let ikm = [9u8; 32];
        let root = derive_key(&ikm, ROOT_INIT_LABEL);
        let sending = derive_key(&ikm, SENDING_INIT_LABEL);
        assert_ne!(root.as_bytes(), sending.as_bytes());
    }

    #[test]
    fn chain_step_outputs_differ_from_input_and_each_other() {
        let chain = SecretKey::from_bytes([3u8; 32]);
        let (message, next) = kdf_chain(&chain);

        assert_ne!(message.as_bytes(), next.as_bytes());
        assert_ne!(message.as_bytes(), chain.as_bytes());
        assert_ne!(next.as_bytes(), chain.as_bytes());
    }

    #[test]
    fn root_ratchet_depends_on_both_inputs() {
        let root_a = SecretKey::from_bytes([1u8; 32]);
        let root_b = SecretKey::from_bytes([2u8; 32]);
        let dh_a = SecretKey::from_bytes([5u8; 32]);
        let dh_b = SecretKey::from_bytes([6u8; 32]);

        let (r1, c1) = kdf_root(&root_a, &dh_a);
        let (r2, c2) = kdf_root(&root_b, &dh_a);
        let (r3, c3) = kdf_root(&root_a, &dh_b);

        assert_ne!(r1.as_bytes(), r2.as_bytes());
        assert_ne!(r1.as_bytes(), r3.as_bytes());
        assert_ne!(c1.as_bytes(), c2.as_bytes());
        assert_ne!(c1.as_bytes(), c3.as_bytes());
        assert_ne!(r1.as_bytes(), c1.as_bytes());
    }

    #[test]
    fn salt_changes_output() {
        let a = derive_key_with_salt(&[0u8; 32], b"ikm", b"info");
        let b = derive_key_with_salt(&[1u8; 32], b"ikm", b"info");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
