//! Public-key sealing to an X25519 recipient
//!
//! A single-shot construction used to deliver path secrets to tree nodes:
//! ephemeral X25519 agreement, HKDF over the agreement salted with both
//! public keys, then `XChaCha20-Poly1305` under the derived key.
//!
//! # Security
//!
//! - The ephemeral key is fresh per seal, so two seals of the same secret to
//!   the same recipient are unlinkable
//! - Both public keys are mixed into the key schedule, which binds the
//!   ciphertext to its intended recipient
//! - Associated data lets the caller bind context (group, epoch) into the tag

use crate::{
    aead::{self, NONCE_SIZE},
    dh::KeyPair,
    error::CryptoError,
    kdf::derive_key_with_salt,
    secret::{KEY_SIZE, SecretKey},
};

/// Label for sealed-box key derivation
const SEALED_BOX_LABEL: &[u8] = b"veilpost-sealed-box";

/// Ciphertext addressed to one X25519 public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Sender's ephemeral public key
    pub ephemeral_public: [u8; KEY_SIZE],
    /// AEAD nonce
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with appended tag
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` to `recipient_public`.
///
/// `ephemeral_seed` and `nonce` must come from a secure RNG in production.
///
/// # Errors
///
/// - `WeakPublicKey`: recipient key has low order
pub fn seal_to(
    recipient_public: &[u8; KEY_SIZE],
    plaintext: &[u8],
    aad: &[u8],
    ephemeral_seed: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> Result<SealedBox, CryptoError> {
    let ephemeral = KeyPair::from_secret_bytes(ephemeral_seed);
    let ephemeral_public = ephemeral.public_bytes();
    let shared = ephemeral.diffie_hellman(recipient_public)?;

    let key = sealing_key(&shared, &ephemeral_public, recipient_public);
    let ciphertext = aead::seal(&key, &nonce, plaintext, aad);

    Ok(SealedBox { ephemeral_public, nonce, ciphertext })
}

/// Open a box sealed to `recipient`.
///
/// # Errors
///
/// - `WeakPublicKey`: ephemeral key in the box has low order
/// - `AuthenticationFailed`: box not addressed to this key or tampered
pub fn open_sealed(
    recipient: &KeyPair,
    sealed: &SealedBox,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let shared = recipient.diffie_hellman(&sealed.ephemeral_public)?;
    let key = sealing_key(&shared, &sealed.ephemeral_public, &recipient.public_bytes());
    aead::open(&key, &sealed.nonce, &sealed.ciphertext, aad)
}

fn sealing_key(
    shared: &SecretKey,
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
) -> SecretKey {
    let mut salt = [0u8; 2 * KEY_SIZE];
    salt[..KEY_SIZE].copy_from_slice(ephemeral_public);
    salt[KEY_SIZE..].copy_from_slice(recipient_public);
    derive_key_with_salt(&salt, shared.as_bytes(), SEALED_BOX_LABEL)
}
