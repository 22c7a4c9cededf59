//! X25519 key agreement

use std::fmt;

use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    error::CryptoError,
    secret::{KEY_SIZE, SecretKey},
};

/// X25519 key pair.
///
/// The scalar is held by `x25519-dalek`, which zeroizes it on drop. Built from
/// caller-supplied bytes so generation stays deterministic under test.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 secret bytes (clamped internally).
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from a stored secret.
    pub fn from_secret(secret: &SecretKey) -> Self {
        Self::from_secret_bytes(*secret.as_bytes())
    }

    /// Public key bytes (Montgomery u-coordinate).
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Export the secret scalar for storage inside a state value.
    pub fn secret(&self) -> SecretKey {
        SecretKey::from_bytes(self.secret.to_bytes())
    }

    /// Diffie-Hellman with a peer public key.
    ///
    /// # Errors
    ///
    /// - `WeakPublicKey`: the peer key has low order and the shared secret is
    ///   all zeros
    pub fn diffie_hellman(&self, their_public: &[u8; KEY_SIZE]) -> Result<SecretKey, CryptoError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*their_public));
        if !shared.was_contributory() {
            return Err(CryptoError::WeakPublicKey);
        }
        Ok(SecretKey::from_bytes(shared.to_bytes()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public.as_bytes()).finish_non_exhaustive()
    }
}
