//! Authenticated encryption with `XChaCha20-Poly1305`
//!
//! Nonces are 24 bytes, large enough to draw at random per message without
//! tracking collisions. The caller supplies them.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::CryptoError, secret::SecretKey};

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext`, binding `aad` into the tag.
///
/// Returns ciphertext with the 16-byte tag appended.
#[allow(clippy::expect_used)]
pub fn seal(key: &SecretKey, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .expect("invariant: XChaCha20-Poly1305 encryption cannot fail with valid inputs")
}

/// Decrypt and authenticate `ciphertext`.
///
/// # Errors
///
/// - `AuthenticationFailed`: wrong key, wrong associated data, or any bit of
///   nonce/ciphertext/tag altered
pub fn open(
    key: &SecretKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; 32])
    }

    #[test]
    fn seal_open_roundtrip() {
        let nonce = [0x11; NONCE_SIZE];
        let ciphertext = seal(&key(1), &nonce, b"hello", b"aad");

        assert_eq!(ciphertext.len(), 5 + TAG_SIZE);
        assert_eq!(open(&key(1), &nonce, &ciphertext, b"aad").unwrap(), b"hello");
    }

    #[test]
    fn wrong_aad_fails() {
        let nonce = [0x22; NONCE_SIZE];
        let ciphertext = seal(&key(1), &nonce, b"hello", b"seq-1");

        assert_eq!(
            open(&key(1), &nonce, &ciphertext, b"seq-2"),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let nonce = [0x33; NONCE_SIZE];
        let ciphertext = seal(&key(1), &nonce, b"hello", b"");

        assert!(open(&key(2), &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn flipped_nonce_bit_fails() {
        let mut nonce = [0x44; NONCE_SIZE];
        let ciphertext = seal(&key(1), &nonce, b"hello", b"");
        nonce[23] ^= 0x01;

        assert!(open(&key(1), &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let nonce = [0x55; NONCE_SIZE];
        let ciphertext = seal(&key(1), &nonce, b"hello", b"");

        assert!(open(&key(1), &nonce, &ciphertext[..TAG_SIZE - 1], b"").is_err());
        assert!(open(&key(1), &nonce, &[], b"").is_err());
    }
}
