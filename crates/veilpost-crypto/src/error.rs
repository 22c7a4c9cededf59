//! Error types for cryptographic primitives

use thiserror::Error;

/// Errors from primitive operations.
///
/// All variants are terminal for the input that produced them. Nothing here
/// is transient: retrying with the same bytes yields the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag did not verify (wrong key, tampered ciphertext or nonce)
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Key agreement produced a non-contributory (all-zero) shared secret
    #[error("non-contributory key agreement: peer public key has low order")]
    WeakPublicKey,

    /// Input was not valid base64url
    #[error("invalid encoding: {reason}")]
    InvalidEncoding {
        /// Decoder failure description
        reason: String,
    },

    /// Decoded key material had the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },
}
