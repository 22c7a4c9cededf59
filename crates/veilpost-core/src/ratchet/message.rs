//! Wire types for pairwise sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veilpost_crypto::NONCE_SIZE;

use crate::encoding::{b64, b64_array};

/// Encrypted message envelope.
///
/// ```json
/// {"ciphertext": "<b64url>", "nonce": "<b64url>", "sequence": 0,
///  "timestamp": "2024-01-01T00:00:00.000Z"}
/// ```
///
/// The sequence number and timestamp are bound into the AEAD tag, so altering
/// either fails decryption just like altering the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// Ciphertext with appended Poly1305 tag
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    /// 24-byte `XChaCha20` nonce
    #[serde(with = "b64_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Session-wide sender sequence number
    pub sequence: u32,
    /// Sender wall clock at encryption, millisecond precision
    pub timestamp: DateTime<Utc>,
}

impl EncryptedMessage {
    /// Associated data authenticated alongside the ciphertext.
    pub(crate) fn associated_data(sequence: u32, timestamp: DateTime<Utc>) -> [u8; 12] {
        let mut aad = [0u8; 12];
        aad[..4].copy_from_slice(&sequence.to_be_bytes());
        aad[4..].copy_from_slice(&timestamp.timestamp_millis().to_be_bytes());
        aad
    }
}

/// JWK-shaped description of a session's current ratchet public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyDescriptor {
    /// Always `"OKP"`
    pub kty: String,
    /// Always `"X25519"`
    pub crv: String,
    /// Public key, base64url
    pub x: String,
    /// Always `"enc"`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Session identifier
    pub kid: String,
}
