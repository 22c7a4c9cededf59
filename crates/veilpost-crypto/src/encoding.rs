//! Unpadded base64url, the transport encoding for every binary field

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::{error::CryptoError, secret::KEY_SIZE};

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|err| CryptoError::InvalidEncoding { reason: err.to_string() })
}

/// Decode a base64url string that must hold exactly `N` bytes.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(text)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength { expected: N, actual })
}

/// Decode a 32-byte key.
pub fn decode_key(text: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    decode_array::<KEY_SIZE>(text)
}
