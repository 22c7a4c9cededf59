//! Zeroizing 32-byte secret container

use std::fmt;

use zeroize::Zeroize;

/// Size of every symmetric key and X25519 scalar in the protocol.
pub const KEY_SIZE: usize = 32;

/// 32 bytes of secret key material.
///
/// Zeroized on drop. `Debug` is redacted so secrets never reach logs.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes out of a slice.
    ///
    /// Returns `None` unless the slice is exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}
