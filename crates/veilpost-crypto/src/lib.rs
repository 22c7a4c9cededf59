//! Veilpost Cryptographic Primitives
//!
//! Building blocks shared by the pairwise ratchet and the group key tree.
//! Pure functions with deterministic outputs: callers provide random bytes,
//! which keeps every higher layer reproducible under a seeded environment.
//!
//! # Key Hierarchy
//!
//! ```text
//! Shared secret / DH output / path secret
//!        │
//!        ▼
//! HKDF-SHA256 (labelled) → root, chain, node, epoch keys
//!        │
//!        ▼
//! Chain step → one-time message key
//!        │
//!        ▼
//! XChaCha20-Poly1305 → ciphertext
//! ```
//!
//! # Security
//!
//! - Every derivation is domain separated by a distinct label
//! - Secret material lives in [`SecretKey`], which zeroizes on drop and never
//!   prints its bytes
//! - X25519 agreements that produce an all-zero output are rejected
//! - AEAD failures never reveal partial plaintext

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod dh;
pub mod encoding;
mod error;
pub mod kdf;
pub mod sealed;
mod secret;

pub use aead::{NONCE_SIZE, TAG_SIZE, open, seal};
pub use dh::KeyPair;
pub use error::CryptoError;
pub use kdf::{derive_key, derive_key_with_salt, kdf_chain, kdf_root};
pub use sealed::{SealedBox, open_sealed, seal_to};
pub use secret::{KEY_SIZE, SecretKey};
