//! Pairwise double-ratchet sessions.
//!
//! One [`RatchetState`] per ordered pair of parties. The engine never mutates
//! a state in place: `encrypt`, `decrypt` and `ratchet_step` each return a
//! new value, and the caller replaces its copy. Two concurrent calls on the
//! same state would read the same chain key and diverge, so callers MUST
//! serialize writers per session.
//!
//! # Key Schedule
//!
//! ```text
//! shared secret ──HKDF "root-init"────▶ root key
//!               └─HKDF "sending-init"─▶ initiator send chain / responder recv chain
//!
//! chain key ──HKDF "message-key"─▶ message key (one use, zeroized)
//!           └─HKDF "chain-key"───▶ next chain key
//!
//! root key + DH(ours, theirs) ──HKDF "root-ratchet"─▶ new root key, new chain key
//! ```
//!
//! # Security
//!
//! - Forward secrecy: chain keys only move forward; message keys are dropped
//!   (and zeroized) right after one use
//! - Post-compromise security: each DH ratchet step mixes two fresh
//!   agreements into the root key
//! - Replay: every accepted sequence number is recorded, and anything at or
//!   below the highest accepted one is rejected before any key is derived

mod engine;
mod error;
mod message;
mod state;

pub use engine::RatchetEngine;
pub use error::{ChainDirection, RatchetError};
pub use message::{EncryptedMessage, PublicKeyDescriptor};
pub use state::{ChainKey, RatchetState};
