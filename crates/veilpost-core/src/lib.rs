//! Veilpost protocol core.
//!
//! Pure protocol engines for end-to-end messaging. Nothing here performs I/O:
//! randomness and time come from an [`env::Environment`], and every state
//! transition returns a new value instead of mutating shared state.
//!
//! # Components
//!
//! - [`ratchet`]: pairwise double-ratchet sessions
//! - [`group`]: tree-based group key agreement with per-epoch secrets
//! - [`signature`]: RFC 9421-shaped request and receipt signatures
//! - [`dpop`]: proof-of-possession tokens
//! - [`envelope`]: the signed transport unit tying the above together
//!
//! Shared mutable state (replay tracking, key-set caching, proof `jti`
//! tracking) lives in the server crate.
//!
//! # Data Flow
//!
//! ```text
//! outbound: plaintext → ratchet/group encrypt → Envelope → sign_envelope → DPoP proof
//! inbound:  replay guard → signature + digest → ratchet/group decrypt → plaintext
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod dpop;
mod encoding;
pub mod env;
pub mod envelope;
pub mod error;
pub mod group;
pub mod ratchet;
pub mod signature;

pub use envelope::{Envelope, EnvelopeBody, ReplayCheck, SignedEnvelope, sign_envelope};
pub use error::{ErrorKind, ProtocolError};
