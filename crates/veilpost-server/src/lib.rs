//! Veilpost server-side verifiers.
//!
//! The components here hold state shared by many concurrent request
//! handlers, which is why they live outside the pure protocol core.
//!
//! # Components
//!
//! - [`ReplayGuard`]: nonce, per-device counter and timestamp tracking
//! - [`KeySetCache`]: TTL cache of verification keys resolved from published
//!   key sets through a [`KeySetSource`]
//! - [`ProofVerifier`]: possession-proof checks with single-use `jti`
//! - [`InboundPipeline`]: the admission sequence tying them together
//! - [`SystemEnv`]: production environment (real time, crypto RNG)
//!
//! Every shared component is an explicit value handed to whoever needs it.
//! Nothing is process-global; clones share state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dpop_verifier;
mod inbound;
pub mod key_set;
mod replay_guard;
mod system_env;

pub use dpop_verifier::{DEFAULT_SWEEP_THRESHOLD, ProofVerifier, ProofVerifierConfig};
pub use inbound::{AcceptedEnvelope, InboundConfig, InboundError, InboundPipeline};
pub use key_set::{KeySetCache, KeySetCacheConfig, KeySetError, KeySetSource, StaticKeySetSource};
pub use replay_guard::{
    DEFAULT_MAX_NONCES, DEFAULT_TIME_WINDOW, DeviceStats, ReplayConfig, ReplayGuard,
    ReplayViolation, ViolationCounts,
};
pub use system_env::SystemEnv;
