//! Proof-of-possession tokens (DPoP-style).
//!
//! A client holds one P-256 key for its whole lifetime and mints a short-lived
//! ES256 proof per request:
//!
//! ```text
//! header  {"alg":"ES256","typ":"dpop+jwt","jwk":{...}}
//! claims  {"jti","htm","htu","iat","exp":iat+300,"ath"?}
//! token   b64url(header).b64url(claims).b64url(r||s)
//! ```
//!
//! # Security
//!
//! - `htm`/`htu` bind a proof to one endpoint, so a captured proof cannot be
//!   forwarded elsewhere
//! - `ath` binds it to one access token
//! - `jti` single use is enforced by the server's verifier, which owns the
//!   seen-set; [`verify_proof`] is stateless

mod claims;
mod client;
mod error;
mod verify;

pub use claims::{
    EcPublicJwk, PROOF_ALGORITHM, PROOF_LIFETIME_SECS, PROOF_TYPE, ProofClaims, ProofHeader,
    access_token_hash, normalize_htu,
};
pub use client::ProofClient;
pub use error::ProofError;
pub use verify::{
    DEFAULT_FUTURE_SKEW_SECS, ParsedProof, ProofExpectations, ProofOptions, VerifiedProof,
    parse_proof, verify_proof,
};
