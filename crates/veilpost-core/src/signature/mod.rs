//! HTTP message signatures for requests and receipts.
//!
//! An RFC 9421-shaped codec: the signer lists covered components in
//! `Signature-Input`, builds a signature base from them, and sends the Ed25519
//! signature in `Signature`. The verifier parses both headers, rebuilds the
//! base from the request it received, and checks time bounds before the
//! signature itself.
//!
//! ```text
//! Signature-Input: sig1=("@method" "@path" "content-digest");created=1700000000;keyid="k1";alg="ed25519"
//! Signature:       sig1=:<base64url>:
//! ```
//!
//! # Invariants
//!
//! - Covered components are emitted in exactly the order listed. Nothing
//!   sorts them; a reordered list yields a different base.
//! - A signature whose `created` is more than the configured skew (300 s by
//!   default) from the verifier clock is rejected as expired, whatever its
//!   `expires` says.
//!
//! Verification keys come from a published [`KeySetDocument`]; fetching and
//! caching those documents is the server's concern.

mod base;
mod codec;
mod digest;
mod error;
mod key_set;
mod params;
mod request;

pub use base::build_signature_base;
pub use codec::{
    ALGORITHM_ED25519, DEFAULT_CLOCK_SKEW_SECS, SignatureHeaders, VerifyOptions,
    extract_signature, sign, sign_request, verify, verify_http_signature,
};
pub use digest::{content_digest, verify_content_digest};
pub use error::SignatureError;
pub use key_set::{JsonWebKey, KeySetDocument};
pub use params::{
    DEFAULT_LABEL, SignatureMetadata, format_signature_header, parse_signature_header,
    parse_signature_input,
};
pub use request::RequestParts;
