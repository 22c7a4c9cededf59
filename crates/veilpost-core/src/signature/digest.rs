//! `Content-Digest` for signed bodies

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

use super::error::SignatureError;

/// `Content-Digest` header value for `body`: `sha-256=:<base64>:`.
pub fn content_digest(body: &[u8]) -> String {
    format!("sha-256=:{}:", STANDARD.encode(Sha256::digest(body)))
}

/// Check a `Content-Digest` header against `body`.
///
/// Only the `sha-256` member is considered; other algorithms in the
/// dictionary are ignored.
///
/// # Errors
///
/// - `SignatureError::MalformedHeader` if there is no parseable `sha-256`
///   member
/// - `SignatureError::DigestMismatch` if the digest differs
pub fn verify_content_digest(header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let malformed = |reason: &str| SignatureError::MalformedHeader {
        header: "Content-Digest",
        reason: reason.to_string(),
    };

    let member = header
        .split(',')
        .map(str::trim)
        .find_map(|m| m.strip_prefix("sha-256="))
        .ok_or_else(|| malformed("no sha-256 member"))?;
    let encoded = member
        .strip_prefix(':')
        .and_then(|m| m.strip_suffix(':'))
        .ok_or_else(|| malformed("expected byte sequence"))?;
    let claimed = STANDARD.decode(encoded).map_err(|_| malformed("invalid base64"))?;

    if claimed.as_slice() == Sha256::digest(body).as_slice() {
        Ok(())
    } else {
        Err(SignatureError::DigestMismatch)
    }
}
