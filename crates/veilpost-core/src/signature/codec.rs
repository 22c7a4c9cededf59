//! Signing and verification of requests and receipts

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use tracing::debug;

use super::{
    base::build_signature_base,
    error::SignatureError,
    params::{
        DEFAULT_LABEL, SignatureMetadata, format_signature_header, parse_signature_header,
        parse_signature_input,
    },
    request::RequestParts,
};

/// The only `alg` this codec signs or verifies.
pub const ALGORITHM_ED25519: &str = "ed25519";

/// Default tolerance between `created` and the verifier clock.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 300;

/// Verification tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Maximum `|now - created|` in seconds.
    pub clock_skew_secs: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS }
    }
}

/// Header values produced by [`sign_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// `Signature-Input` value.
    pub signature_input: String,
    /// `Signature` value.
    pub signature: String,
}

impl SignatureHeaders {
    /// Attach both headers to `request`.
    pub fn apply(&self, request: &mut RequestParts) {
        request.insert_header("signature-input", self.signature_input.clone());
        request.insert_header("signature", self.signature.clone());
    }
}

/// Ed25519 signature over a signature base.
pub fn sign(base: &str, key: &SigningKey) -> [u8; 64] {
    key.sign(base.as_bytes()).to_bytes()
}

/// Verify an Ed25519 signature over a signature base.
///
/// Malformed signatures verify as `false`. Uses strict verification, which
/// rejects small-order keys and non-canonical encodings.
pub fn verify(base: &str, signature: &[u8], key: &VerifyingKey) -> bool {
    Signature::from_slice(signature)
        .is_ok_and(|sig| key.verify_strict(base.as_bytes(), &sig).is_ok())
}

/// Sign `request` and return the header pair to send with it.
///
/// # Errors
///
/// - `SignatureError::UnsupportedAlgorithm` if `metadata.algorithm` is not
///   `ed25519`
/// - `SignatureError::MissingComponent` if a covered header is absent
pub fn sign_request(
    request: &RequestParts,
    metadata: &SignatureMetadata,
    key: &SigningKey,
) -> Result<SignatureHeaders, SignatureError> {
    check_algorithm(metadata)?;
    let base = build_signature_base(request, metadata)?;
    let signature = sign(&base, key);

    Ok(SignatureHeaders {
        signature_input: metadata.to_header(DEFAULT_LABEL),
        signature: format_signature_header(DEFAULT_LABEL, &signature),
    })
}

/// Parse the `Signature-Input` and `Signature` headers carried by `request`.
///
/// # Errors
///
/// - `SignatureError::MissingComponent` if either header is absent
/// - `SignatureError::MalformedHeader` if either fails to parse
pub fn extract_signature(
    request: &RequestParts,
) -> Result<(SignatureMetadata, Vec<u8>), SignatureError> {
    let header = |name: &str| {
        request
            .header(name)
            .ok_or_else(|| SignatureError::MissingComponent { name: name.to_string() })
    };

    let metadata = parse_signature_input(header("signature-input")?)?;
    let signature = parse_signature_header(header("signature")?)?;
    Ok((metadata, signature))
}

/// Verify a parsed signature against `request`.
///
/// Checks run in order: clock skew on `created`, explicit `expires`,
/// algorithm, then the signature over the rebuilt base. `now` is Unix
/// seconds.
///
/// # Errors
///
/// - `SignatureError::ClockSkew` if `|now - created| > clock_skew_secs`
/// - `SignatureError::Expired` if `now > expires`
/// - `SignatureError::UnsupportedAlgorithm` for any `alg` but `ed25519`
/// - `SignatureError::MissingComponent` if a covered header is absent
/// - `SignatureError::VerificationFailed` if the signature does not verify
pub fn verify_http_signature(
    request: &RequestParts,
    metadata: &SignatureMetadata,
    signature: &[u8],
    key: &VerifyingKey,
    now: i64,
    options: VerifyOptions,
) -> Result<(), SignatureError> {
    if metadata.created.abs_diff(now) > options.clock_skew_secs {
        debug!(key_id = %metadata.key_id, created = metadata.created, now, "signature outside clock skew");
        return Err(SignatureError::ClockSkew {
            created: metadata.created,
            now,
            tolerance_secs: options.clock_skew_secs,
        });
    }

    if let Some(expires) = metadata.expires
        && now > expires
    {
        return Err(SignatureError::Expired { expires, now });
    }

    check_algorithm(metadata)?;

    let base = build_signature_base(request, metadata)?;
    if verify(&base, signature, key) {
        Ok(())
    } else {
        debug!(key_id = %metadata.key_id, "signature did not verify");
        Err(SignatureError::VerificationFailed)
    }
}

fn check_algorithm(metadata: &SignatureMetadata) -> Result<(), SignatureError> {
    if metadata.algorithm.eq_ignore_ascii_case(ALGORITHM_ED25519) {
        Ok(())
    } else {
        Err(SignatureError::UnsupportedAlgorithm { algorithm: metadata.algorithm.clone() })
    }
}
