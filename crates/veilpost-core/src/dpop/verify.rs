//! Proof verification

use p256::ecdsa::{Signature, signature::Verifier as _};
use serde::de::DeserializeOwned;
use veilpost_crypto::encoding;

use super::{
    claims::{
        EcPublicJwk, PROOF_ALGORITHM, PROOF_LIFETIME_SECS, PROOF_TYPE, ProofClaims, ProofHeader,
        access_token_hash, normalize_htu,
    },
    error::ProofError,
};

/// Tolerated clock drift for `iat` in the future.
pub const DEFAULT_FUTURE_SKEW_SECS: i64 = 60;

/// What the proof must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct ProofExpectations<'a> {
    /// Request method.
    pub method: &'a str,
    /// Request URL; query and fragment are ignored.
    pub url: &'a str,
    /// Access token presented with the request, if any.
    pub access_token: Option<&'a str>,
}

/// Freshness tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOptions {
    /// Oldest accepted `iat`, in seconds before now.
    pub max_age_secs: i64,
    /// Newest accepted `iat`, in seconds after now.
    pub future_skew_secs: i64,
}

impl Default for ProofOptions {
    fn default() -> Self {
        Self { max_age_secs: PROOF_LIFETIME_SECS, future_skew_secs: DEFAULT_FUTURE_SKEW_SECS }
    }
}

/// A decoded, not yet verified proof.
#[derive(Debug, Clone)]
pub struct ParsedProof {
    /// Protected header.
    pub header: ProofHeader,
    /// Payload claims.
    pub claims: ProofClaims,
    signing_input: String,
    signature: Vec<u8>,
}

/// A proof that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProof {
    /// Accepted claims.
    pub claims: ProofClaims,
    /// Key the proof was signed with.
    pub jwk: EcPublicJwk,
}

impl VerifiedProof {
    /// Thumbprint of the proof key, for comparison with the token's `cnf.jkt`.
    pub fn thumbprint(&self) -> String {
        self.jwk.thumbprint()
    }
}

/// Split and decode a compact proof.
///
/// # Errors
///
/// - `ProofError::Malformed` unless the token is three non-empty base64url
///   parts with JSON header and claims
pub fn parse_proof(token: &str) -> Result<ParsedProof, ProofError> {
    let malformed = |reason: &str| ProofError::Malformed { reason: reason.to_string() };

    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("expected three parts"));
    };
    if header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(malformed("empty part"));
    }

    Ok(ParsedProof {
        header: decode_json(header, "header")?,
        claims: decode_json(claims, "claims")?,
        signing_input: format!("{header}.{claims}"),
        signature: encoding::decode(signature).map_err(|_| malformed("signature not base64url"))?,
    })
}

/// Verify a compact proof against the request it arrived with.
///
/// Checks, in order: `typ` and `alg`, the embedded key, the signature, `htm`,
/// `htu`, `ath`, `exp`, then `iat` against the future skew and the freshness
/// window. `jti` reuse is not checked here because it needs shared state.
///
/// # Errors
///
/// Any [`ProofError`] variant except `Replayed`.
pub fn verify_proof(
    token: &str,
    expected: &ProofExpectations<'_>,
    now: i64,
    options: ProofOptions,
) -> Result<VerifiedProof, ProofError> {
    let parsed = parse_proof(token)?;
    let ParsedProof { header, claims, signing_input, signature } = parsed;

    if header.typ != PROOF_TYPE {
        return Err(ProofError::InvalidHeader { reason: format!("typ {}", header.typ) });
    }
    if header.alg != PROOF_ALGORITHM {
        return Err(ProofError::InvalidHeader { reason: format!("alg {}", header.alg) });
    }

    let key = header.jwk.to_verifying_key()?;
    let signature = Signature::from_slice(&signature)
        .map_err(|_| ProofError::Malformed { reason: "signature is not r||s".to_string() })?;
    key.verify(signing_input.as_bytes(), &signature).map_err(|_| ProofError::SignatureInvalid)?;

    let method = expected.method.to_ascii_uppercase();
    if claims.htm != method {
        return Err(ProofError::MethodMismatch { expected: method, actual: claims.htm });
    }

    let url = normalize_htu(expected.url);
    if normalize_htu(&claims.htu) != url {
        return Err(ProofError::UriMismatch { expected: url.to_string(), actual: claims.htu });
    }

    match (expected.access_token, claims.ath.as_deref()) {
        (Some(token), Some(ath)) if access_token_hash(token) == ath => {},
        (Some(_), Some(_)) => {
            return Err(ProofError::AccessTokenMismatch { reason: "hash differs".to_string() });
        },
        (Some(_), None) => {
            return Err(ProofError::AccessTokenMismatch { reason: "ath missing".to_string() });
        },
        (None, Some(_)) => {
            return Err(ProofError::AccessTokenMismatch {
                reason: "ath present without access token".to_string(),
            });
        },
        (None, None) => {},
    }

    if claims.exp < now {
        return Err(ProofError::Expired { exp: claims.exp, now });
    }
    if claims.iat > now.saturating_add(options.future_skew_secs) {
        return Err(ProofError::NotYetValid { iat: claims.iat, now });
    }
    if claims.iat < now.saturating_sub(options.max_age_secs) {
        return Err(ProofError::Stale { iat: claims.iat, now });
    }

    Ok(VerifiedProof { claims, jwk: header.jwk })
}

fn decode_json<T: DeserializeOwned>(part: &str, what: &str) -> Result<T, ProofError> {
    let bytes = encoding::decode(part)
        .map_err(|_| ProofError::Malformed { reason: format!("{what} not base64url") })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ProofError::Malformed { reason: format!("{what}: {err}") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dpop::ProofClient,
        env::{Environment, test_utils::MockEnv},
    };

    const URL: &str = "https://api.example/v1/messages";

    fn setup() -> (MockEnv, ProofClient<MockEnv>, i64) {
        let env = MockEnv::with_seed(11);
        let client = ProofClient::generate(env.clone());
        let now = env.wall_clock_secs() as i64;
        (env, client, now)
    }

    fn expect<'a>(method: &'a str, url: &'a str, token: Option<&'a str>) -> ProofExpectations<'a> {
        ProofExpectations { method, url, access_token: token }
    }

    #[test]
    fn valid_proof_verifies() {
        let (_, client, now) = setup();
        let proof = client.create_proof("POST", URL, Some("at-1"));

        let verified =
            verify_proof(&proof, &expect("post", URL, Some("at-1")), now, ProofOptions::default())
                .unwrap();
        assert_eq!(verified.jwk, *client.public_jwk());
        assert_eq!(verified.thumbprint(), client.thumbprint());
    }

    #[test]
    fn query_is_ignored_for_htu() {
        let (_, client, now) = setup();
        let proof = client.create_proof("GET", URL, None);

        let url = format!("{URL}?page=2");
        assert!(verify_proof(&proof, &expect("GET", &url, None), now, ProofOptions::default()).is_ok());
    }

    #[test]
    fn binding_mismatches_are_rejected() {
        let (_, client, now) = setup();
        let proof = client.create_proof("POST", URL, Some("at-1"));
        let options = ProofOptions::default();

        assert!(matches!(
            verify_proof(&proof, &expect("GET", URL, Some("at-1")), now, options),
            Err(ProofError::MethodMismatch { .. })
        ));
        assert!(matches!(
            verify_proof(&proof, &expect("POST", "https://api.example/v1/keys", Some("at-1")), now, options),
            Err(ProofError::UriMismatch { .. })
        ));
        assert!(matches!(
            verify_proof(&proof, &expect("POST", URL, Some("at-2")), now, options),
            Err(ProofError::AccessTokenMismatch { .. })
        ));
        assert!(matches!(
            verify_proof(&proof, &expect("POST", URL, None), now, options),
            Err(ProofError::AccessTokenMismatch { .. })
        ));
    }

    #[test]
    fn freshness_window() {
        let (_, client, now) = setup();
        let proof = client.create_proof("GET", URL, None);
        let options = ProofOptions::default();
        let request = expect("GET", URL, None);

        assert!(verify_proof(&proof, &request, now + 300, options).is_ok());
        assert_eq!(
            verify_proof(&proof, &request, now + 301, options),
            Err(ProofError::Expired { exp: now + 300, now: now + 301 })
        );
        assert!(verify_proof(&proof, &request, now - 60, options).is_ok());
        assert_eq!(
            verify_proof(&proof, &request, now - 61, options),
            Err(ProofError::NotYetValid { iat: now, now: now - 61 })
        );
    }

    #[test]
    fn stale_iat_is_rejected_even_with_long_exp() {
        let (_, client, now) = setup();
        let proof = client.create_proof("GET", URL, None);
        let options = ProofOptions { max_age_secs: 30, ..ProofOptions::default() };

        assert_eq!(
            verify_proof(&proof, &expect("GET", URL, None), now + 31, options),
            Err(ProofError::Stale { iat: now, now: now + 31 })
        );
    }

    #[test]
    fn tampered_claims_fail_signature() {
        let (_, client, now) = setup();
        let proof = client.create_proof("GET", URL, None);
        let parts: Vec<&str> = proof.split('.').collect();

        let mut claims: serde_json::Value =
            serde_json::from_slice(&encoding::decode(parts[1]).unwrap()).unwrap();
        claims["htm"] = "DELETE".into();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            encoding::encode(&serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );

        assert_eq!(
            verify_proof(&forged, &expect("DELETE", URL, None), now, ProofOptions::default()),
            Err(ProofError::SignatureInvalid)
        );
    }

    #[test]
    fn foreign_key_fails_signature() {
        let (env, client, now) = setup();
        let other = ProofClient::generate(env);
        let proof = client.create_proof("GET", URL, None);
        let other_proof = other.create_proof("GET", URL, None);

        let parts: Vec<&str> = proof.split('.').collect();
        let other_parts: Vec<&str> = other_proof.split('.').collect();
        let swapped = format!("{}.{}.{}", other_parts[0], parts[1], parts[2]);

        assert_eq!(
            verify_proof(&swapped, &expect("GET", URL, None), now, ProofOptions::default()),
            Err(ProofError::SignatureInvalid)
        );
    }

    #[test]
    fn malformed_tokens() {
        for token in ["", "a.b", "a.b.c.d", "..", "e30.e30.", "!!.e30.AA"] {
            assert!(
                matches!(parse_proof(token), Err(ProofError::Malformed { .. })),
                "accepted {token:?}"
            );
        }
    }

    #[test]
    fn wrong_header_type_is_rejected() {
        let (_, client, now) = setup();
        let proof = client.create_proof("GET", URL, None);
        let parts: Vec<&str> = proof.split('.').collect();

        let mut header: serde_json::Value =
            serde_json::from_slice(&encoding::decode(parts[0]).unwrap()).unwrap();
        header["typ"] = "JWT".into();
        let forged = format!(
            "{}.{}.{}",
            encoding::encode(&serde_json::to_vec(&header).unwrap()),
            parts[1],
            parts[2]
        );

        assert!(matches!(
            verify_proof(&forged, &expect("GET", URL, None), now, ProofOptions::default()),
            Err(ProofError::InvalidHeader { .. })
        ));
    }
}
