//! Proof token header, claims and embedded key

use p256::{EncodedPoint, FieldBytes, ecdsa::VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use veilpost_crypto::encoding;

use super::error::ProofError;

/// JWT `typ` of a possession proof.
pub const PROOF_TYPE: &str = "dpop+jwt";

/// JWS algorithm of a possession proof.
pub const PROOF_ALGORITHM: &str = "ES256";

/// Seconds between `iat` and `exp`, and the verifier's freshness window.
pub const PROOF_LIFETIME_SECS: i64 = 300;

/// Protected header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofHeader {
    /// `ES256`.
    pub alg: String,
    /// `dpop+jwt`.
    pub typ: String,
    /// Public half of the client's proof key.
    pub jwk: EcPublicJwk,
}

/// Payload claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Unique proof identifier.
    pub jti: String,
    /// HTTP method, uppercase.
    pub htm: String,
    /// HTTP URI without query or fragment.
    pub htu: String,
    /// Issued at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    /// base64url SHA-256 of the bound access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

/// P-256 public key as a JWK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcPublicJwk {
    /// `EC`.
    pub kty: String,
    /// `P-256`.
    pub crv: String,
    /// Affine x coordinate, base64url.
    pub x: String,
    /// Affine y coordinate, base64url.
    pub y: String,
    /// Optional intended use; only `sig` is accepted.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

impl EcPublicJwk {
    /// JWK for a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let coordinate =
            |c: Option<&FieldBytes>| c.map(|b| encoding::encode(b)).unwrap_or_default();

        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: coordinate(point.x()),
            y: coordinate(point.y()),
            key_use: None,
        }
    }

    /// Decode into a verifying key.
    ///
    /// # Errors
    ///
    /// - `ProofError::InvalidKey` if `kty`, `crv` or `use` are wrong, or the
    ///   coordinates are not a point on P-256
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, ProofError> {
        let invalid = |reason: &str| ProofError::InvalidKey { reason: reason.to_string() };

        if self.kty != "EC" || self.crv != "P-256" {
            return Err(invalid(&format!("expected EC P-256, got {} {}", self.kty, self.crv)));
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(invalid("key not intended for signatures"));
        }

        let x = encoding::decode_array::<32>(&self.x).map_err(|e| invalid(&e.to_string()))?;
        let y = encoding::decode_array::<32>(&self.y).map_err(|e| invalid(&e.to_string()))?;
        let point = EncodedPoint::from_affine_coordinates(&FieldBytes::from(x), &FieldBytes::from(y), false);

        VerifyingKey::from_encoded_point(&point).map_err(|_| invalid("point not on curve"))
    }

    /// RFC 7638 thumbprint: base64url SHA-256 over the required members in
    /// lexicographic order. Servers bind access tokens to this value.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            self.crv, self.kty, self.x, self.y
        );
        encoding::encode(&Sha256::digest(canonical.as_bytes()))
    }
}

/// `ath` value for an access token: base64url SHA-256 of its ASCII bytes.
pub fn access_token_hash(access_token: &str) -> String {
    encoding::encode(&Sha256::digest(access_token.as_bytes()))
}

/// `htu` form of a URL: query and fragment removed.
pub fn normalize_htu(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;

    use super::*;

    fn verifying_key() -> VerifyingKey {
        let Ok(key) = SigningKey::from_slice(&[7u8; 32]) else { unreachable!("valid scalar") };
        *key.verifying_key()
    }

    #[test]
    fn jwk_round_trip() {
        let jwk = EcPublicJwk::from_verifying_key(&verifying_key());

        assert_eq!(jwk.x.len(), 43);
        assert_eq!(jwk.to_verifying_key().unwrap(), verifying_key());
    }

    #[test]
    fn jwk_rejects_other_curves_and_points() {
        let mut jwk = EcPublicJwk::from_verifying_key(&verifying_key());
        jwk.crv = "P-384".to_string();
        assert!(matches!(jwk.to_verifying_key(), Err(ProofError::InvalidKey { .. })));

        let mut jwk = EcPublicJwk::from_verifying_key(&verifying_key());
        jwk.y = jwk.x.clone();
        assert!(matches!(jwk.to_verifying_key(), Err(ProofError::InvalidKey { .. })));

        let mut jwk = EcPublicJwk::from_verifying_key(&verifying_key());
        jwk.key_use = Some("enc".to_string());
        assert!(matches!(jwk.to_verifying_key(), Err(ProofError::InvalidKey { .. })));
    }

    #[test]
    fn known_access_token_hash() {
        // RFC 9449 section 7.1 example
        assert_eq!(
            access_token_hash("Kz~8mXK1EalYznwH-LC-1fBAo.4Ljp~zsPE_NeO.gxU"),
            "fUHyO2r2Z3DZ53EsNrWBb0xWXoaNy59IiKCAqksmQEo"
        );
    }

    #[test]
    fn htu_drops_query_and_fragment() {
        assert_eq!(normalize_htu("https://api.example/v1/msg?x=1#f"), "https://api.example/v1/msg");
        assert_eq!(normalize_htu("https://api.example/v1/msg#f"), "https://api.example/v1/msg");
        assert_eq!(normalize_htu("https://api.example/v1/msg"), "https://api.example/v1/msg");
    }

    #[test]
    fn thumbprint_is_stable_and_key_specific() {
        let jwk = EcPublicJwk::from_verifying_key(&verifying_key());
        assert_eq!(jwk.thumbprint(), jwk.clone().thumbprint());

        let Ok(other) = SigningKey::from_slice(&[8u8; 32]) else { unreachable!("valid scalar") };
        let other = EcPublicJwk::from_verifying_key(other.verifying_key());
        assert_ne!(jwk.thumbprint(), other.thumbprint());
    }
}
