//! Proof creation

use std::fmt;

use p256::ecdsa::{Signature, SigningKey, signature::Signer as _};
use serde::Serialize;
use veilpost_crypto::encoding;
use zeroize::Zeroizing;

use super::claims::{
    EcPublicJwk, PROOF_ALGORITHM, PROOF_LIFETIME_SECS, PROOF_TYPE, ProofClaims, ProofHeader,
    access_token_hash, normalize_htu,
};
use crate::env::Environment;

/// Size of the random `jti` before encoding
const JTI_SIZE: usize = 16;

/// Long-lived proof signer.
///
/// Construct once per client with [`ProofClient::generate`] and share the
/// handle; every proof it mints carries the same public key, which is what
/// the access token is bound to.
pub struct ProofClient<E: Environment> {
    env: E,
    signing_key: SigningKey,
    jwk: EcPublicJwk,
}

impl<E: Environment> ProofClient<E> {
    /// Generate a fresh P-256 proof key.
    pub fn generate(env: E) -> Self {
        // Rejection sampling: a zero scalar or one at or above the group
        // order is redrawn.
        let signing_key = loop {
            let mut seed = Zeroizing::new([0u8; 32]);
            env.random_bytes(&mut seed[..]);
            if let Ok(key) = SigningKey::from_slice(&seed[..]) {
                break key;
            }
        };
        let jwk = EcPublicJwk::from_verifying_key(signing_key.verifying_key());

        tracing::info!(thumbprint = %jwk.thumbprint(), "generated proof key");
        Self { env, signing_key, jwk }
    }

    /// Public key embedded in every proof.
    pub fn public_jwk(&self) -> &EcPublicJwk {
        &self.jwk
    }

    /// JWK thumbprint of the proof key.
    pub fn thumbprint(&self) -> String {
        self.jwk.thumbprint()
    }

    /// Mint a proof for one request.
    ///
    /// `method` is uppercased and `url` loses its query and fragment. When
    /// `access_token` is given, its hash is bound as `ath`.
    pub fn create_proof(&self, method: &str, url: &str, access_token: Option<&str>) -> String {
        let iat = i64::try_from(self.env.wall_clock_secs()).unwrap_or(i64::MAX);
        let header = ProofHeader {
            alg: PROOF_ALGORITHM.to_string(),
            typ: PROOF_TYPE.to_string(),
            jwk: self.jwk.clone(),
        };
        let claims = ProofClaims {
            jti: encoding::encode(&self.env.random_array::<JTI_SIZE>()),
            htm: method.to_ascii_uppercase(),
            htu: normalize_htu(url).to_string(),
            iat,
            exp: iat.saturating_add(PROOF_LIFETIME_SECS),
            ath: access_token.map(access_token_hash),
        };

        let signing_input = format!("{}.{}", encode_json(&header), encode_json(&claims));
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());

        tracing::debug!(htm = %claims.htm, htu = %claims.htu, jti = %claims.jti, "created proof");
        format!("{signing_input}.{}", encoding::encode(&signature.to_bytes()))
    }
}

impl<E: Environment> fmt::Debug for ProofClient<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofClient").field("jwk", &self.jwk).finish_non_exhaustive()
    }
}

#[allow(clippy::expect_used)]
fn encode_json<T: Serialize>(value: &T) -> String {
    let json =
        serde_json::to_vec(value).expect("invariant: proof header and claims always serialize");
    encoding::encode(&json)
}
