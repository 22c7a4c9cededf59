//! Inbound envelope admission.
//!
//! Runs the checks an envelope must pass before its ciphertext is handed to
//! a ratchet session or group:
//!
//! ```text
//! parse envelope → replay screen → content digest → signature (key from key set) → proof? → replay commit
//! ```
//!
//! Decryption stays with the caller, which owns the session and group states
//! and must serialize writers per session anyway.
//!
//! The replay guard screens the envelope before the signature so replays are
//! rejected without a key-set fetch, but nothing is recorded until every
//! check has passed. A forged envelope can therefore never advance a
//! device's counter or burn its nonces.

use thiserror::Error;
use veilpost_core::{
    Envelope, ErrorKind, ProtocolError,
    dpop::{ProofError, ProofExpectations, VerifiedProof},
    env::Environment,
    envelope::DEVICE_ID_HEADER,
    signature::{
        RequestParts, SignatureError, VerifyOptions, extract_signature, verify_content_digest,
        verify_http_signature,
    },
};

use crate::{
    dpop_verifier::ProofVerifier,
    key_set::{KeySetCache, KeySetError, KeySetSource},
    replay_guard::{ReplayGuard, ReplayViolation},
};

/// Pipeline tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundConfig {
    /// Signature clock skew.
    pub signature: VerifyOptions,
    /// Scheme and authority the service is reached at, used to rebuild the
    /// absolute URL a proof is bound to (`https://api.example`).
    pub public_origin: String,
    /// Reject requests without a `DPoP` header.
    pub require_proof: bool,
}

/// Why an envelope was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InboundError {
    /// Body is not an envelope
    #[error(transparent)]
    Envelope(#[from] ProtocolError),

    /// Replay guard rejected the envelope metadata
    #[error(transparent)]
    Replay(#[from] ReplayViolation),

    /// Signature, digest or header binding failed
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Verification key could not be resolved
    #[error(transparent)]
    KeySet(#[from] KeySetError),

    /// Possession proof failed
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// Signed headers disagree with the envelope they carry
    #[error("signed request does not match envelope: {reason}")]
    BindingMismatch {
        /// Which field disagrees
        reason: String,
    },

    /// Proof required but absent
    #[error("request carries no possession proof")]
    MissingProof,
}

impl InboundError {
    /// Taxonomy bucket for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Envelope(err) => err.kind(),
            Self::Replay(err) => err.kind(),
            Self::Signature(err) => err.kind(),
            Self::KeySet(err) => err.kind(),
            Self::Proof(err) => err.kind(),
            Self::BindingMismatch { .. } | Self::MissingProof => ErrorKind::SignatureInvalid,
        }
    }
}

/// An envelope that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedEnvelope {
    /// Parsed envelope, ready for decryption
    pub envelope: Envelope,
    /// Key the envelope was signed with
    pub key_id: String,
    /// Accepted possession proof, if one was presented
    pub proof: Option<VerifiedProof>,
}

/// Admission checks for inbound envelopes.
pub struct InboundPipeline<S: KeySetSource, E: Environment> {
    env: E,
    config: InboundConfig,
    replay: ReplayGuard<E>,
    keys: KeySetCache<S, E>,
    proofs: ProofVerifier<E>,
}

impl<S: KeySetSource, E: Environment> InboundPipeline<S, E> {
    /// Pipeline over existing shared components.
    pub fn new(
        env: E,
        config: InboundConfig,
        replay: ReplayGuard<E>,
        keys: KeySetCache<S, E>,
        proofs: ProofVerifier<E>,
    ) -> Self {
        Self { env, config, replay, keys, proofs }
    }

    /// Replay guard used by this pipeline.
    pub fn replay_guard(&self) -> &ReplayGuard<E> {
        &self.replay
    }

    /// Admit one envelope.
    ///
    /// `request` must carry `Content-Digest`, `Signature-Input`,
    /// `Signature` and the device header; `key_set_uri` is where the
    /// sender's keys are published. The signature must cover
    /// `content-digest` and the device header, and its nonce must be the
    /// envelope nonce.
    ///
    /// # Errors
    ///
    /// The first failing check, as an [`InboundError`].
    pub async fn accept(
        &self,
        request: &RequestParts,
        body: &[u8],
        key_set_uri: &str,
    ) -> Result<AcceptedEnvelope, InboundError> {
        let envelope = Envelope::from_json(body)?;

        let replay_check = envelope.replay_check();
        self.replay.check(&replay_check)?;

        let (metadata, signature) = extract_signature(request)?;
        for required in ["content-digest", DEVICE_ID_HEADER] {
            if !metadata.covered_fields.iter().any(|f| f == required) {
                return Err(SignatureError::MissingComponent { name: required.to_string() }.into());
            }
        }
        let digest = request
            .header("content-digest")
            .ok_or_else(|| SignatureError::MissingComponent { name: "content-digest".into() })?;
        verify_content_digest(digest, body)?;

        if request.header(DEVICE_ID_HEADER) != Some(envelope.device_id.as_str()) {
            return Err(mismatch("device id"));
        }
        if metadata.nonce.as_deref() != Some(envelope.nonce.as_str()) {
            return Err(mismatch("nonce"));
        }

        let key = self.keys.fetch_public_key(&metadata.key_id, key_set_uri).await?;
        let now = i64::try_from(self.env.wall_clock_secs()).unwrap_or(i64::MAX);
        verify_http_signature(request, &metadata, &signature, &key, now, self.config.signature)
            .inspect_err(|err| {
                tracing::warn!(
                    sender_id = %envelope.sender_id,
                    key_id = %metadata.key_id,
                    kind = %err.kind(),
                    "envelope signature rejected: {err}"
                );
            })?;

        let proof = match request.header("dpop") {
            Some(token) => Some(self.verify_proof(request, token)?),
            None if self.config.require_proof => return Err(InboundError::MissingProof),
            None => None,
        };

        // Re-checked under the lock: a concurrent duplicate may have landed
        self.replay.validate_message(&replay_check)?;

        tracing::debug!(
            sender_id = %envelope.sender_id,
            device_id = %envelope.device_id,
            counter = envelope.counter,
            "accepted envelope"
        );
        Ok(AcceptedEnvelope { envelope, key_id: metadata.key_id, proof })
    }

    fn verify_proof(
        &self,
        request: &RequestParts,
        token: &str,
    ) -> Result<VerifiedProof, InboundError> {
        let url = format!("{}{}", self.config.public_origin, request.target());
        let access_token = request
            .header("authorization")
            .and_then(|value| value.strip_prefix("DPoP ").or_else(|| value.strip_prefix("Bearer ")));

        let expected = ProofExpectations { method: request.method(), url: &url, access_token };
        self.proofs.verify(token, &expected).map_err(InboundError::from)
    }
}

fn mismatch(reason: &str) -> InboundError {
    InboundError::BindingMismatch { reason: reason.to_string() }
}
