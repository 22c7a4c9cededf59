//! Transport envelope and its signature.
//!
//! The outbound path is: encrypt with a ratchet session or group, wrap the
//! ciphertext in an [`Envelope`] carrying the replay metadata, then sign the
//! serialized envelope as an HTTP request body. The receiver reverses it:
//! replay check on [`Envelope::replay_check`], signature and digest, then
//! decryption of [`EnvelopeBody`].

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use veilpost_crypto::encoding;

use crate::{
    env::Environment,
    error::ProtocolError,
    group::GroupMessage,
    ratchet::EncryptedMessage,
    signature::{
        ALGORITHM_ED25519, RequestParts, SignatureMetadata, content_digest, sign_request,
    },
};

/// Size of the random envelope nonce before encoding
const NONCE_SIZE: usize = 16;

/// Media type of a serialized envelope.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// Header carrying the sender's device id.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Components every envelope signature covers, in signing order.
pub const ENVELOPE_COVERED_FIELDS: [&str; 5] =
    ["@method", "@path", "content-type", "content-digest", DEVICE_ID_HEADER];

/// Replay metadata of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayCheck {
    /// Sender-chosen unique value
    pub nonce: String,
    /// Per-device counter, strictly increasing
    pub counter: u64,
    /// Sending device
    pub device_id: String,
    /// Sender wall clock
    pub timestamp: DateTime<Utc>,
    /// Sending user
    pub sender_id: String,
}

/// Ciphertext carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum EnvelopeBody {
    /// Pairwise ratchet message
    Direct(EncryptedMessage),
    /// Group application message
    Group(GroupMessage),
}

/// Signed unit of transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Sending user
    pub sender_id: String,
    /// Sending device
    pub device_id: String,
    /// Random base64url nonce, unique per envelope
    pub nonce: String,
    /// Per-device counter
    pub counter: u64,
    /// Sender wall clock
    pub timestamp: DateTime<Utc>,
    /// Encrypted payload
    pub body: EnvelopeBody,
}

impl Envelope {
    /// Wrap `body` with a fresh nonce and the current time.
    ///
    /// The caller owns the device counter and must pass a value larger than
    /// any it has sent before.
    pub fn new<E: Environment>(
        env: &E,
        sender_id: impl Into<String>,
        device_id: impl Into<String>,
        counter: u64,
        body: EnvelopeBody,
    ) -> Self {
        let millis = i64::try_from(env.wall_clock_millis()).unwrap_or(i64::MAX);
        Self {
            sender_id: sender_id.into(),
            device_id: device_id.into(),
            nonce: encoding::encode(&env.random_array::<NONCE_SIZE>()),
            counter,
            timestamp: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            body,
        }
    }

    /// Replay metadata for the inbound replay guard.
    pub fn replay_check(&self) -> ReplayCheck {
        ReplayCheck {
            nonce: self.nonce.clone(),
            counter: self.counter,
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            sender_id: self.sender_id.clone(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedEnvelope` if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self)
            .map_err(|err| ProtocolError::MalformedEnvelope { reason: err.to_string() })
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedEnvelope` if the bytes are not an envelope
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes)
            .map_err(|err| ProtocolError::MalformedEnvelope { reason: err.to_string() })
    }
}

/// An envelope ready to send: request line and headers plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Request carrying `Content-Digest`, `Signature-Input` and `Signature`
    pub request: RequestParts,
    /// Serialized envelope
    pub body: Vec<u8>,
}

/// Serialize and sign an envelope for delivery to `target`.
///
/// The signature covers [`ENVELOPE_COVERED_FIELDS`]; the envelope nonce is
/// reused as the signature nonce, and `created` is the envelope timestamp.
///
/// # Errors
///
/// - `ProtocolError::MalformedEnvelope` if serialization fails
/// - `ProtocolError::Signature` if signing fails
pub fn sign_envelope(
    envelope: &Envelope,
    target: &str,
    key_id: &str,
    signing_key: &SigningKey,
) -> Result<SignedEnvelope, ProtocolError> {
    let body = envelope.to_json()?;
    let mut request = RequestParts::new("POST", target)
        .with_header("content-type", ENVELOPE_CONTENT_TYPE)
        .with_header("content-digest", content_digest(&body))
        .with_header(DEVICE_ID_HEADER, envelope.device_id.clone());

    let metadata = SignatureMetadata::new(
        key_id,
        ALGORITHM_ED25519,
        envelope.timestamp.timestamp(),
        ENVELOPE_COVERED_FIELDS.iter().map(ToString::to_string).collect(),
    )
    .with_nonce(envelope.nonce.clone());

    sign_request(&request, &metadata, signing_key)?.apply(&mut request);

    tracing::debug!(
        sender_id = %envelope.sender_id,
        device_id = %envelope.device_id,
        counter = envelope.counter,
        "signed envelope"
    );
    Ok(SignedEnvelope { request, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::test_utils::MockEnv,
        signature::{VerifyOptions, extract_signature, verify_content_digest, verify_http_signature},
    };

    fn direct_body() -> EnvelopeBody {
        EnvelopeBody::Direct(EncryptedMessage {
            ciphertext: vec![9; 20],
            nonce: [1; 24],
            sequence: 0,
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        })
    }

    #[test]
    fn envelope_json_round_trip() {
        let env = MockEnv::with_seed(5);
        let envelope = Envelope::new(&env, "alice", "phone", 1, direct_body());

        let json: serde_json::Value = serde_json::from_slice(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["body"]["type"], "direct");

        assert_eq!(Envelope::from_json(&envelope.to_json().unwrap()).unwrap(), envelope);
    }

    #[test]
    fn nonces_differ_between_envelopes() {
        let env = MockEnv::with_seed(5);
        let first = Envelope::new(&env, "alice", "phone", 1, direct_body());
        let second = Envelope::new(&env, "alice", "phone", 2, direct_body());

        assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn replay_check_mirrors_envelope() {
        let env = MockEnv::with_seed(6);
        let envelope = Envelope::new(&env, "alice", "phone", 42, direct_body());
        let check = envelope.replay_check();

        assert_eq!(check.counter, 42);
        assert_eq!(check.nonce, envelope.nonce);
        assert_eq!(check.timestamp, envelope.timestamp);
    }

    #[test]
    fn signed_envelope_verifies() {
        let env = MockEnv::with_seed(7);
        let key = SigningKey::from_bytes(&[4u8; 32]);
        let envelope = Envelope::new(&env, "alice", "phone", 1, direct_body());

        let signed = sign_envelope(&envelope, "/v1/messages", "alice-phone", &key).unwrap();
        let (metadata, signature) = extract_signature(&signed.request).unwrap();

        assert_eq!(metadata.nonce.as_deref(), Some(envelope.nonce.as_str()));
        assert_eq!(
            verify_content_digest(signed.request.header("content-digest").unwrap(), &signed.body),
            Ok(())
        );
        assert_eq!(
            verify_http_signature(
                &signed.request,
                &metadata,
                &signature,
                &key.verifying_key(),
                envelope.timestamp.timestamp(),
                VerifyOptions::default(),
            ),
            Ok(())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Envelope::from_json(b"{\"senderId\":1}"),
            Err(ProtocolError::MalformedEnvelope { .. })
        ));
    }
}
