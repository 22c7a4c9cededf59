//! Ratchet operations

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use veilpost_crypto::{
    CryptoError, KEY_SIZE, KeyPair, SecretKey, aead, derive_key, encoding,
    kdf::{ROOT_INIT_LABEL, SENDING_INIT_LABEL},
    kdf_root,
};

use super::{
    error::{ChainDirection, RatchetError},
    message::{EncryptedMessage, PublicKeyDescriptor},
    state::{ChainKey, RatchetState},
};
use crate::env::Environment;

/// Size of the random session identifier before hex encoding
const SESSION_ID_SIZE: usize = 16;

/// Stateless ratchet engine.
///
/// Holds only the environment (randomness and wall clock). Every session's
/// state is passed in and returned by value.
#[derive(Clone)]
pub struct RatchetEngine<E: Environment> {
    env: E,
}

impl<E: Environment> RatchetEngine<E> {
    /// Create an engine over an environment.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Start a session as the party sending first.
    ///
    /// Root key and send chain come from two independent derivations of the
    /// shared secret. A fresh ratchet key pair is generated; its public half
    /// is what the peer needs for its first ratchet step.
    pub fn init_as_initiator(
        &self,
        peer_public_key: &[u8; KEY_SIZE],
        shared_secret: &[u8; KEY_SIZE],
    ) -> RatchetState {
        let root_key = derive_key(shared_secret, ROOT_INIT_LABEL);
        let send_key = derive_key(shared_secret, SENDING_INIT_LABEL);
        let key_pair = KeyPair::from_secret_bytes(self.env.random_array());

        let state = RatchetState {
            session_id: self.session_id(),
            dh_send: key_pair.secret(),
            dh_recv: Some(*peer_public_key),
            root_key,
            send_chain: Some(ChainKey::new(send_key)),
            recv_chain: None,
            next_send_sequence: 0,
            received_indices: BTreeSet::new(),
            created_at: self.timestamp(),
        };

        tracing::debug!(session_id = %state.session_id, "initialised ratchet as initiator");
        state
    }

    /// Start a session as the party receiving first.
    ///
    /// Mirrors the initiator, seeding the receive chain. The peer's ratchet
    /// key stays unknown until its first ratchet step.
    pub fn init_as_responder(
        &self,
        own_private_key: &SecretKey,
        shared_secret: &[u8; KEY_SIZE],
    ) -> RatchetState {
        let root_key = derive_key(shared_secret, ROOT_INIT_LABEL);
        let recv_key = derive_key(shared_secret, SENDING_INIT_LABEL);

        let state = RatchetState {
            session_id: self.session_id(),
            dh_send: own_private_key.clone(),
            dh_recv: None,
            root_key,
            send_chain: None,
            recv_chain: Some(ChainKey::new(recv_key)),
            next_send_sequence: 0,
            received_indices: BTreeSet::new(),
            created_at: self.timestamp(),
        };

        tracing::debug!(session_id = %state.session_id, "initialised ratchet as responder");
        state
    }

    /// Encrypt one message and advance the send chain.
    ///
    /// # Errors
    ///
    /// - `MissingChain`: responder that has not performed a ratchet step
    /// - `SequenceExhausted`: 2^32 messages sent in this session or chain
    pub fn encrypt(
        &self,
        state: &RatchetState,
        plaintext: &[u8],
    ) -> Result<(EncryptedMessage, RatchetState), RatchetError> {
        let chain = state
            .send_chain
            .as_ref()
            .ok_or(RatchetError::MissingChain { direction: ChainDirection::Sending })?;
        let sequence = state.next_send_sequence;
        let next_sequence = sequence
            .checked_add(1)
            .ok_or(RatchetError::SequenceExhausted { direction: ChainDirection::Sending })?;

        let (message_key, next_chain) = chain.step(ChainDirection::Sending)?;
        let nonce = self.env.random_array();
        let timestamp = self.timestamp();
        let aad = EncryptedMessage::associated_data(sequence, timestamp);
        let ciphertext = aead::seal(&message_key, &nonce, plaintext, &aad);
        drop(message_key);

        let mut next = state.clone();
        next.send_chain = Some(next_chain);
        next.next_send_sequence = next_sequence;

        tracing::debug!(session_id = %state.session_id, sequence, "encrypted message");
        Ok((EncryptedMessage { ciphertext, nonce, sequence, timestamp }, next))
    }

    /// Decrypt one message and advance the receive chain.
    ///
    /// Messages must be decrypted in the order their keys were derived. A
    /// sequence at or below the highest one already accepted is a replay,
    /// even after ratchet steps, and is rejected before any key is derived.
    ///
    /// # Errors
    ///
    /// - `Replayed`: sequence already accepted (or lower than one that was)
    /// - `MissingChain`: no receive chain yet
    /// - `DecryptionFailed`: wrong key, out-of-order delivery, or tampering
    pub fn decrypt(
        &self,
        state: &RatchetState,
        encrypted: &EncryptedMessage,
    ) -> Result<(Vec<u8>, RatchetState), RatchetError> {
        if state.is_replay(encrypted.sequence) {
            tracing::warn!(
                session_id = %state.session_id,
                sequence = encrypted.sequence,
                "rejected replayed sequence"
            );
            return Err(RatchetError::Replayed { sequence: encrypted.sequence });
        }

        let chain = state
            .recv_chain
            .as_ref()
            .ok_or(RatchetError::MissingChain { direction: ChainDirection::Receiving })?;
        let (message_key, next_chain) = chain.step(ChainDirection::Receiving)?;

        let aad = EncryptedMessage::associated_data(encrypted.sequence, encrypted.timestamp);
        let opened = aead::open(&message_key, &encrypted.nonce, &encrypted.ciphertext, &aad);
        drop(message_key);

        let plaintext = opened.map_err(|_| {
            tracing::warn!(
                session_id = %state.session_id,
                sequence = encrypted.sequence,
                "message failed authentication"
            );
            RatchetError::DecryptionFailed { reason: "authentication failed".to_string() }
        })?;

        let mut next = state.clone();
        next.recv_chain = Some(next_chain);
        next.received_indices.insert(encrypted.sequence);

        tracing::debug!(session_id = %state.session_id, sequence = encrypted.sequence, "decrypted message");
        Ok((plaintext, next))
    }

    /// DH ratchet step on receipt of a new peer public key.
    ///
    /// Two agreements are mixed into the root key in sequence: our current
    /// private key with theirs (new receive chain), then a freshly generated
    /// private key with theirs (new send chain). Both chains restart at 0.
    ///
    /// A responder stepping for the first time has no previous peer key; its
    /// receive chain was seeded from the shared secret and is kept, so only
    /// the send half runs.
    ///
    /// # Errors
    ///
    /// - `StaleRatchetKey`: `their_public_key` is already the current peer key
    /// - `InvalidKey`: low-order peer key
    pub fn ratchet_step(
        &self,
        state: &RatchetState,
        their_public_key: &[u8; KEY_SIZE],
    ) -> Result<RatchetState, RatchetError> {
        if state.dh_recv.as_ref() == Some(their_public_key) {
            return Err(RatchetError::StaleRatchetKey);
        }

        let mut next = state.clone();

        if state.dh_recv.is_some() {
            let current = KeyPair::from_secret(&state.dh_send);
            let dh_output = current.diffie_hellman(their_public_key).map_err(invalid_key)?;
            let (root_key, recv_key) = kdf_root(&next.root_key, &dh_output);
            next.root_key = root_key;
            next.recv_chain = Some(ChainKey::new(recv_key));
        }

        let fresh = KeyPair::from_secret_bytes(self.env.random_array());
        let dh_output = fresh.diffie_hellman(their_public_key).map_err(invalid_key)?;
        let (root_key, send_key) = kdf_root(&next.root_key, &dh_output);
        next.root_key = root_key;
        next.send_chain = Some(ChainKey::new(send_key));
        next.dh_send = fresh.secret();
        next.dh_recv = Some(*their_public_key);

        tracing::debug!(session_id = %state.session_id, "performed DH ratchet step");
        Ok(next)
    }

    /// Public half of the current ratchet key, for delivery to the peer.
    pub fn export_public_key(&self, state: &RatchetState) -> PublicKeyDescriptor {
        PublicKeyDescriptor {
            kty: "OKP".to_string(),
            crv: "X25519".to_string(),
            x: encoding::encode(&state.public_key()),
            key_use: "enc".to_string(),
            kid: state.session_id.clone(),
        }
    }

    fn session_id(&self) -> String {
        let bytes: [u8; SESSION_ID_SIZE] = self.env.random_array();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.env.wall_clock_millis()).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn invalid_key(err: CryptoError) -> RatchetError {
    RatchetError::InvalidKey { reason: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::test_utils::MockEnv;

    const SHARED: [u8; 32] = [0x42; 32];

    fn pair() -> (RatchetEngine<MockEnv>, RatchetState, RatchetState) {
        let engine = RatchetEngine::new(MockEnv::with_seed(11));
        let bob_identity = KeyPair::from_secret_bytes([0x0B; 32]);

        let alice = engine.init_as_initiator(&bob_identity.public_bytes(), &SHARED);
        let bob = engine.init_as_responder(&bob_identity.secret(), &SHARED);
        (engine, alice, bob)
    }

    #[test]
    fn alice_to_bob_roundtrip() {
        let (engine, alice, bob) = pair();

        let (first, alice) = engine.encrypt(&alice, b"hello").unwrap();
        let (plaintext, bob) = engine.decrypt(&bob, &first).unwrap();
        assert_eq!(plaintext, b"hello");

        let (second, _alice) = engine.encrypt(&alice, b"again").unwrap();
        let (plaintext, bob) = engine.decrypt(&bob, &second).unwrap();
        assert_eq!(plaintext, b"again");

        assert!(matches!(
            engine.decrypt(&bob, &first),
            Err(RatchetError::Replayed { sequence: 0 })
        ));
    }

    #[test]
    fn encrypt_advances_only_the_returned_state() {
        let (engine, alice, _bob) = pair();

        let (message, next) = engine.encrypt(&alice, b"x").unwrap();

        assert_eq!(message.sequence, 0);
        assert_eq!(alice.send_chain().unwrap().index(), 0, "input state must not change");
        assert_eq!(next.send_chain().unwrap().index(), 1);
        assert_eq!(next.next_send_sequence(), 1);
    }

    #[test]
    fn responder_cannot_send_before_stepping() {
        let (engine, _alice, bob) = pair();

        assert_eq!(
            engine.encrypt(&bob, b"too early").unwrap_err(),
            RatchetError::MissingChain { direction: ChainDirection::Sending }
        );
    }

    #[test]
    fn failed_decryption_leaves_state_usable() {
        let (engine, alice, bob) = pair();
        let (mut message, _) = engine.encrypt(&alice, b"hello").unwrap();
        let original = message.clone();
        message.ciphertext[0] ^= 0x80;

        let err = engine.decrypt(&bob, &message).unwrap_err();
        assert!(matches!(err, RatchetError::DecryptionFailed { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::DecryptionFailed);

        let (plaintext, _) = engine.decrypt(&bob, &original).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn altered_sequence_fails_authentication() {
        let (engine, alice, bob) = pair();
        let (mut message, _) = engine.encrypt(&alice, b"hello").unwrap();
        message.sequence = 5;

        assert!(matches!(
            engine.decrypt(&bob, &message),
            Err(RatchetError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn out_of_order_delivery_is_not_accepted() {
        let (engine, alice, bob) = pair();
        let (first, alice) = engine.encrypt(&alice, b"one").unwrap();
        let (second, _) = engine.encrypt(&alice, b"two").unwrap();

        // second message needs the second chain key
        assert!(engine.decrypt(&bob, &second).is_err());

        let (_, bob) = engine.decrypt(&bob, &first).unwrap();
        let (plaintext, _) = engine.decrypt(&bob, &second).unwrap();
        assert_eq!(plaintext, b"two");
    }

    #[test]
    fn full_conversation_with_ratchet_steps() {
        let (engine, alice, bob) = pair();

        let (m1, alice) = engine.encrypt(&alice, b"hi bob").unwrap();
        let (_, bob) = engine.decrypt(&bob, &m1).unwrap();

        // Bob replies: steps against Alice's announced key
        let bob = engine.ratchet_step(&bob, &alice.public_key()).unwrap();
        let (r1, bob) = engine.encrypt(&bob, b"hi alice").unwrap();

        let alice = engine.ratchet_step(&alice, &bob.public_key()).unwrap();
        let (plaintext, alice) = engine.decrypt(&alice, &r1).unwrap();
        assert_eq!(plaintext, b"hi alice");

        // Alice answers on her fresh send chain
        let (m2, alice) = engine.encrypt(&alice, b"how are you").unwrap();
        assert_eq!(m2.sequence, 1, "sequence survives ratchet steps");
        assert_eq!(alice.send_chain().unwrap().index(), 1, "chain index restarted");

        let bob = engine.ratchet_step(&bob, &alice.public_key()).unwrap();
        let (plaintext, bob) = engine.decrypt(&bob, &m2).unwrap();
        assert_eq!(plaintext, b"how are you");

        // replaying the very first message after two ratchet steps still fails
        assert!(matches!(engine.decrypt(&bob, &m1), Err(RatchetError::Replayed { .. })));
    }

    #[test]
    fn repeated_step_with_same_key_is_rejected() {
        let (engine, alice, bob) = pair();
        let bob = engine.ratchet_step(&bob, &alice.public_key()).unwrap();

        assert_eq!(
            engine.ratchet_step(&bob, &alice.public_key()).unwrap_err(),
            RatchetError::StaleRatchetKey
        );
    }

    #[test]
    fn low_order_peer_key_is_rejected() {
        let (engine, alice, _bob) = pair();

        let err = engine.ratchet_step(&alice, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, RatchetError::InvalidKey { .. }));
    }

    #[test]
    fn exported_key_matches_state() {
        let (engine, alice, _bob) = pair();
        let descriptor = engine.export_public_key(&alice);

        assert_eq!(descriptor.kty, "OKP");
        assert_eq!(descriptor.crv, "X25519");
        assert_eq!(descriptor.key_use, "enc");
        assert_eq!(descriptor.kid, alice.session_id());
        assert_eq!(encoding::decode_key(&descriptor.x).unwrap(), alice.public_key());
    }

    #[test]
    fn session_ids_are_random_hex() {
        let (_engine, alice, bob) = pair();

        assert_eq!(alice.session_id().len(), 32);
        assert!(alice.session_id().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(alice.session_id(), bob.session_id());
    }
}
