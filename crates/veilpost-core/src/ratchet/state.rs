//! Session state values

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use veilpost_crypto::{KEY_SIZE, KeyPair, SecretKey, kdf_chain};

use super::error::{ChainDirection, RatchetError};

/// Symmetric chain key with its position in the chain.
#[derive(Clone)]
pub struct ChainKey {
    key: SecretKey,
    index: u32,
}

impl ChainKey {
    /// Chain key at index 0.
    pub fn new(key: SecretKey) -> Self {
        Self { key, index: 0 }
    }

    /// Number of message keys already drawn from this chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Derive the next message key and the successor chain key.
    ///
    /// `self` is not modified; the caller decides whether to adopt the
    /// successor (it must not on a failed decryption).
    pub(crate) fn step(
        &self,
        direction: ChainDirection,
    ) -> Result<(SecretKey, ChainKey), RatchetError> {
        let index = self
            .index
            .checked_add(1)
            .ok_or(RatchetError::SequenceExhausted { direction })?;
        let (message_key, next_key) = kdf_chain(&self.key);
        Ok((message_key, ChainKey { key: next_key, index }))
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKey").field("index", &self.index).finish_non_exhaustive()
    }
}

/// Immutable snapshot of one pairwise session.
///
/// # Invariants
///
/// - `received_indices` only grows, and every element is at most its maximum
/// - `next_send_sequence` only grows; it is never reset by a ratchet step,
///   while chain indices restart at 0
/// - `dh_recv` is `None` only for a responder that has not stepped yet
#[derive(Clone)]
pub struct RatchetState {
    pub(crate) session_id: String,
    pub(crate) dh_send: SecretKey,
    pub(crate) dh_recv: Option<[u8; KEY_SIZE]>,
    pub(crate) root_key: SecretKey,
    pub(crate) send_chain: Option<ChainKey>,
    pub(crate) recv_chain: Option<ChainKey>,
    pub(crate) next_send_sequence: u32,
    pub(crate) received_indices: BTreeSet<u32>,
    pub(crate) created_at: DateTime<Utc>,
}

impl RatchetState {
    /// Random session identifier (hex), also the `kid` of exported keys.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// When the session was initialised.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Our current ratchet public key.
    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        KeyPair::from_secret(&self.dh_send).public_bytes()
    }

    /// Peer's current ratchet public key, once known.
    pub fn peer_public_key(&self) -> Option<[u8; KEY_SIZE]> {
        self.dh_recv
    }

    /// Current send chain, if established.
    pub fn send_chain(&self) -> Option<&ChainKey> {
        self.send_chain.as_ref()
    }

    /// Current receive chain, if established.
    pub fn recv_chain(&self) -> Option<&ChainKey> {
        self.recv_chain.as_ref()
    }

    /// Sequence number the next outbound message will carry.
    pub fn next_send_sequence(&self) -> u32 {
        self.next_send_sequence
    }

    /// Sequence numbers accepted so far, ascending.
    pub fn received_indices(&self) -> &BTreeSet<u32> {
        &self.received_indices
    }

    /// Whether `sequence` would be rejected as a replay.
    pub fn is_replay(&self, sequence: u32) -> bool {
        self.received_indices.last().is_some_and(|&highest| sequence <= highest)
    }
}

impl fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetState")
            .field("session_id", &self.session_id)
            .field("send_chain", &self.send_chain)
            .field("recv_chain", &self.recv_chain)
            .field("next_send_sequence", &self.next_send_sequence)
            .field("received", &self.received_indices.len())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
