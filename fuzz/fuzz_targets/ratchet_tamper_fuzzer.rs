//! Fuzz target for ratchet message authentication
//!
//! # Strategy
//!
//! - Establish a session and exchange a few messages
//! - Mutate one message (ciphertext bytes, nonce, sequence, timestamp)
//! - Deliver the mutated message to the receiver
//!
//! # Invariants
//!
//! - A mutated message never decrypts
//! - A rejected message leaves the receiver able to decrypt the original

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veilpost_core::{env::test_utils::MockEnv, ratchet::RatchetEngine};
use veilpost_crypto::KeyPair;

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    plaintext: Vec<u8>,
    mutation: Mutation,
}

#[derive(Debug, Arbitrary)]
enum Mutation {
    FlipCiphertext { index: usize, mask: u8 },
    Truncate { len: usize },
    FlipNonce { index: usize, mask: u8 },
    ShiftTimestamp { millis: i32 },
}

fuzz_target!(|input: Input| {
    let engine = RatchetEngine::new(MockEnv::with_seed(input.seed));
    let bob_identity = KeyPair::from_secret_bytes([0x5A; 32]);
    let shared = [0x33; 32];
    let alice = engine.init_as_initiator(&bob_identity.public_bytes(), &shared);
    let bob = engine.init_as_responder(&bob_identity.secret(), &shared);

    let Ok((original, _)) = engine.encrypt(&alice, &input.plaintext) else {
        panic!("fresh session failed to encrypt");
    };

    let mut mutated = original.clone();
    match input.mutation {
        Mutation::FlipCiphertext { index, mask } => {
            if mutated.ciphertext.is_empty() || mask == 0 {
                return;
            }
            let index = index % mutated.ciphertext.len();
            mutated.ciphertext[index] ^= mask;
        },
        Mutation::Truncate { len } => {
            if len >= mutated.ciphertext.len() {
                return;
            }
            mutated.ciphertext.truncate(len);
        },
        Mutation::FlipNonce { index, mask } => {
            if mask == 0 {
                return;
            }
            let index = index % mutated.nonce.len();
            mutated.nonce[index] ^= mask;
        },
        Mutation::ShiftTimestamp { millis } => {
            if millis == 0 {
                return;
            }
            mutated.timestamp += chrono::Duration::milliseconds(i64::from(millis));
        },
    }

    assert!(engine.decrypt(&bob, &mutated).is_err(), "mutated message decrypted");

    let Ok((plaintext, _)) = engine.decrypt(&bob, &original) else {
        panic!("original failed to decrypt after a rejected forgery");
    };
    assert_eq!(plaintext, input.plaintext);
});
