//! Fuzz target for possession-proof parsing and verification
//!
//! Arbitrary tokens go through both the parser and the full verifier. No
//! arbitrary token can carry a valid ES256 signature, so verification must
//! always fail.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veilpost_core::dpop::{ProofExpectations, ProofOptions, parse_proof, verify_proof};

const NOW: i64 = 1_700_000_000;

fuzz_target!(|token: &str| {
    let _ = parse_proof(token);

    let expected = ProofExpectations {
        method: "POST",
        url: "https://api.example/v1/messages",
        access_token: None,
    };
    assert!(verify_proof(token, &expected, NOW, ProofOptions::default()).is_err());
});
