//! Fuzz target for the replay guard state machine
//!
//! # Strategy
//!
//! - A handful of devices sending with arbitrary counters and nonces
//! - Clock advances, including past the freshness window
//! - Device resets
//!
//! # Invariants
//!
//! - Accepted counters strictly increase per device
//! - An accepted nonce is never accepted again while it is retained
//! - Violation totals match the number of rejections

#![no_main]

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veilpost_core::{ReplayCheck, env::Environment, env::test_utils::MockEnv};
use veilpost_server::ReplayGuard;

#[derive(Debug, Arbitrary)]
enum Op {
    Send { device: u8, nonce: u8, counter: u16 },
    Advance { secs: u16 },
    Reset { device: u8 },
}

fuzz_target!(|ops: Vec<Op>| {
    let env = MockEnv::with_seed(0);
    let guard = ReplayGuard::new(env.clone());

    let mut highest: HashMap<String, u64> = HashMap::new();
    let mut accepted_nonces: HashSet<(String, String)> = HashSet::new();
    let mut rejections = 0u64;

    for op in ops {
        match op {
            Op::Send { device, nonce, counter } => {
                let device = format!("d{}", device % 4);
                let nonce = format!("n{nonce}");
                let millis = i64::try_from(env.wall_clock_millis()).unwrap_or(i64::MAX);
                let check = ReplayCheck {
                    nonce: nonce.clone(),
                    counter: u64::from(counter),
                    device_id: device.clone(),
                    timestamp: chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default(),
                    sender_id: "alice".to_string(),
                };

                if guard.validate_message(&check).is_ok() {
                    let last = highest.entry(device.clone()).or_insert(0);
                    assert!(check.counter > *last, "counter {} accepted after {last}", check.counter);
                    *last = check.counter;
                    accepted_nonces.insert((device, nonce));
                } else {
                    rejections += 1;
                }
            },
            Op::Advance { secs } => env.advance(Duration::from_secs(u64::from(secs))),
            Op::Reset { device } => {
                let device = format!("d{}", device % 4);
                guard.reset_device("alice", &device);
                highest.remove(&device);
                accepted_nonces.retain(|(d, _)| *d != device);
            },
        }
    }

    assert_eq!(guard.violation_counts().total(), rejections);
    assert!(guard.nonce_count() <= accepted_nonces.len());
});
