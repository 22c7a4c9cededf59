//! Property tests for the replay guard.
//!
//! - Counter monotonicity: a message is accepted exactly when its counter
//!   exceeds every counter accepted before it from the same device
//! - Nonce uniqueness: an accepted nonce never passes again, whatever its
//!   counter
//! - Isolation: devices never affect each other's acceptance

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use veilpost_core::{ReplayCheck, env::Environment, env::test_utils::MockEnv};
use veilpost_server::{ReplayGuard, ReplayViolation};

fn now(env: &MockEnv) -> DateTime<Utc> {
    let millis = i64::try_from(env.wall_clock_millis()).unwrap();
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn check(env: &MockEnv, device: &str, nonce: String, counter: u64) -> ReplayCheck {
    ReplayCheck {
        nonce,
        counter,
        device_id: device.to_string(),
        timestamp: now(env),
        sender_id: "alice".to_string(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn accepted_counters_strictly_increase(counters in prop::collection::vec(0u64..50, 1..40)) {
        let env = MockEnv::with_seed(1);
        let guard = ReplayGuard::new(env.clone());

        let mut highest = 0u64;
        for (i, counter) in counters.into_iter().enumerate() {
            let result = guard.validate_message(&check(&env, "phone", format!("n{i}"), counter));
            if counter > highest {
                prop_assert!(result.is_ok());
                highest = counter;
            } else {
                let is_regression =
                    matches!(result, Err(ReplayViolation::CounterRegression { .. }));
                prop_assert!(is_regression);
            }
        }

        let stats = guard.device_stats();
        let recorded = stats.get("alice").and_then(|devices| devices.get("phone"));
        prop_assert_eq!(recorded.map_or(0, |d| d.last_counter), highest);
    }

    #[test]
    fn accepted_nonce_never_passes_again(count in 1usize..20, retry in 0usize..20) {
        let env = MockEnv::with_seed(2);
        let guard = ReplayGuard::new(env.clone());

        for i in 0..count {
            let counter = u64::try_from(i).unwrap() + 1;
            let nonce = format!("n{i}");
            prop_assert!(guard.validate_message(&check(&env, "phone", nonce, counter)).is_ok());
        }

        let reused = format!("n{}", retry % count);
        let result = guard.validate_message(&check(&env, "phone", reused, u64::MAX));
        let is_reuse = matches!(result, Err(ReplayViolation::NonceReused { .. }));
        prop_assert!(is_reuse);
        prop_assert_eq!(guard.violation_counts().nonce_reused, 1);
    }

    #[test]
    fn devices_are_independent(
        phone in prop::collection::vec(1u64..1000, 1..20),
        laptop in prop::collection::vec(1u64..1000, 1..20),
    ) {
        let env = MockEnv::with_seed(3);
        let shared = ReplayGuard::new(env.clone());
        let alone = ReplayGuard::new(env.clone());

        let mut expected = Vec::new();
        for (i, counter) in laptop.iter().enumerate() {
            let accepted = alone
                .validate_message(&check(&env, "laptop", format!("l{i}"), *counter))
                .is_ok();
            expected.push(accepted);
        }

        for (i, counter) in phone.iter().enumerate() {
            let _ = shared.validate_message(&check(&env, "phone", format!("p{i}"), *counter));
        }
        for (i, counter) in laptop.iter().enumerate() {
            let accepted = shared
                .validate_message(&check(&env, "laptop", format!("l{i}"), *counter))
                .is_ok();
            prop_assert_eq!(accepted, expected[i]);
        }
    }
}
