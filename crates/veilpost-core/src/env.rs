//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Engines
//! take an `Environment` at construction; production code passes the server
//! crate's `SystemEnv`, tests pass a seeded [`test_utils::MockEnv`].

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type used for cache lifetimes.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time as milliseconds since the Unix epoch.
    ///
    /// Used for message timestamps and freshness checks, which must be
    /// comparable across machines. Not guaranteed monotonic.
    fn wall_clock_millis(&self) -> u64;

    /// Wall-clock time as whole seconds since the Unix epoch.
    fn wall_clock_secs(&self) -> u64 {
        self.wall_clock_millis() / 1000
    }

    /// Fixed-size array of random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Deterministic environment for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    #![allow(clippy::disallowed_types, reason = "Test-only shared RNG state")]
    #![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use super::Environment;

    /// Wall clock a fresh `MockEnv` starts at (2023-11-14T22:13:20Z).
    pub const DEFAULT_WALL_CLOCK_MILLIS: u64 = 1_700_000_000_000;

    /// Seeded RNG with a manually advanced clock.
    ///
    /// Clones share state, so advancing one handle advances all of them.
    #[derive(Clone)]
    pub struct MockEnv {
        inner: Arc<Mutex<MockEnvInner>>,
    }

    struct MockEnvInner {
        rng: ChaCha20Rng,
        elapsed: Duration,
        wall_clock_millis: u64,
    }

    impl MockEnv {
        /// Environment with a fixed seed: identical runs produce identical
        /// keys, nonces, and session ids.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                inner: Arc::new(Mutex::new(MockEnvInner {
                    rng: ChaCha20Rng::seed_from_u64(seed),
                    elapsed: Duration::ZERO,
                    wall_clock_millis: DEFAULT_WALL_CLOCK_MILLIS,
                })),
            }
        }

        /// Environment seeded from OS entropy, for tests that only need
        /// distinct keys.
        pub fn with_crypto_rng() -> Self {
            Self::with_seed(rand::random())
        }

        /// Advance both the monotonic and the wall clock.
        pub fn advance(&self, duration: Duration) {
            let mut inner = self.inner.lock().expect("MockEnv mutex poisoned");
            inner.elapsed += duration;
            inner.wall_clock_millis += duration.as_millis() as u64;
        }

        /// Set the wall clock without touching the monotonic clock.
        pub fn set_wall_clock_secs(&self, secs: u64) {
            let mut inner = self.inner.lock().expect("MockEnv mutex poisoned");
            inner.wall_clock_millis = secs * 1000;
        }
    }

    impl Environment for MockEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            self.inner.lock().expect("MockEnv mutex poisoned").elapsed
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.inner.lock().expect("MockEnv mutex poisoned").rng.fill_bytes(buffer);
        }

        fn wall_clock_millis(&self) -> u64 {
            self.inner.lock().expect("MockEnv mutex poisoned").wall_clock_millis
        }
    }

}
