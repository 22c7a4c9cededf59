//! Production environment: system clocks and OS randomness.

use veilpost_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// Randomness comes from getrandom (e.g. `/dev/urandom` on Linux,
/// `BCryptGenRandom` on Windows) and is suitable for ratchet keys, nonces and
/// proof keys.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without working randomness no key or nonce
/// this crate produces can be trusted, so there is nothing to fall back to.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }
}
