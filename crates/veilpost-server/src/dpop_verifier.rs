//! Stateful proof verification with single-use `jti`.
//!
//! Wraps the stateless checks in [`veilpost_core::dpop::verify_proof`] with a
//! seen-set of proof identifiers. An identifier is remembered until the
//! proof could no longer pass the freshness checks anyway, then swept.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]
#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use veilpost_core::{
    dpop::{ProofError, ProofExpectations, ProofOptions, VerifiedProof, verify_proof},
    env::Environment,
};

/// Default number of tracked `jti` values that triggers a sweep.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

/// Verifier tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofVerifierConfig {
    /// Freshness window and future skew.
    pub options: ProofOptions,
    /// Tracked identifiers above which `verify` sweeps before inserting.
    pub sweep_threshold: usize,
}

impl Default for ProofVerifierConfig {
    fn default() -> Self {
        Self { options: ProofOptions::default(), sweep_threshold: DEFAULT_SWEEP_THRESHOLD }
    }
}

/// Proof verifier shared across request handlers.
///
/// Clones share the same seen-set.
#[derive(Clone)]
pub struct ProofVerifier<E: Environment> {
    env: E,
    config: ProofVerifierConfig,
    /// `jti` to the Unix second after which it can be forgotten
    seen: Arc<Mutex<HashMap<String, i64>>>,
}

impl<E: Environment> ProofVerifier<E> {
    /// Verifier with default tuning.
    pub fn new(env: E) -> Self {
        Self::with_config(env, ProofVerifierConfig::default())
    }

    /// Verifier with explicit tuning.
    pub fn with_config(env: E, config: ProofVerifierConfig) -> Self {
        Self { env, config, seen: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Verify `token` and consume its `jti`.
    ///
    /// The seen-set is only touched once every stateless check has passed,
    /// so an invalid proof cannot burn a legitimate client's identifier.
    ///
    /// # Errors
    ///
    /// - `ProofError::Replayed` if the `jti` was already accepted
    /// - any error from [`verify_proof`]
    pub fn verify(
        &self,
        token: &str,
        expected: &ProofExpectations<'_>,
    ) -> Result<VerifiedProof, ProofError> {
        let now = self.now();
        let verified = verify_proof(token, expected, now, self.config.options).inspect_err(|err| {
            tracing::warn!(kind = %err.kind(), "rejected proof: {err}");
        })?;

        // Past this point the proof fails on age or expiry regardless of jti
        let forget_after = verified
            .claims
            .exp
            .max(verified.claims.iat.saturating_add(self.config.options.max_age_secs));

        let mut seen = self.seen.lock().expect("ProofVerifier mutex poisoned");
        if seen.len() >= self.config.sweep_threshold {
            sweep(&mut seen, now);
        }
        if seen.contains_key(&verified.claims.jti) {
            tracing::warn!(jti = %verified.claims.jti, "proof replayed");
            return Err(ProofError::Replayed { jti: verified.claims.jti });
        }
        seen.insert(verified.claims.jti.clone(), forget_after);
        drop(seen);

        tracing::debug!(htm = %verified.claims.htm, htu = %verified.claims.htu, "accepted proof");
        Ok(verified)
    }

    /// Forget identifiers whose proofs can no longer verify. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now();
        let mut seen = self.seen.lock().expect("ProofVerifier mutex poisoned");
        sweep(&mut seen, now)
    }

    /// Number of remembered identifiers.
    pub fn tracked(&self) -> usize {
        self.seen.lock().expect("ProofVerifier mutex poisoned").len()
    }

    fn now(&self) -> i64 {
        i64::try_from(self.env.wall_clock_secs()).unwrap_or(i64::MAX)
    }
}

fn sweep(seen: &mut HashMap<String, i64>, now: i64) -> usize {
    let before = seen.len();
    seen.retain(|_, forget_after| *forget_after >= now);
    before - seen.len()
}
