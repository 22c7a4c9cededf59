//! Replay defense for inbound envelopes.
//!
//! Tracks, per `(sender, device)`, the last accepted counter and timestamp,
//! and per `(sender, device, nonce)` the time the nonce was first accepted.
//!
//! # Invariants
//!
//! - Checks run in a fixed order: freshness, nonce uniqueness, counter
//!   monotonicity, timestamp monotonicity. State is committed only after all
//!   four pass.
//! - The whole check-then-commit runs under one lock acquisition, so two
//!   concurrent messages with the same nonce cannot both pass.
//! - [`ReplayGuard::check`] never changes device or nonce state, so
//!   unauthenticated input can be screened without letting it advance a
//!   device's counter.
//! - Nonce memory is bounded: past capacity the oldest quarter is dropped,
//!   and nonces older than twice the window are swept lazily. Evicting a nonce
//!   does not reopen a replay, because its counter is still behind the
//!   device's last counter.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]
#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use veilpost_core::{ErrorKind, ReplayCheck, env::Environment};

/// Default freshness window.
pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default nonce capacity before eviction.
pub const DEFAULT_MAX_NONCES: usize = 100_000;

/// Replay guard tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Maximum distance between a message timestamp and the local clock.
    pub time_window: Duration,
    /// Nonces retained before the oldest quarter is evicted.
    pub max_nonces: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { time_window: DEFAULT_TIME_WINDOW, max_nonces: DEFAULT_MAX_NONCES }
    }
}

/// Why a message was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayViolation {
    /// Timestamp further than the window from the local clock
    #[error("message timestamp {skew_ms}ms from now exceeds window of {window_ms}ms")]
    Stale {
        /// Absolute distance from the local clock
        skew_ms: u64,
        /// Configured window
        window_ms: u64,
    },

    /// Nonce already accepted for this device
    #[error("nonce {nonce} already seen for {sender_id}/{device_id}")]
    NonceReused {
        /// Reused nonce
        nonce: String,
        /// Sending user
        sender_id: String,
        /// Sending device
        device_id: String,
    },

    /// Counter not greater than the device's last counter
    #[error("counter {counter} not greater than last counter {last_counter}")]
    CounterRegression {
        /// Received counter
        counter: u64,
        /// Last accepted counter
        last_counter: u64,
    },

    /// Timestamp earlier than the device's last accepted message
    #[error("message timestamp {timestamp} precedes last accepted {last_timestamp}")]
    TimestampRegression {
        /// Received timestamp
        timestamp: DateTime<Utc>,
        /// Last accepted timestamp
        last_timestamp: DateTime<Utc>,
    },
}

impl ReplayViolation {
    /// Taxonomy bucket for this violation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stale { .. } | Self::TimestampRegression { .. } => ErrorKind::TimestampSkew,
            Self::NonceReused { .. } => ErrorKind::NonceReused,
            Self::CounterRegression { .. } => ErrorKind::CounterRegression,
        }
    }
}

/// Violations recorded since construction, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationCounts {
    /// Stale or regressing timestamps
    pub timestamp_skew: u64,
    /// Reused nonces
    pub nonce_reused: u64,
    /// Non-increasing counters
    pub counter_regression: u64,
}

impl ViolationCounts {
    /// Sum over all kinds.
    pub fn total(&self) -> u64 {
        self.timestamp_skew + self.nonce_reused + self.counter_regression
    }

    fn record(&mut self, violation: &ReplayViolation) {
        match violation.kind() {
            ErrorKind::NonceReused => self.nonce_reused += 1,
            ErrorKind::CounterRegression => self.counter_regression += 1,
            _ => self.timestamp_skew += 1,
        }
    }
}

/// Last accepted state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// Last accepted counter
    pub last_counter: u64,
    /// Timestamp of the last accepted message
    pub last_timestamp: DateTime<Utc>,
}

type DeviceKey = (String, String);
type NonceKey = (String, String, String);

/// Replay guard shared across inbound handlers.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct ReplayGuard<E: Environment> {
    env: E,
    config: ReplayConfig,
    inner: Arc<Mutex<ReplayGuardInner>>,
}

struct ReplayGuardInner {
    devices: HashMap<DeviceKey, DeviceStats>,
    /// Nonce to acceptance time (local wall clock, ms)
    nonces: HashMap<NonceKey, u64>,
    /// Acceptance order, oldest at front
    nonce_order: VecDeque<(NonceKey, u64)>,
    violations: ViolationCounts,
    last_sweep_ms: u64,
}

impl<E: Environment> ReplayGuard<E> {
    /// Guard with the default window and capacity.
    pub fn new(env: E) -> Self {
        Self::with_config(env, ReplayConfig::default())
    }

    /// Guard with explicit tuning.
    pub fn with_config(env: E, config: ReplayConfig) -> Self {
        let last_sweep_ms = env.wall_clock_millis();
        Self {
            env,
            config,
            inner: Arc::new(Mutex::new(ReplayGuardInner {
                devices: HashMap::new(),
                nonces: HashMap::new(),
                nonce_order: VecDeque::new(),
                violations: ViolationCounts::default(),
                last_sweep_ms,
            })),
        }
    }

    /// Run every check against current state without recording anything.
    ///
    /// For rejecting obvious replays before expensive or unauthenticated
    /// work. A message that passes must still go through
    /// [`validate_message`](Self::validate_message) once it is authenticated;
    /// only that call updates state.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn check(&self, check: &ReplayCheck) -> Result<(), ReplayViolation> {
        let now_ms = self.env.wall_clock_millis();
        let mut inner = self.inner.lock().expect("ReplayGuard mutex poisoned");

        inner.sweep(now_ms, self.config.time_window);

        let result = inner.check(check, now_ms, self.config.time_window);
        if let Err(violation) = &result {
            inner.violations.record(violation);
            log_violation(check, violation);
        }
        result
    }

    /// Validate one message and, if it passes, record it.
    ///
    /// Check and commit happen under one lock acquisition. Call this only for
    /// messages whose origin has been verified: a recorded counter is never
    /// rolled back.
    ///
    /// A device's first accepted counter must be at least 1.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn validate_message(&self, check: &ReplayCheck) -> Result<(), ReplayViolation> {
        let now_ms = self.env.wall_clock_millis();
        let mut inner = self.inner.lock().expect("ReplayGuard mutex poisoned");

        inner.sweep(now_ms, self.config.time_window);

        let result = inner.check(check, now_ms, self.config.time_window);
        match &result {
            Ok(()) => inner.commit(check, now_ms, self.config.max_nonces),
            Err(violation) => {
                inner.violations.record(violation);
                log_violation(check, violation);
            },
        }
        result
    }

    /// Forget a device's counter, timestamp and nonces.
    ///
    /// For device revocation or re-registration; the next message from the
    /// device starts a fresh counter sequence.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn reset_device(&self, sender_id: &str, device_id: &str) {
        let mut inner = self.inner.lock().expect("ReplayGuard mutex poisoned");

        inner.devices.remove(&(sender_id.to_string(), device_id.to_string()));
        let is_device = |key: &NonceKey| key.0 == sender_id && key.1 == device_id;
        inner.nonces.retain(|key, _| !is_device(key));
        inner.nonce_order.retain(|(key, _)| !is_device(key));

        tracing::info!(sender_id, device_id, "reset replay state for device");
    }

    /// Violations recorded so far.
    pub fn violation_counts(&self) -> ViolationCounts {
        self.inner.lock().expect("ReplayGuard mutex poisoned").violations
    }

    /// Last accepted state per device, grouped by sender.
    pub fn device_stats(&self) -> BTreeMap<String, BTreeMap<String, DeviceStats>> {
        let inner = self.inner.lock().expect("ReplayGuard mutex poisoned");

        let mut stats: BTreeMap<String, BTreeMap<String, DeviceStats>> = BTreeMap::new();
        for ((sender, device), state) in &inner.devices {
            stats.entry(sender.clone()).or_default().insert(device.clone(), *state);
        }
        stats
    }

    /// Number of nonces currently retained.
    pub fn nonce_count(&self) -> usize {
        self.inner.lock().expect("ReplayGuard mutex poisoned").nonces.len()
    }

    /// Number of devices with recorded state.
    pub fn device_count(&self) -> usize {
        self.inner.lock().expect("ReplayGuard mutex poisoned").devices.len()
    }
}

fn log_violation(check: &ReplayCheck, violation: &ReplayViolation) {
    tracing::warn!(
        sender_id = %check.sender_id,
        device_id = %check.device_id,
        counter = check.counter,
        kind = %violation.kind(),
        "replay guard rejected message: {violation}"
    );
}

impl ReplayGuardInner {
    fn check(
        &self,
        check: &ReplayCheck,
        now_ms: u64,
        window: Duration,
    ) -> Result<(), ReplayViolation> {
        let message_ms = check.timestamp.timestamp_millis();
        let skew_ms = (i128::from(now_ms) - i128::from(message_ms)).unsigned_abs();
        let window_ms = window.as_millis();
        if skew_ms > window_ms {
            return Err(ReplayViolation::Stale {
                skew_ms: u64::try_from(skew_ms).unwrap_or(u64::MAX),
                window_ms: u64::try_from(window_ms).unwrap_or(u64::MAX),
            });
        }

        let nonce_key =
            (check.sender_id.clone(), check.device_id.clone(), check.nonce.clone());
        if self.nonces.contains_key(&nonce_key) {
            return Err(ReplayViolation::NonceReused {
                nonce: check.nonce.clone(),
                sender_id: check.sender_id.clone(),
                device_id: check.device_id.clone(),
            });
        }

        let device = self.devices.get(&(check.sender_id.clone(), check.device_id.clone()));
        let last_counter = device.map_or(0, |d| d.last_counter);
        if check.counter <= last_counter {
            return Err(ReplayViolation::CounterRegression { counter: check.counter, last_counter });
        }

        if let Some(device) = device
            && check.timestamp < device.last_timestamp
        {
            return Err(ReplayViolation::TimestampRegression {
                timestamp: check.timestamp,
                last_timestamp: device.last_timestamp,
            });
        }

        Ok(())
    }

    fn commit(&mut self, check: &ReplayCheck, now_ms: u64, max_nonces: usize) {
        let nonce_key =
            (check.sender_id.clone(), check.device_id.clone(), check.nonce.clone());
        self.nonces.insert(nonce_key.clone(), now_ms);
        self.nonce_order.push_back((nonce_key, now_ms));

        self.devices.insert(
            (check.sender_id.clone(), check.device_id.clone()),
            DeviceStats { last_counter: check.counter, last_timestamp: check.timestamp },
        );

        if self.nonces.len() > max_nonces {
            self.evict(self.nonces.len() / 4);
        }
    }

    /// Drop the `count` oldest nonces.
    fn evict(&mut self, count: usize) {
        let mut removed = 0;
        while removed < count {
            let Some((key, inserted_at)) = self.nonce_order.pop_front() else { break };
            // Skip order entries whose nonce was already removed
            if self.nonces.get(&key) == Some(&inserted_at) {
                self.nonces.remove(&key);
                removed += 1;
            }
        }
        tracing::debug!(removed, remaining = self.nonces.len(), "evicted oldest nonces");
    }

    /// Drop nonces older than twice the window, at most once per window.
    fn sweep(&mut self, now_ms: u64, window: Duration) {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if now_ms.saturating_sub(self.last_sweep_ms) < window_ms {
            return;
        }
        self.last_sweep_ms = now_ms;

        let cutoff = now_ms.saturating_sub(window_ms.saturating_mul(2));
        let before = self.nonces.len();
        while let Some((key, inserted_at)) = self.nonce_order.front() {
            if *inserted_at >= cutoff {
                break;
            }
            if self.nonces.get(key) == Some(inserted_at) {
                self.nonces.remove(key);
            }
            self.nonce_order.pop_front();
        }

        let swept = before - self.nonces.len();
        if swept > 0 {
            tracing::debug!(swept, "swept expired nonces");
        }
    }
}

#[cfg(test)]
mod tests {
    use veilpost_core::env::test_utils::MockEnv;

    use super::*;

    fn check(env: &MockEnv, nonce: &str, counter: u64) -> ReplayCheck {
        let millis = env.wall_clock_millis() as i64;
        ReplayCheck {
            nonce: nonce.to_string(),
            counter,
            device_id: "phone".to_string(),
            timestamp: DateTime::from_timestamp_millis(millis).unwrap(),
            sender_id: "alice".to_string(),
        }
    }

    #[test]
    fn counter_must_increase() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        assert_eq!(guard.validate_message(&check(&env, "n1", 5)), Ok(()));
        assert_eq!(
            guard.validate_message(&check(&env, "n2", 5)),
            Err(ReplayViolation::CounterRegression { counter: 5, last_counter: 5 })
        );
        assert_eq!(
            guard.validate_message(&check(&env, "n3", 4)),
            Err(ReplayViolation::CounterRegression { counter: 4, last_counter: 5 })
        );
        assert_eq!(guard.validate_message(&check(&env, "n4", 6)), Ok(()));
    }

    #[test]
    fn first_counter_must_be_positive() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        assert!(matches!(
            guard.validate_message(&check(&env, "n1", 0)),
            Err(ReplayViolation::CounterRegression { .. })
        ));
    }

    #[test]
    fn duplicate_nonce_is_reported_before_counter() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 1)).unwrap();
        let err = guard.validate_message(&check(&env, "n1", 2)).unwrap_err();

        assert!(matches!(err, ReplayViolation::NonceReused { .. }));
        assert_eq!(err.kind(), ErrorKind::NonceReused);
    }

    #[test]
    fn nonces_are_scoped_per_device() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 1)).unwrap();
        let mut other = check(&env, "n1", 1);
        other.device_id = "laptop".to_string();

        assert_eq!(guard.validate_message(&other), Ok(()));
    }

    #[test]
    fn stale_and_future_timestamps_are_rejected() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        let mut old = check(&env, "n1", 1);
        old.timestamp -= chrono::Duration::seconds(301);
        assert!(matches!(guard.validate_message(&old), Err(ReplayViolation::Stale { .. })));

        let mut future = check(&env, "n2", 1);
        future.timestamp += chrono::Duration::seconds(301);
        assert!(matches!(guard.validate_message(&future), Err(ReplayViolation::Stale { .. })));

        let mut edge = check(&env, "n3", 1);
        edge.timestamp -= chrono::Duration::seconds(300);
        assert_eq!(guard.validate_message(&edge), Ok(()));
    }

    #[test]
    fn timestamp_must_not_go_backwards() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 1)).unwrap();
        let mut earlier = check(&env, "n2", 2);
        earlier.timestamp -= chrono::Duration::seconds(1);

        let err = guard.validate_message(&earlier).unwrap_err();
        assert!(matches!(err, ReplayViolation::TimestampRegression { .. }));
        assert_eq!(err.kind(), ErrorKind::TimestampSkew);
    }

    #[test]
    fn rejected_message_commits_nothing() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 5)).unwrap();
        guard.validate_message(&check(&env, "n2", 3)).unwrap_err();

        // n2 was not recorded, so it is still usable with a valid counter
        assert_eq!(guard.validate_message(&check(&env, "n2", 6)), Ok(()));
        assert_eq!(guard.nonce_count(), 2);
    }

    #[test]
    fn check_records_nothing() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        assert_eq!(guard.check(&check(&env, "n1", u64::MAX)), Ok(()));
        assert_eq!(guard.nonce_count(), 0);
        assert_eq!(guard.device_count(), 0);

        // The same nonce and a low counter are still accepted afterwards
        assert_eq!(guard.validate_message(&check(&env, "n1", 1)), Ok(()));
        assert!(matches!(
            guard.check(&check(&env, "n1", 2)),
            Err(ReplayViolation::NonceReused { .. })
        ));
        assert_eq!(guard.violation_counts().nonce_reused, 1);
    }

    #[test]
    fn over_capacity_drops_oldest_quarter() {
        let env = MockEnv::with_seed(0);
        let guard =
            ReplayGuard::with_config(env.clone(), ReplayConfig { max_nonces: 8, ..Default::default() });

        for counter in 1..=8 {
            guard.validate_message(&check(&env, &format!("n{counter}"), counter)).unwrap();
        }
        assert_eq!(guard.nonce_count(), 8);

        guard.validate_message(&check(&env, "n9", 9)).unwrap();
        // 9 > 8, so 9 / 4 = 2 evicted
        assert_eq!(guard.nonce_count(), 7);

        // An evicted nonce is still rejected by its counter
        assert!(matches!(
            guard.validate_message(&check(&env, "n1", 1)),
            Err(ReplayViolation::CounterRegression { .. })
        ));
    }

    #[test]
    fn lazy_sweep_drops_old_nonces() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 1)).unwrap();
        env.advance(Duration::from_secs(11 * 60));
        guard.validate_message(&check(&env, "n2", 2)).unwrap();

        assert_eq!(guard.nonce_count(), 1);
    }

    #[test]
    fn reset_device_clears_state() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 10)).unwrap();
        guard.reset_device("alice", "phone");

        assert_eq!(guard.device_count(), 0);
        assert_eq!(guard.nonce_count(), 0);
        assert_eq!(guard.validate_message(&check(&env, "n1", 1)), Ok(()));
    }

    #[test]
    fn statistics_are_reported() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());

        guard.validate_message(&check(&env, "n1", 3)).unwrap();
        guard.validate_message(&check(&env, "n1", 4)).unwrap_err();
        guard.validate_message(&check(&env, "n2", 2)).unwrap_err();

        let counts = guard.violation_counts();
        assert_eq!(counts.nonce_reused, 1);
        assert_eq!(counts.counter_regression, 1);
        assert_eq!(counts.total(), 2);

        let stats = guard.device_stats();
        assert_eq!(stats["alice"]["phone"].last_counter, 3);
    }

    #[test]
    fn concurrent_duplicates_pass_once() {
        let env = MockEnv::with_seed(0);
        let guard = ReplayGuard::new(env.clone());
        let message = check(&env, "same", 1);

        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let guard = guard.clone();
                    let message = message.clone();
                    scope.spawn(move || guard.validate_message(&message).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
        });

        assert_eq!(accepted, 1);
    }
}
