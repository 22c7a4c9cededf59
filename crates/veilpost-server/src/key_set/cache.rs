//! TTL cache over a key-set source

#![allow(clippy::disallowed_types, reason = "Lock is never held across an await")]
#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use ed25519_dalek::VerifyingKey;
use veilpost_core::env::Environment;

use super::{error::KeySetError, source::KeySetSource};

/// Default lifetime of a cached key.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound on one key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on cached keys across all key sets.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySetCacheConfig {
    /// How long a resolved key is served without refetching.
    pub ttl: Duration,
    /// Bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Maximum cached keys. The oldest are evicted first.
    pub max_keys: usize,
}

impl Default for KeySetCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_KEY_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

/// Verification keys resolved from published key sets.
///
/// Entries are keyed by `(uri, key_id)`. A miss fetches the whole document
/// and caches every usable key in it. The lock is released before the fetch
/// and retaken to store the result, so concurrent misses may fetch the same
/// document twice; the later write wins.
///
/// Every refresh first drops expired entries, then evicts the oldest keys
/// beyond `max_keys`, so the map stays bounded without a background task.
///
/// Clones share the same entries.
pub struct KeySetCache<S: KeySetSource, E: Environment> {
    source: Arc<S>,
    env: E,
    config: KeySetCacheConfig,
    entries: Arc<Mutex<HashMap<(String, String), CachedKey<E::Instant>>>>,
}

impl<S: KeySetSource, E: Environment> Clone for KeySetCache<S, E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            env: self.env.clone(),
            config: self.config,
            entries: Arc::clone(&self.entries),
        }
    }
}

struct CachedKey<I> {
    key: VerifyingKey,
    fetched_at: I,
}

impl<S: KeySetSource, E: Environment> KeySetCache<S, E> {
    /// Cache with default TTL and timeout.
    pub fn new(source: S, env: E) -> Self {
        Self::with_config(source, env, KeySetCacheConfig::default())
    }

    /// Cache with explicit tuning.
    pub fn with_config(source: S, env: E, config: KeySetCacheConfig) -> Self {
        Self { source: Arc::new(source), env, config, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Verification key `key_id` from the key set at `key_set_uri`.
    ///
    /// # Errors
    ///
    /// - `KeySetError::Timeout` if the fetch exceeds the configured bound
    /// - `KeySetError::Fetch`, `Status` or `InvalidDocument` from the source
    /// - `KeySetError::Key` if the document has no usable key `key_id`
    pub async fn fetch_public_key(
        &self,
        key_id: &str,
        key_set_uri: &str,
    ) -> Result<VerifyingKey, KeySetError> {
        if let Some(key) = self.lookup(key_id, key_set_uri) {
            return Ok(key);
        }

        let document =
            tokio::time::timeout(self.config.fetch_timeout, self.source.fetch(key_set_uri))
                .await
                .map_err(|_| KeySetError::Timeout {
                    uri: key_set_uri.to_string(),
                    timeout: self.config.fetch_timeout,
                })??;

        let requested = document.verifying_key(key_id);

        let fetched_at = self.env.now();
        let ttl = self.config.ttl;
        let mut entries = self.entries.lock().expect("KeySetCache mutex poisoned");
        entries.retain(|_, cached| fetched_at - cached.fetched_at < ttl);
        let mut cached = 0usize;
        for entry in &document.keys {
            // Unusable entries are skipped; only the requested one is an error
            if let Ok(key) = entry.to_verifying_key() {
                entries.insert((key_set_uri.to_string(), entry.kid.clone()), CachedKey {
                    key,
                    fetched_at,
                });
                cached += 1;
            }
        }
        evict_oldest(&mut entries, self.config.max_keys);
        drop(entries);

        tracing::info!(uri = %key_set_uri, key_id, cached, "refreshed key set");
        requested.map_err(KeySetError::from)
    }

    /// Drop every cached key from `key_set_uri`, forcing a refetch.
    pub fn invalidate(&self, key_set_uri: &str) {
        self.entries
            .lock()
            .expect("KeySetCache mutex poisoned")
            .retain(|(uri, _), _| uri != key_set_uri);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.env.now();
        let ttl = self.config.ttl;
        let mut entries = self.entries.lock().expect("KeySetCache mutex poisoned");
        let before = entries.len();
        entries.retain(|_, cached| now - cached.fetched_at < ttl);
        before - entries.len()
    }

    /// Number of cached keys, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("KeySetCache mutex poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key_id: &str, key_set_uri: &str) -> Option<VerifyingKey> {
        let now = self.env.now();
        let entries = self.entries.lock().expect("KeySetCache mutex poisoned");
        entries
            .get(&(key_set_uri.to_string(), key_id.to_string()))
            .filter(|cached| now - cached.fetched_at < self.config.ttl)
            .map(|cached| cached.key)
    }
}

fn evict_oldest<I: Ord + Copy>(entries: &mut HashMap<(String, String), CachedKey<I>>, max: usize) {
    if entries.len() <= max {
        return;
    }

    let mut by_age: Vec<_> =
        entries.iter().map(|(id, cached)| (cached.fetched_at, id.clone())).collect();
    by_age.sort_unstable_by_key(|(fetched_at, _)| *fetched_at);
    let excess = entries.len() - max;
    for (_, id) in by_age.into_iter().take(excess) {
        entries.remove(&id);
    }
    tracing::warn!(evicted = excess, max, "key set cache over capacity");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use ed25519_dalek::SigningKey;
    use veilpost_core::{
        env::test_utils::MockEnv,
        signature::{JsonWebKey, KeySetDocument, SignatureError},
    };

    use super::*;
    use crate::key_set::StaticKeySetSource;

    const URI: &str = "https://keys.example/alice.json";

    fn key(seed: u8) -> VerifyingKey {
        SigningKey::from_bytes(&[seed; 32]).verifying_key()
    }

    fn source() -> StaticKeySetSource {
        let source = StaticKeySetSource::new();
        source.publish(URI, KeySetDocument {
            keys: vec![JsonWebKey::from_ed25519("k1", &key(1)), JsonWebKey::from_ed25519("k2", &key(2))],
        });
        source
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let source = source();
        let cache = KeySetCache::new(source.clone(), MockEnv::with_seed(0));

        assert_eq!(cache.fetch_public_key("k1", URI).await.unwrap(), key(1));
        assert_eq!(cache.fetch_public_key("k1", URI).await.unwrap(), key(1));
        // k2 arrived with the same document
        assert_eq!(cache.fetch_public_key("k2", URI).await.unwrap(), key(2));

        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let source = source();
        let env = MockEnv::with_seed(0);
        let cache = KeySetCache::new(source.clone(), env.clone());

        cache.fetch_public_key("k1", URI).await.unwrap();
        env.advance(Duration::from_secs(299));
        cache.fetch_public_key("k1", URI).await.unwrap();
        assert_eq!(source.fetch_count(), 1);

        env.advance(Duration::from_secs(2));
        cache.fetch_public_key("k1", URI).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn rotated_key_is_seen_after_invalidate() {
        let source = source();
        let cache = KeySetCache::new(source.clone(), MockEnv::with_seed(0));
        cache.fetch_public_key("k1", URI).await.unwrap();

        source.publish(URI, KeySetDocument { keys: vec![JsonWebKey::from_ed25519("k1", &key(9))] });
        assert_eq!(cache.fetch_public_key("k1", URI).await.unwrap(), key(1));

        cache.invalidate(URI);
        assert_eq!(cache.fetch_public_key("k1", URI).await.unwrap(), key(9));
    }

    #[tokio::test]
    async fn unknown_key_and_unknown_uri() {
        let cache = KeySetCache::new(source(), MockEnv::with_seed(0));

        let err = cache.fetch_public_key("k3", URI).await.unwrap_err();
        assert_eq!(err, KeySetError::Key(SignatureError::KeyNotFound { key_id: "k3".into() }));
        assert!(!err.is_transient());

        let err = cache.fetch_public_key("k1", "https://keys.example/nobody.json").await.unwrap_err();
        assert!(matches!(err, KeySetError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn wrong_key_type_is_rejected() {
        let source = StaticKeySetSource::new();
        let mut entry = JsonWebKey::from_ed25519("k1", &key(1));
        entry.kty = "RSA".into();
        source.publish(URI, KeySetDocument { keys: vec![entry] });
        let cache = KeySetCache::new(source, MockEnv::with_seed(0));

        let err = cache.fetch_public_key("k1", URI).await.unwrap_err();
        assert!(matches!(err, KeySetError::Key(SignatureError::InvalidKey { .. })));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let env = MockEnv::with_seed(0);
        let cache = KeySetCache::new(source(), env.clone());
        cache.fetch_public_key("k1", URI).await.unwrap();

        assert_eq!(cache.purge_expired(), 0);
        env.advance(Duration::from_secs(301));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn refresh_drops_expired_entries() {
        const OTHER: &str = "https://keys.example/bob.json";
        let source = source();
        source.publish(OTHER, KeySetDocument { keys: vec![JsonWebKey::from_ed25519("b1", &key(3))] });
        let env = MockEnv::with_seed(0);
        let cache = KeySetCache::new(source, env.clone());

        cache.fetch_public_key("k1", URI).await.unwrap();
        assert_eq!(cache.len(), 2);

        env.advance(Duration::from_secs(301));
        cache.fetch_public_key("b1", OTHER).await.unwrap();
        // Alice's stale keys went with the refresh
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_keys() {
        const OTHER: &str = "https://keys.example/bob.json";
        let source = source();
        source.publish(OTHER, KeySetDocument {
            keys: vec![JsonWebKey::from_ed25519("b1", &key(3)), JsonWebKey::from_ed25519("b2", &key(4))],
        });
        let env = MockEnv::with_seed(0);
        let config = KeySetCacheConfig { max_keys: 3, ..KeySetCacheConfig::default() };
        let cache = KeySetCache::with_config(source.clone(), env.clone(), config);

        cache.fetch_public_key("k1", URI).await.unwrap();
        env.advance(Duration::from_secs(1));
        cache.fetch_public_key("b1", OTHER).await.unwrap();
        assert_eq!(cache.len(), 3);

        // Bob's keys are newer and stay cached
        cache.fetch_public_key("b2", OTHER).await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    struct HangingSource;

    #[async_trait]
    impl KeySetSource for HangingSource {
        async fn fetch(&self, _uri: &str) -> Result<KeySetDocument, KeySetError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(KeySetDocument::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let cache = KeySetCache::new(HangingSource, MockEnv::with_seed(0));

        let err = cache.fetch_public_key("k1", URI).await.unwrap_err();
        assert_eq!(err, KeySetError::Timeout { uri: URI.to_string(), timeout: DEFAULT_FETCH_TIMEOUT });
        assert!(err.is_transient());
    }
}
