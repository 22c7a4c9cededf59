//! Where key-set documents come from

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]
#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use veilpost_core::signature::KeySetDocument;

use super::error::KeySetError;

/// Fetches a key-set document by URI.
///
/// Implementations perform one attempt with no retry; the cache applies the
/// timeout.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the document published at `uri`.
    async fn fetch(&self, uri: &str) -> Result<KeySetDocument, KeySetError>;
}

/// In-memory documents, for tests and for keys distributed out of band.
///
/// Clones share the same documents and fetch counter.
#[derive(Clone, Default)]
pub struct StaticKeySetSource {
    documents: Arc<Mutex<HashMap<String, KeySetDocument>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticKeySetSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the document at `uri`.
    pub fn publish(&self, uri: impl Into<String>, document: KeySetDocument) {
        self.documents.lock().expect("StaticKeySetSource mutex poisoned").insert(uri.into(), document);
    }

    /// Number of `fetch` calls served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self, uri: &str) -> Result<KeySetDocument, KeySetError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.documents
            .lock()
            .expect("StaticKeySetSource mutex poisoned")
            .get(uri)
            .cloned()
            .ok_or_else(|| KeySetError::Status { uri: uri.to_string(), status: 404 })
    }
}

/// Fetches key sets over HTTPS.
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct HttpKeySetSource {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpKeySetSource {
    /// Source over an existing client (connection pool, proxy settings).
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self, uri: &str) -> Result<KeySetDocument, KeySetError> {
        let response = self
            .client
            .get(uri)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| KeySetError::Fetch { uri: uri.to_string(), reason: err.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Status { uri: uri.to_string(), status: status.as_u16() });
        }

        response.json::<KeySetDocument>().await.map_err(|err| KeySetError::InvalidDocument {
            uri: uri.to_string(),
            reason: err.to_string(),
        })
    }
}
