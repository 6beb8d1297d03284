use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clustermsi_domain::{ClusterDocument, DocumentKey};
use tokio::sync::RwLock;

use crate::document::DocumentStore;
use crate::error::StoreError;
use crate::lease::Lease;

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DocumentKey, ClusterDocument>,
    leases: HashMap<DocumentKey, Lease>,
}

/// In-memory implementation of [`DocumentStore`].
///
/// All data is lost on process exit. Clones share state, so several
/// "replicas" in a test can race on the same documents.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Inner>>,
    lease_ttl: Duration,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Current lease on `key`, expired or not.
    pub async fn lease(&self, key: &DocumentKey) -> Option<Lease> {
        self.inner.read().await.leases.get(key).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &DocumentKey) -> Result<ClusterDocument, StoreError> {
        let guard = self.inner.read().await;
        guard
            .documents
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn create(&self, doc: &ClusterDocument) -> Result<ClusterDocument, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.documents.contains_key(&doc.key) {
            return Err(StoreError::AlreadyExists(doc.key.clone()));
        }
        let mut stored = doc.clone();
        stored.version = 0;
        guard.documents.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    async fn acquire_lease(&self, key: &DocumentKey, ttl: Duration) -> Result<Lease, StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.documents.contains_key(key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        if let Some(existing) = guard.leases.get(key) {
            if !existing.is_expired_at(Utc::now()) {
                return Err(StoreError::LeaseHeld {
                    key: key.clone(),
                    holder: existing.holder,
                });
            }
        }
        let lease = Lease::new(key.clone(), ttl);
        guard.leases.insert(key.clone(), lease.clone());
        Ok(lease)
    }

    async fn compare_and_swap(
        &self,
        lease: &Lease,
        expected_version: u64,
        doc: &ClusterDocument,
    ) -> Result<ClusterDocument, StoreError> {
        let mut guard = self.inner.write().await;
        let key = &lease.key;
        if !lease.is_current(guard.leases.get(key), Utc::now()) {
            return Err(StoreError::LeaseLost { key: key.clone() });
        }
        let found = guard
            .documents
            .get(key)
            .map(|d| d.version)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if found != expected_version {
            return Err(StoreError::VersionConflict {
                key: key.clone(),
                expected: expected_version,
                found,
            });
        }

        let mut committed = doc.clone();
        committed.key = key.clone();
        committed.version = expected_version + 1;
        guard.documents.insert(key.clone(), committed.clone());
        Ok(committed)
    }

    async fn release_lease(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard
            .leases
            .get(&lease.key)
            .is_some_and(|l| l.holder == lease.holder)
        {
            guard.leases.remove(&lease.key);
        }
        Ok(())
    }
}
