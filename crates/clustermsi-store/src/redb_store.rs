use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clustermsi_domain::{ClusterDocument, DocumentKey};
use redb::{Database, ReadableTable, TableDefinition};

use crate::document::DocumentStore;
use crate::error::StoreError;
use crate::lease::Lease;

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");

fn internal(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent document store backed by a redb database file.
///
/// Lease checks and the version check run inside the same write transaction
/// as the write they guard, so a commit is all-or-nothing.
#[derive(Clone)]
pub struct RedbDocumentStore {
    db: Arc<Database>,
    lease_ttl: Duration,
}

impl RedbDocumentStore {
    /// Open (or create) a redb database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path, lease_ttl: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;

        // Ensure tables exist
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(DOCUMENTS).map_err(internal)?;
            wtxn.open_table(LEASES).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }

        Ok(Self {
            db: Arc::new(db),
            lease_ttl,
        })
    }
}

#[async_trait]
impl DocumentStore for RedbDocumentStore {
    async fn get(&self, key: &DocumentKey) -> Result<ClusterDocument, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(DOCUMENTS).map_err(internal)?;
        match table.get(key.as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn create(&self, doc: &ClusterDocument) -> Result<ClusterDocument, StoreError> {
        let mut stored = doc.clone();
        stored.version = 0;
        let bytes = serde_json::to_vec(&stored)?;

        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(DOCUMENTS).map_err(internal)?;
            if table.get(doc.key.as_str()).map_err(internal)?.is_some() {
                return Err(StoreError::AlreadyExists(doc.key.clone()));
            }
            table
                .insert(doc.key.as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(stored)
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    async fn acquire_lease(&self, key: &DocumentKey, ttl: Duration) -> Result<Lease, StoreError> {
        let lease = Lease::new(key.clone(), ttl);
        let bytes = serde_json::to_vec(&lease)?;

        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let documents = wtxn.open_table(DOCUMENTS).map_err(internal)?;
            if documents.get(key.as_str()).map_err(internal)?.is_none() {
                return Err(StoreError::NotFound(key.clone()));
            }

            let mut leases = wtxn.open_table(LEASES).map_err(internal)?;
            let existing: Option<Lease> = match leases.get(key.as_str()).map_err(internal)? {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            };
            if let Some(existing) = existing {
                if !existing.is_expired_at(Utc::now()) {
                    return Err(StoreError::LeaseHeld {
                        key: key.clone(),
                        holder: existing.holder,
                    });
                }
            }
            leases
                .insert(key.as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(lease)
    }

    async fn compare_and_swap(
        &self,
        lease: &Lease,
        expected_version: u64,
        doc: &ClusterDocument,
    ) -> Result<ClusterDocument, StoreError> {
        let key = &lease.key;
        let mut committed = doc.clone();
        committed.key = key.clone();
        committed.version = expected_version + 1;
        let bytes = serde_json::to_vec(&committed)?;

        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let leases = wtxn.open_table(LEASES).map_err(internal)?;
            let current: Option<Lease> = match leases.get(key.as_str()).map_err(internal)? {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            };
            if !lease.is_current(current.as_ref(), Utc::now()) {
                return Err(StoreError::LeaseLost { key: key.clone() });
            }

            let mut documents = wtxn.open_table(DOCUMENTS).map_err(internal)?;
            let stored: ClusterDocument = match documents.get(key.as_str()).map_err(internal)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(StoreError::NotFound(key.clone())),
            };
            if stored.version != expected_version {
                return Err(StoreError::VersionConflict {
                    key: key.clone(),
                    expected: expected_version,
                    found: stored.version,
                });
            }
            documents
                .insert(key.as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(committed)
    }

    async fn release_lease(&self, lease: &Lease) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut leases = wtxn.open_table(LEASES).map_err(internal)?;
            let current: Option<Lease> = match leases.get(lease.key.as_str()).map_err(internal)? {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            };
            if current.is_some_and(|c| c.holder == lease.holder) {
                leases.remove(lease.key.as_str()).map_err(internal)?;
            }
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}
