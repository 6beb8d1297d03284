use clustermsi_domain::{DocumentKey, DomainError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(DocumentKey),

    #[error("document already exists: {0}")]
    AlreadyExists(DocumentKey),

    #[error("lease on document {key} is held by {holder}")]
    LeaseHeld { key: DocumentKey, holder: Uuid },

    #[error("lease on document {key} expired or was taken over before commit")]
    LeaseLost { key: DocumentKey },

    #[error("version conflict on document {key}: read {expected}, found {found}")]
    VersionConflict {
        key: DocumentKey,
        expected: u64,
        found: u64,
    },

    /// The caller's mutation refused to apply; nothing was written.
    #[error(transparent)]
    Mutation(DomainError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Lost a race with another writer. Safe to retry the whole patch.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::LeaseHeld { .. }
                | StoreError::LeaseLost { .. }
                | StoreError::VersionConflict { .. }
        )
    }
}
