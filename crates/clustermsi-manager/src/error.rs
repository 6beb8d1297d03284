use clustermsi_azure::{AzureError, DataplaneError};
use clustermsi_domain::{DocumentKey, DomainError};
use clustermsi_store::{SecretStoreError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MsiError {
    #[error("failed to look up secret '{name}': {source}")]
    SecretLookup {
        name: String,
        source: SecretStoreError,
    },

    #[error("failed to write secret '{name}': {source}")]
    SecretWrite {
        name: String,
        source: SecretStoreError,
    },

    #[error("failed to fetch credentials for identity '{resource_id}': {source}")]
    IdentityFetch {
        resource_id: String,
        source: DataplaneError,
    },

    #[error("failed to patch document {key}: {source}")]
    DocumentPatch { key: DocumentKey, source: StoreError },

    #[error("cloud environment: {0}")]
    CloudEnvironment(#[source] AzureError),

    #[error("credential resolution: {0}")]
    CredentialResolution(#[source] AzureError),

    #[error("failed to build {client} client: {source}")]
    ClientConstruction {
        client: &'static str,
        source: AzureError,
    },

    #[error("failed to serialize credentials object: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Coarse classification of an [`MsiError`] for callers deciding what to do
/// next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    IdentityNotPresent,
    MissingField,
    DocumentMismatch,
    WrongIdentityType,
    /// Lost a race on the cluster document. Retrying the operation is safe.
    LeaseConflict,
    Infrastructure,
}

impl ErrorKind {
    fn of_domain(e: &DomainError) -> Self {
        match e {
            DomainError::IdentityNotPresent => ErrorKind::IdentityNotPresent,
            DomainError::MissingField { .. } | DomainError::InvalidField { .. } => {
                ErrorKind::MissingField
            }
            DomainError::DocumentMismatch { .. } => ErrorKind::DocumentMismatch,
            DomainError::WrongIdentityType { .. } => ErrorKind::WrongIdentityType,
            DomainError::InvalidResourceId { .. }
            | DomainError::IdentityMissing
            | DomainError::UnexpectedIdentityCount(_) => ErrorKind::Infrastructure,
        }
    }
}

impl MsiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MsiError::SecretLookup { source, .. } if source.is_not_found() => ErrorKind::NotFound,
            MsiError::Domain(e) => ErrorKind::of_domain(e),
            MsiError::DocumentPatch {
                source: StoreError::Mutation(e),
                ..
            } => ErrorKind::of_domain(e),
            MsiError::DocumentPatch { source, .. } if source.is_conflict() => {
                ErrorKind::LeaseConflict
            }
            MsiError::DocumentPatch {
                source: StoreError::NotFound(_),
                ..
            } => ErrorKind::NotFound,
            _ => ErrorKind::Infrastructure,
        }
    }
}
