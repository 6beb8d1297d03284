use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid resource id '{id}': {reason}")]
    InvalidResourceId { id: String, reason: String },

    #[error("could not find cluster MSI in cluster document")]
    IdentityMissing,

    #[error("expected exactly one cluster MSI in cluster document, found {0}")]
    UnexpectedIdentityCount(usize),

    #[error("cluster MSI not present in MSI credentials response")]
    IdentityNotPresent,

    #[error("missing field '{field}' in MSI credentials object")]
    MissingField { field: &'static str },

    #[error("invalid field '{field}' in MSI credentials object: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("no user-assigned identity entry matches resource id '{resource_id}'")]
    DocumentMismatch { resource_id: String },

    #[error("{operation} requires a workload identity cluster")]
    WrongIdentityType { operation: &'static str },
}
