pub mod credentials;
pub mod error;
pub mod resource_id;
pub mod types;


pub use credentials::{
    extract_single_identity, CredentialsObject, NestedCredentialsObject, UserAssignedMsiRequest,
};
pub use error::DomainError;
pub use resource_id::ResourceId;
pub use types::*;
