pub mod document;
pub mod error;
pub mod lease;
pub mod memory;
pub mod postgres_store;
pub mod redb_store;
pub mod secret;

pub use document::{DocumentStore, Mutation};
pub use error::StoreError;
pub use lease::Lease;
pub use memory::InMemoryDocumentStore;
pub use postgres_store::PostgresDocumentStore;
pub use redb_store::RedbDocumentStore;
pub use secret::{InMemorySecretStore, SecretStore, SecretStoreError, StoredSecret};
