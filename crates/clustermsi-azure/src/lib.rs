pub mod armmsi;
pub mod credential;
pub mod dataplane;
pub mod environment;
pub mod error;
pub mod keyvault;
pub mod token;

pub use armmsi::{
    FederatedIdentityCredential, FederatedIdentityCredentialProperties,
    FederatedIdentityCredentialsClient, Identity, IdentityProperties,
    UserAssignedIdentitiesClient,
};
pub use credential::{ClientCertificateCredential, UserAssignedIdentities};
pub use dataplane::{HttpDataplaneClient, IdentityDataplaneClient};
pub use environment::{ArmClientOptions, AzureEnvironment, CloudEnvironment, CloudName};
pub use error::{AzureError, DataplaneError};
pub use keyvault::{KeyVaultSecretStore, KEY_VAULT_SCOPE};
pub use token::{default_token_provider, StaticToken, TokenProvider};
