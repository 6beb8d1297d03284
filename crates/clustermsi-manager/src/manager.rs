use std::sync::Arc;

use clustermsi_azure::{
    CloudEnvironment, FederatedIdentityCredentialsClient, IdentityDataplaneClient,
    UserAssignedIdentitiesClient,
};
use clustermsi_config::FeatureFlags;
use clustermsi_domain::{
    extract_single_identity, ClusterDocument, CredentialsObject, DomainError,
    NestedCredentialsObject, ResourceId, SubscriptionDocument, UserAssignedMsiRequest,
};
use clustermsi_store::{DocumentStore, SecretStore};
use tracing::{debug, warn};

use crate::error::MsiError;

/// Collaborators shared by every manager in the process.
#[derive(Clone)]
pub struct MsiDependencies {
    pub documents: Arc<dyn DocumentStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub dataplane: Arc<dyn IdentityDataplaneClient>,
    pub environment: Arc<dyn CloudEnvironment>,
    pub features: Arc<dyn FeatureFlags>,
}

/// ARM clients authenticated as the cluster MSI.
#[derive(Clone)]
pub struct MsiClients {
    pub federated_identity_credentials: FederatedIdentityCredentialsClient,
    pub user_assigned_identities: UserAssignedIdentitiesClient,
}

/// Lifecycle operations on the credentials of one cluster's managed identity.
///
/// Build one per reconciliation pass. The manager owns its copy of the
/// cluster document and replaces it with whatever a successful patch
/// committed.
pub struct ClusterMsiManager {
    pub(crate) doc: ClusterDocument,
    pub(crate) subscription_doc: SubscriptionDocument,
    pub(crate) deps: MsiDependencies,
    pub(crate) clients: Option<MsiClients>,
}

impl ClusterMsiManager {
    pub fn new(
        doc: ClusterDocument,
        subscription_doc: SubscriptionDocument,
        deps: MsiDependencies,
    ) -> Self {
        Self {
            doc,
            subscription_doc,
            deps,
            clients: None,
        }
    }

    pub fn document(&self) -> &ClusterDocument {
        &self.doc
    }

    pub fn subscription_document(&self) -> &SubscriptionDocument {
        &self.subscription_doc
    }

    /// Set by [`ClusterMsiManager::initialize_cluster_msi_clients`].
    pub fn clients(&self) -> Option<&MsiClients> {
        self.clients.as_ref()
    }

    pub(crate) fn cluster_msi_resource_id(&self) -> Result<ResourceId, MsiError> {
        Ok(self.doc.cluster.cluster_msi_resource_id()?)
    }

    /// `{document id}-{cluster MSI name}`.
    pub fn secret_name(&self) -> Result<String, MsiError> {
        let msi = self.cluster_msi_resource_id()?;
        Ok(self.secret_name_for(&msi))
    }

    pub(crate) fn secret_name_for(&self, msi: &ResourceId) -> String {
        format!("{}-{}", self.doc.id, msi.name())
    }

    /// Ask the dataplane for the credentials of the cluster MSI.
    pub(crate) async fn fetch_credentials(
        &self,
        msi: &ResourceId,
    ) -> Result<CredentialsObject, MsiError> {
        let identity = self
            .doc
            .cluster
            .identity
            .as_ref()
            .ok_or(DomainError::IdentityMissing)?;
        let request = UserAssignedMsiRequest {
            identity_url: identity.identity_url.clone(),
            resource_ids: vec![msi.to_string()],
            tenant_id: identity.tenant_id.clone(),
        };
        debug!(resource_id = %msi, "fetching cluster MSI credentials");
        self.deps
            .dataplane
            .get_user_assigned_identities(&request)
            .await
            .map_err(|source| MsiError::IdentityFetch {
                resource_id: msi.to_string(),
                source,
            })
    }

    /// The identity a single-identity request produced. Extra entries are
    /// tolerated but logged.
    pub(crate) fn single_identity<'a>(
        &self,
        msi: &ResourceId,
        creds: &'a CredentialsObject,
    ) -> Result<&'a NestedCredentialsObject, MsiError> {
        let count = creds.explicit_identities.as_ref().map_or(0, Vec::len);
        if count > 1 {
            warn!(
                resource_id = %msi,
                count,
                "dataplane returned more than one identity; using the first"
            );
        }
        Ok(extract_single_identity(creds)?)
    }
}
