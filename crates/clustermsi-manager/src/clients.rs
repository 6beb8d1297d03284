use clustermsi_azure::{
    FederatedIdentityCredentialsClient, UserAssignedIdentities, UserAssignedIdentitiesClient,
};
use tracing::info;

use crate::error::MsiError;
use crate::manager::{ClusterMsiManager, MsiClients};

impl ClusterMsiManager {
    /// Build the ARM managed-identity clients authenticated as the cluster MSI
    /// from the credentials object in the secret store.
    ///
    /// The secret must already exist; a missing secret is an error here.
    pub async fn initialize_cluster_msi_clients(&mut self) -> Result<(), MsiError> {
        let msi = self.cluster_msi_resource_id()?;
        let secret_name = self.secret_name_for(&msi);

        let secret = self
            .deps
            .secrets
            .get(&secret_name)
            .await
            .map_err(|source| MsiError::SecretLookup {
                name: secret_name.clone(),
                source,
            })?;

        let cloud = self
            .deps
            .environment
            .cloud_name()
            .map_err(MsiError::CloudEnvironment)?;

        let options = self.deps.environment.arm_client_options();
        let identities = UserAssignedIdentities::from_secret(&secret.value, options.clone())
            .map_err(MsiError::CredentialResolution)?;
        let credential = identities
            .get_credential(msi.as_str())
            .map_err(MsiError::CredentialResolution)?;

        let subscription_id = self.subscription_doc.id.as_str();

        let federated_identity_credentials =
            FederatedIdentityCredentialsClient::new(subscription_id, credential.clone(), &options)
                .map_err(|source| MsiError::ClientConstruction {
                    client: "federated identity credentials",
                    source,
                })?;
        let user_assigned_identities =
            UserAssignedIdentitiesClient::new(subscription_id, credential, &options).map_err(
                |source| MsiError::ClientConstruction {
                    client: "user assigned identities",
                    source,
                },
            )?;

        self.clients = Some(MsiClients {
            federated_identity_credentials,
            user_assigned_identities,
        });
        info!(resource_id = %msi, cloud = %cloud, "cluster MSI clients initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use clustermsi_domain::SecretProperties;
    use clustermsi_store::SecretStore;
    use serde_json::json;

    use crate::error::{ErrorKind, MsiError};
    use crate::manager::ClusterMsiManager;
    use crate::testing::*;

    async fn store_secret(h: &Harness, value: &str) {
        let now = Utc::now();
        h.secrets
            .inner
            .set(
                &SecretProperties {
                    name: format!("{}-Cluster-MSI", DOC_ID),
                    enabled: true,
                    expires: now + Duration::days(90),
                    not_before: now,
                },
                value,
            )
            .await
            .unwrap();
    }

    fn stored_credentials() -> String {
        serde_json::to_string(&credentials(vec![identity_json(Some("2030-01-01T00:00:00Z"))])).unwrap()
    }

    #[tokio::test]
    async fn clients_are_built_from_stored_credentials() {
        let h = Harness::new().await;
        store_secret(&h, &stored_credentials()).await;

        let mut m = h.manager();
        m.initialize_cluster_msi_clients().await.unwrap();

        let clients = m.clients().expect("clients set");
        assert_eq!(clients.user_assigned_identities.subscription_id(), "sub-1");
        assert_eq!(clients.federated_identity_credentials.subscription_id(), "sub-1");
        assert_eq!(h.dataplane.calls(), 0);
    }

    #[tokio::test]
    async fn missing_secret_is_fatal() {
        let h = Harness::new().await;
        let mut m = h.manager();

        let err = m.initialize_cluster_msi_clients().await.unwrap_err();
        assert!(matches!(err, MsiError::SecretLookup { .. }), "got: {err:?}");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(m.clients().is_none());
    }

    #[tokio::test]
    async fn cloud_without_dataplane_is_rejected() {
        let mut h = Harness::new().await;
        h.cloud = "AzureChinaCloud";
        store_secret(&h, &stored_credentials()).await;

        let mut m = h.manager();
        let err = m.initialize_cluster_msi_clients().await.unwrap_err();
        assert!(matches!(err, MsiError::CloudEnvironment(_)), "got: {err:?}");
        assert!(m.clients().is_none());
    }

    #[tokio::test]
    async fn secret_without_cluster_identity_fails_resolution() {
        let h = Harness::new().await;
        let mut other = identity_json(None);
        other["resource_id"] = json!("/subscriptions/x/resourceGroups/y/providers/p/t/someone-else");
        store_secret(&h, &serde_json::to_string(&credentials(vec![other])).unwrap()).await;

        let err = h.manager().initialize_cluster_msi_clients().await.unwrap_err();
        assert!(matches!(err, MsiError::CredentialResolution(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreadable_secret_fails_resolution() {
        let h = Harness::new().await;
        store_secret(&h, "not json").await;

        let err = h.manager().initialize_cluster_msi_clients().await.unwrap_err();
        assert!(matches!(err, MsiError::CredentialResolution(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn empty_subscription_fails_client_construction() {
        let h = Harness::new().await;
        store_secret(&h, &stored_credentials()).await;

        let mut sub = subscription();
        sub.id = String::new();
        let mut m = ClusterMsiManager::new(workload_document(), sub, h.deps());
        let err = m.initialize_cluster_msi_clients().await.unwrap_err();
        assert!(matches!(err, MsiError::ClientConstruction { .. }), "got: {err:?}");
        assert!(m.clients().is_none());
    }
}
