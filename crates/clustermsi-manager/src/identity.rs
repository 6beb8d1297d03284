use clustermsi_domain::{ClusterDocument, DomainError};
use clustermsi_store::Mutation;
use tracing::info;

use crate::error::MsiError;
use crate::manager::ClusterMsiManager;

impl ClusterMsiManager {
    /// Record the cluster MSI's client and principal ids in the cluster
    /// document.
    ///
    /// Workload identity clusters only. The identity entry is located by a
    /// case-insensitive match on its resource id and keeps its stored key.
    pub async fn ensure_cluster_identity_ids(&mut self) -> Result<(), MsiError> {
        if !self.doc.cluster.uses_workload_identity() {
            return Err(DomainError::WrongIdentityType {
                operation: "ensure_cluster_identity_ids",
            }
            .into());
        }

        let msi = self.cluster_msi_resource_id()?;
        let creds = self.fetch_credentials(&msi).await?;
        let identity = self.single_identity(&msi, &creds)?;
        let (client_id, object_id) = identity.client_and_object_ids()?;

        let resource_id = msi.to_string();
        let client_id = client_id.to_string();
        let object_id = object_id.to_string();
        self.patch(Box::new(move |doc: &mut ClusterDocument| {
            doc.cluster
                .identity
                .as_mut()
                .ok_or(DomainError::IdentityMissing)?
                .set_user_assigned_ids(&resource_id, &client_id, &object_id)
        }))
        .await?;

        info!(key = %self.doc.key, resource_id = %msi, "cluster MSI identity ids recorded");
        Ok(())
    }

    /// Align the cluster identity's tenant with the subscription's tenant.
    pub async fn fixup_cluster_msi_tenant_id(&mut self) -> Result<(), MsiError> {
        let tenant_id = self.subscription_doc.tenant_id.clone();
        self.patch(Box::new(move |doc: &mut ClusterDocument| {
            doc.cluster
                .identity
                .get_or_insert_with(Default::default)
                .tenant_id = tenant_id;
            Ok(())
        }))
        .await?;

        info!(key = %self.doc.key, tenant_id = %self.subscription_doc.tenant_id, "cluster MSI tenant id fixed up");
        Ok(())
    }

    /// Patch the stored document and adopt the committed version.
    async fn patch(&mut self, mutate: Mutation<'_>) -> Result<(), MsiError> {
        let key = self.doc.key.clone();
        let committed = self
            .deps
            .documents
            .patch_with_lease(&key, mutate)
            .await
            .map_err(|source| MsiError::DocumentPatch {
                key: key.clone(),
                source,
            })?;
        self.doc = committed;
        Ok(())
    }
}
