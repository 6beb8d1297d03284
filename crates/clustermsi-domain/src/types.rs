use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::resource_id::{eq_fold, ResourceId};

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Immutable storage key of a cluster document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey(pub String);

impl DocumentKey {
    pub fn new(s: impl Into<String>) -> Self {
        DocumentKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Cluster document ─────────────────────────────────────────────────────────

/// Versioned cluster record.
///
/// `version` is the optimistic concurrency tag: every committed write bumps it
/// by one. Callers never write a document directly; they go through
/// `DocumentStore::patch_with_lease`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub id: String,
    pub key: DocumentKey,
    #[serde(default)]
    pub version: u64,
    pub cluster: Cluster,
}

impl ClusterDocument {
    pub fn new(id: impl Into<String>, key: DocumentKey, cluster: Cluster) -> Self {
        Self {
            id: id.into(),
            key,
            version: 0,
            cluster,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub identity: Option<ClusterIdentity>,
    pub service_principal_profile: Option<ServicePrincipalProfile>,
    pub platform_workload_identity_profile: Option<PlatformWorkloadIdentityProfile>,
}

impl Cluster {
    /// A cluster uses workload identity when it carries a platform workload
    /// identity profile and no service principal.
    pub fn uses_workload_identity(&self) -> bool {
        self.platform_workload_identity_profile.is_some() && self.service_principal_profile.is_none()
    }

    /// The cluster MSI is the single entry of the identity's
    /// `user_assigned_identities` map.
    pub fn cluster_msi_resource_id(&self) -> Result<ResourceId, DomainError> {
        let identity = self.identity.as_ref().ok_or(DomainError::IdentityMissing)?;
        let ids = &identity.user_assigned_identities;
        if ids.len() != 1 {
            return Err(DomainError::UnexpectedIdentityCount(ids.len()));
        }
        match ids.keys().next() {
            Some(raw) => ResourceId::parse(raw),
            None => Err(DomainError::IdentityMissing),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub identity_url: String,
    /// Keyed by the resource id exactly as the customer supplied it.
    #[serde(default)]
    pub user_assigned_identities: HashMap<String, UserAssignedIdentity>,
}

impl ClusterIdentity {
    /// Overwrite the client and principal ids of the entry whose key matches
    /// `resource_id` ignoring case. The stored key keeps its original casing.
    pub fn set_user_assigned_ids(
        &mut self,
        resource_id: &str,
        client_id: &str,
        principal_id: &str,
    ) -> Result<(), DomainError> {
        let entry = self
            .user_assigned_identities
            .iter_mut()
            .find(|(k, _)| eq_fold(k, resource_id))
            .map(|(_, v)| v)
            .ok_or_else(|| DomainError::DocumentMismatch {
                resource_id: resource_id.to_string(),
            })?;
        entry.client_id = client_id.to_string();
        entry.principal_id = principal_id.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssignedIdentity {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub principal_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipalProfile {
    pub client_id: String,
    #[serde(default)]
    pub sp_object_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformWorkloadIdentityProfile {
    /// Operator name → identity.
    #[serde(default)]
    pub platform_workload_identities: HashMap<String, PlatformWorkloadIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformWorkloadIdentity {
    pub resource_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub object_id: String,
}

// ── Subscription ─────────────────────────────────────────────────────────────

/// Read-only view of the subscription the cluster lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDocument {
    /// Subscription id; ARM clients are scoped to it.
    pub id: String,
    pub tenant_id: String,
}

// ── Secrets ──────────────────────────────────────────────────────────────────

/// Metadata written alongside a stored credentials object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretProperties {
    pub name: String,
    pub enabled: bool,
    pub expires: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
}
