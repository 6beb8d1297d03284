//! Fakes and fixtures shared by the manager's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clustermsi_azure::{AzureEnvironment, DataplaneError, IdentityDataplaneClient};
use clustermsi_config::{Feature, FeatureSet};
use clustermsi_domain::{
    Cluster, ClusterDocument, ClusterIdentity, CredentialsObject, DocumentKey,
    PlatformWorkloadIdentityProfile, SecretProperties, SubscriptionDocument,
    UserAssignedIdentity, UserAssignedMsiRequest,
};
use clustermsi_store::{
    DocumentStore, InMemoryDocumentStore, InMemorySecretStore, SecretStore, SecretStoreError,
    StoredSecret,
};
use serde_json::{json, Value};

use crate::manager::{ClusterMsiManager, MsiDependencies};

pub const DOC_ID: &str = "doc-1";
pub const DOC_KEY: &str = "/subscriptions/sub-1/resourcegroups/rg/providers/microsoft.redhatopenshift/openshiftclusters/cluster";
pub const MSI_RID: &str = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/Cluster-MSI";
pub const CLUSTER_TENANT: &str = "cluster-tenant";
pub const SUBSCRIPTION_TENANT: &str = "subscription-tenant";
pub const IDENTITY_URL: &str = "https://identity.example/subscriptions/sub-1/credentials";

pub fn workload_document() -> ClusterDocument {
    let mut identities = HashMap::new();
    identities.insert(MSI_RID.to_string(), UserAssignedIdentity::default());
    ClusterDocument::new(
        DOC_ID,
        DocumentKey::new(DOC_KEY),
        Cluster {
            name: "cluster".into(),
            location: "eastus".into(),
            identity: Some(ClusterIdentity {
                tenant_id: CLUSTER_TENANT.into(),
                identity_url: IDENTITY_URL.into(),
                user_assigned_identities: identities,
            }),
            service_principal_profile: None,
            platform_workload_identity_profile: Some(PlatformWorkloadIdentityProfile::default()),
        },
    )
}

pub fn subscription() -> SubscriptionDocument {
    SubscriptionDocument {
        id: "sub-1".into(),
        tenant_id: SUBSCRIPTION_TENANT.into(),
    }
}

/// One identity record as the dataplane returns it.
pub fn identity_json(not_after: Option<&str>) -> Value {
    let mut v = json!({
        "resource_id": MSI_RID,
        "client_id": "client-1",
        "object_id": "object-1",
        "tenant_id": CLUSTER_TENANT,
        "client_secret": "Y2VydGlmaWNhdGU=",
        "mtls_authentication_endpoint": "https://login.example/",
    });
    if let Some(t) = not_after {
        v["not_after"] = json!(t);
    }
    v
}

pub fn credentials(identities: Vec<Value>) -> CredentialsObject {
    serde_json::from_value(json!({
        "explicit_identities": identities,
        "delegation_url": "https://identity.example/delegate",
    }))
    .unwrap()
}

// ── Secret store ──────────────────────────────────────────────────────────────

/// In-memory secret store that counts calls and can be switched off.
#[derive(Default)]
pub struct CountingSecretStore {
    pub inner: InMemorySecretStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl CountingSecretStore {
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for CountingSecretStore {
    async fn get(&self, name: &str) -> Result<StoredSecret, SecretStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretStoreError::Unavailable("vault offline".into()));
        }
        self.inner.get(name).await
    }

    async fn set(&self, properties: &SecretProperties, value: &str) -> Result<(), SecretStoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(properties, value).await
    }
}

// ── Dataplane ─────────────────────────────────────────────────────────────────

/// Dataplane that replays a fixed response and records requests.
#[derive(Default)]
pub struct ScriptedDataplane {
    /// `None` answers with HTTP 500.
    pub response: Mutex<Option<CredentialsObject>>,
    pub requests: Mutex<Vec<UserAssignedMsiRequest>>,
    /// Never answer.
    pub hang: AtomicBool,
}

impl ScriptedDataplane {
    pub fn respond_with(&self, creds: CredentialsObject) {
        *self.response.lock().unwrap() = Some(creds);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentityDataplaneClient for ScriptedDataplane {
    async fn get_user_assigned_identities(
        &self,
        request: &UserAssignedMsiRequest,
    ) -> Result<CredentialsObject, DataplaneError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let response = self.response.lock().unwrap().clone();
        response.ok_or(DataplaneError::Status {
            status: 500,
            message: "scripted failure".into(),
        })
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub documents: Arc<InMemoryDocumentStore>,
    pub secrets: Arc<CountingSecretStore>,
    pub dataplane: Arc<ScriptedDataplane>,
    pub features: FeatureSet,
    pub cloud: &'static str,
}

impl Harness {
    /// Fresh stores with [`workload_document`] already stored.
    pub async fn new() -> Self {
        let documents = Arc::new(InMemoryDocumentStore::new());
        documents.create(&workload_document()).await.unwrap();
        Self {
            documents,
            secrets: Arc::default(),
            dataplane: Arc::default(),
            features: FeatureSet::default(),
            cloud: "AzurePublicCloud",
        }
    }

    pub fn with_mock_msi(mut self) -> Self {
        self.features = FeatureSet::new([Feature::UseMockMsiRp]);
        self
    }

    pub fn deps(&self) -> MsiDependencies {
        MsiDependencies {
            documents: self.documents.clone(),
            secrets: self.secrets.clone(),
            dataplane: self.dataplane.clone(),
            environment: Arc::new(AzureEnvironment::from_name(self.cloud).unwrap()),
            features: Arc::new(self.features.clone()),
        }
    }

    pub fn manager(&self) -> ClusterMsiManager {
        self.manager_for(workload_document())
    }

    pub fn manager_for(&self, doc: ClusterDocument) -> ClusterMsiManager {
        ClusterMsiManager::new(doc, subscription(), self.deps())
    }

    pub async fn stored(&self) -> ClusterDocument {
        self.documents.get(&DocumentKey::new(DOC_KEY)).await.unwrap()
    }
}
