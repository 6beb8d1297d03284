use std::path::PathBuf;
use std::time::Duration;

use crate::flags::{Feature, FeatureFlags, FeatureSet};

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_DATAPLANE_API_VERSION: &str = "2024-01-01";

/// Validated operator settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Cloud environment name, e.g. `AzurePublicCloud`.
    pub cloud: String,
    pub features: FeatureSet,
    /// How long a document lease stays valid without being released.
    pub lease_ttl: Duration,
    pub key_vault_url: Option<String>,
    pub dataplane_api_version: String,
    pub documents: DocumentBackendConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentBackendConfig {
    Memory,
    Redb { path: PathBuf },
    Postgres { url: String },
}

impl FeatureFlags for Settings {
    fn is_set(&self, feature: Feature) -> bool {
        self.features.is_set(feature)
    }
}
