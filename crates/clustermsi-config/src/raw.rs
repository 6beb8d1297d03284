use serde::{Deserialize, Serialize};

/// Raw YAML representation of the settings file.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawSettings {
    pub cloud: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub lease_ttl_secs: Option<u64>,
    pub key_vault_url: Option<String>,
    pub dataplane_api_version: Option<String>,
    pub documents: Option<RawDocuments>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawDocuments {
    /// "memory" (default), "redb" or "postgres".
    #[serde(default)]
    pub backend: String,
    /// Database file; required for "redb".
    pub path: Option<String>,
    /// Connection string; required for "postgres".
    pub url: Option<String>,
}
