use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::flags::{Feature, FeatureSet};
use crate::raw::{RawDocuments, RawSettings};
use crate::settings::{
    DocumentBackendConfig, Settings, DEFAULT_DATAPLANE_API_VERSION, DEFAULT_LEASE_TTL,
};

/// Read and validate a YAML settings file.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading settings from {}", path.display());
    parse_settings(&content, &path.display().to_string())
}

/// Parse settings from YAML text. `origin` names the source in errors.
pub fn parse_settings(content: &str, origin: &str) -> Result<Settings, ConfigError> {
    let raw: RawSettings = serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse {
        path: origin.to_string(),
        source: e,
    })?;
    convert_settings(raw, origin)
}

fn convert_settings(raw: RawSettings, origin: &str) -> Result<Settings, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        path: origin.to_string(),
        message,
    };

    if raw.cloud.trim().is_empty() {
        return Err(invalid("'cloud' must not be empty".into()));
    }

    let features = raw
        .features
        .iter()
        .map(|name| Feature::parse(name).ok_or_else(|| invalid(format!("unknown feature '{}'", name))))
        .collect::<Result<Vec<_>, _>>()?;

    let lease_ttl = match raw.lease_ttl_secs {
        None => DEFAULT_LEASE_TTL,
        Some(0) => return Err(invalid("'lease_ttl_secs' must be greater than zero".into())),
        Some(secs) => Duration::from_secs(secs),
    };

    let documents = match raw.documents {
        None => DocumentBackendConfig::Memory,
        Some(d) => convert_documents(d, origin)?,
    };

    Ok(Settings {
        cloud: raw.cloud,
        features: FeatureSet::new(features),
        lease_ttl,
        key_vault_url: raw.key_vault_url,
        dataplane_api_version: raw
            .dataplane_api_version
            .unwrap_or_else(|| DEFAULT_DATAPLANE_API_VERSION.to_string()),
        documents,
    })
}

fn convert_documents(raw: RawDocuments, origin: &str) -> Result<DocumentBackendConfig, ConfigError> {
    match raw.backend.as_str() {
        "" | "memory" => Ok(DocumentBackendConfig::Memory),
        "redb" => {
            let path = raw.path.ok_or_else(|| ConfigError::Invalid {
                path: origin.to_string(),
                message: "documents.path is required for the redb backend".into(),
            })?;
            Ok(DocumentBackendConfig::Redb { path: PathBuf::from(path) })
        }
        "postgres" => {
            let url = raw.url.ok_or_else(|| ConfigError::Invalid {
                path: origin.to_string(),
                message: "documents.url is required for the postgres backend".into(),
            })?;
            Ok(DocumentBackendConfig::Postgres { url })
        }
        other => Err(ConfigError::Invalid {
            path: origin.to_string(),
            message: format!("unknown document backend '{}'", other),
        }),
    }
}
