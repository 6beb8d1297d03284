use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clustermsi_domain::SecretProperties;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret not found: {name}")]
    NotFound { name: String },

    #[error("secret store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal secret store error: {0}")]
    Internal(String),
}

impl SecretStoreError {
    /// The secret does not exist yet, as opposed to the store being broken.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SecretStoreError::NotFound { .. })
    }
}

/// A secret as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub expires: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
}

/// Named secret storage for serialized credentials objects.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Fetch a secret. A missing secret yields [`SecretStoreError::NotFound`].
    async fn get(&self, name: &str) -> Result<StoredSecret, SecretStoreError>;

    /// Create or replace a secret in one write.
    async fn set(&self, properties: &SecretProperties, value: &str) -> Result<(), SecretStoreError>;
}

/// In-memory [`SecretStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, StoredSecret>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str) -> Result<StoredSecret, SecretStoreError> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn set(&self, properties: &SecretProperties, value: &str) -> Result<(), SecretStoreError> {
        let secret = StoredSecret {
            name: properties.name.clone(),
            value: value.to_string(),
            enabled: properties.enabled,
            expires: Some(properties.expires),
            not_before: Some(properties.not_before),
        };
        self.secrets
            .write()
            .await
            .insert(properties.name.clone(), secret);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn props(name: &str) -> SecretProperties {
        let now = Utc::now();
        SecretProperties {
            name: name.into(),
            enabled: true,
            expires: now + Duration::days(90),
            not_before: now,
        }
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let store = InMemorySecretStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = InMemorySecretStore::new();
        let p = props("doc-1-msi");
        store.set(&p, "{\"a\":1}").await.unwrap();

        let s = store.get("doc-1-msi").await.unwrap();
        assert_eq!(s.value, "{\"a\":1}");
        assert!(s.enabled);
        assert_eq!(s.expires, Some(p.expires));
        assert_eq!(s.not_before, Some(p.not_before));
    }

    #[tokio::test]
    async fn set_replaces_existing() {
        let store = InMemorySecretStore::new();
        store.set(&props("s"), "one").await.unwrap();
        store.set(&props("s"), "two").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("s").await.unwrap().value, "two");
    }

    #[test]
    fn only_not_found_is_not_found() {
        assert!(!SecretStoreError::Unavailable("down".into()).is_not_found());
        assert!(!SecretStoreError::Status {
            status: 403,
            message: "forbidden".into()
        }
        .is_not_found());
    }
}
