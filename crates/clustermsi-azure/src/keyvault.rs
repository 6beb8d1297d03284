use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clustermsi_domain::SecretProperties;
use clustermsi_store::{SecretStore, SecretStoreError, StoredSecret};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::token::TokenProvider;

const KEY_VAULT_API_VERSION: &str = "7.4";

/// Key Vault scope for token providers.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// [`SecretStore`] backed by the Azure Key Vault secrets REST API.
pub struct KeyVaultSecretStore {
    vault_url: String,
    client: reqwest::Client,
    token: Arc<dyn TokenProvider>,
}

#[derive(Deserialize)]
struct SecretBundle {
    #[serde(default)]
    value: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

#[derive(Default, Deserialize)]
struct SecretAttributes {
    #[serde(default = "default_enabled")]
    enabled: bool,
    exp: Option<i64>,
    nbf: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn vault_error_message(body: &Value) -> String {
    let err = body.get("error").unwrap_or(body);
    let code = err["code"].as_str().unwrap_or("Unknown");
    let message = err["message"].as_str().unwrap_or("unknown error");
    format!("{}: {}", code, message)
}

impl KeyVaultSecretStore {
    /// `vault_url` is the vault base URL, e.g. `https://myvault.vault.azure.net`.
    pub fn new(vault_url: impl Into<String>, token: Arc<dyn TokenProvider>) -> Self {
        Self {
            vault_url: vault_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token,
        }
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}/secrets/{}", self.vault_url, name)
    }

    async fn bearer(&self) -> Result<String, SecretStoreError> {
        self.token
            .token()
            .await
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn get(&self, name: &str) -> Result<StoredSecret, SecretStoreError> {
        let token = self.bearer().await?;
        let url = self.secret_url(name);
        debug!(url = %url, "Key Vault GET");
        let resp = self
            .client
            .get(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SecretStoreError::Unavailable(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        if status == 404 {
            return Err(SecretStoreError::NotFound {
                name: name.to_string(),
            });
        }
        if !(200..300).contains(&status) {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(SecretStoreError::Status {
                status,
                message: vault_error_message(&body),
            });
        }

        let bundle: SecretBundle = resp
            .json()
            .await
            .map_err(|e| SecretStoreError::Internal(format!("decode secret {}: {}", name, e)))?;
        Ok(StoredSecret {
            name: name.to_string(),
            value: bundle.value,
            enabled: bundle.attributes.enabled,
            expires: from_unix(bundle.attributes.exp),
            not_before: from_unix(bundle.attributes.nbf),
        })
    }

    async fn set(&self, properties: &SecretProperties, value: &str) -> Result<(), SecretStoreError> {
        let token = self.bearer().await?;
        let url = self.secret_url(&properties.name);
        debug!(url = %url, "Key Vault PUT");
        let body = json!({
            "value": value,
            "contentType": "application/json",
            "attributes": {
                "enabled": properties.enabled,
                "exp": properties.expires.timestamp(),
                "nbf": properties.not_before.timestamp(),
            }
        });
        let resp = self
            .client
            .put(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SecretStoreError::Unavailable(format!("PUT {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(SecretStoreError::Status {
                status,
                message: vault_error_message(&body),
            });
        }
        Ok(())
    }
}
