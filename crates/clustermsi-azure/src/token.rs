use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AzureError;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

// ── Token provider ────────────────────────────────────────────────────────────

/// Source of bearer tokens for one audience. Enables test injection.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn token(&self) -> Result<String, AzureError>;
}

/// Cached token with its refresh deadline.
#[derive(Default)]
pub(crate) struct TokenCache(Mutex<Option<(String, Instant)>>);

impl TokenCache {
    pub(crate) async fn get(&self) -> Option<String> {
        let guard = self.0.lock().await;
        match guard.as_ref() {
            Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
            _ => None,
        }
    }

    /// Store `tok`, refreshing a minute before it expires.
    pub(crate) async fn put(&self, tok: &str, expires_in: u64) {
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        *self.0.lock().await = Some((tok.to_string(), expiry));
    }
}

/// Pull `access_token` and `expires_in` out of an OAuth2 token response.
/// `expires_in` arrives as a number from AAD and as a string from IMDS.
pub(crate) fn parse_token_response(source: &str, resp: &Value) -> Result<(String, u64), AzureError> {
    let tok = resp["access_token"]
        .as_str()
        .ok_or_else(|| AzureError::Auth(format!("{}: no access_token in response: {}", source, resp)))?
        .to_string();
    let expires_in = resp["expires_in"]
        .as_u64()
        .or_else(|| resp["expires_in"].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(3600);
    Ok((tok, expires_in))
}

fn resource_from_scope(scope: &str) -> &str {
    scope.strip_suffix(".default").unwrap_or(scope)
}

// ── Service Principal ─────────────────────────────────────────────────────────

pub struct ServicePrincipalTokenProvider {
    tenant_id:      String,
    client_id:      String,
    client_secret:  String,
    authority_host: String,
    scope:          String,
    client:         reqwest::Client,
    cache:          TokenCache,
}

impl ServicePrincipalTokenProvider {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authority_host: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id:      tenant_id.into(),
            client_id:      client_id.into(),
            client_secret:  client_secret.into(),
            authority_host: authority_host.into(),
            scope:          scope.into(),
            client:         reqwest::Client::new(),
            cache:          TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        debug!(url = %url, "requesting service principal token");
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AzureError::Auth(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Auth(format!("SP token decode: {}", e)))?;

        let (tok, expires_in) = parse_token_response("SP token", &resp)?;
        self.cache.put(&tok, expires_in).await;
        Ok(tok)
    }
}

// ── Managed Identity (IMDS) ───────────────────────────────────────────────────

pub struct ManagedIdentityTokenProvider {
    endpoint: String,
    resource: String,
    client:   reqwest::Client,
    cache:    TokenCache,
}

impl ManagedIdentityTokenProvider {
    pub fn new(scope: &str) -> Self {
        Self::with_endpoint(IMDS_ENDPOINT, scope)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, scope: &str) -> Self {
        Self {
            endpoint: endpoint.into(),
            resource: resource_from_scope(scope).to_string(),
            client:   reqwest::Client::new(),
            cache:    TokenCache::default(),
        }
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let resp: Value = self
            .client
            .get(&self.endpoint)
            .header("Metadata", "true")
            .query(&[
                ("api-version", "2018-02-01"),
                ("resource", self.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AzureError::Auth(format!("IMDS token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Auth(format!("IMDS token decode: {}", e)))?;

        let (tok, expires_in) = parse_token_response("IMDS token", &resp)?;
        self.cache.put(&tok, expires_in).await;
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

pub struct AzureCliTokenProvider {
    tenant_id: Option<String>,
    scope:     String,
}

impl AzureCliTokenProvider {
    pub fn new(tenant_id: Option<String>, scope: impl Into<String>) -> Self {
        Self {
            tenant_id,
            scope: scope.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, AzureError> {
        let mut cmd = Command::new("az");
        cmd.args(["account", "get-access-token", "--scope", self.scope.as_str(), "--output", "json"]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant.as_str()]);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| AzureError::Auth(format!("az CLI not found: {}. Install Azure CLI or configure service principal credentials.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::Auth(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AzureError::Auth(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| AzureError::Auth("az CLI: no accessToken in output".into()))?
            .to_string();
        Ok(tok)
    }
}

// ── Static (tests, local runs) ────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, AzureError> {
        Ok(self.0.clone())
    }
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Pick a token provider for `scope`:
/// 1. `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET` → Service Principal
/// 2. `IDENTITY_ENDPOINT` env var → Managed Identity (IMDS)
/// 3. Otherwise → Azure CLI (`az account get-access-token`)
pub fn default_token_provider(authority_host: &str, scope: &str) -> Arc<dyn TokenProvider> {
    let tenant = std::env::var("AZURE_TENANT_ID").ok();
    if let (Some(tenant_id), Ok(cid), Ok(cs)) = (
        tenant.clone(),
        std::env::var("AZURE_CLIENT_ID"),
        std::env::var("AZURE_CLIENT_SECRET"),
    ) {
        Arc::new(ServicePrincipalTokenProvider::new(tenant_id, cid, cs, authority_host, scope))
    } else if std::env::var("IDENTITY_ENDPOINT").is_ok() {
        Arc::new(ManagedIdentityTokenProvider::new(scope))
    } else {
        Arc::new(AzureCliTokenProvider::new(tenant, scope))
    }
}
