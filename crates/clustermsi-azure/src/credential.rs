use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clustermsi_domain::resource_id::eq_fold;
use clustermsi_domain::{CredentialsObject, NestedCredentialsObject};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::environment::ArmClientOptions;
use crate::error::AzureError;
use crate::token::{parse_token_response, TokenCache, TokenProvider};

// ── Identity set ──────────────────────────────────────────────────────────────

/// Identities carried by a stored credentials object, bound to the ARM
/// options their tokens are requested for.
#[derive(Debug, Clone)]
pub struct UserAssignedIdentities {
    credentials: CredentialsObject,
    options: ArmClientOptions,
}

impl UserAssignedIdentities {
    /// Deserialize a credentials object previously written to the secret store.
    pub fn from_secret(value: &str, options: ArmClientOptions) -> Result<Self, AzureError> {
        let credentials: CredentialsObject = serde_json::from_str(value)
            .map_err(|e| AzureError::Credential(format!("credentials object: {}", e)))?;
        Ok(Self { credentials, options })
    }

    pub fn options(&self) -> &ArmClientOptions {
        &self.options
    }

    fn identities(&self) -> impl Iterator<Item = &NestedCredentialsObject> {
        self.credentials
            .explicit_identities
            .iter()
            .flatten()
            .flatten()
    }

    /// Token credential for the identity `resource_id`, matched ignoring case.
    ///
    /// A payload holding exactly one identity without a `resource_id` is taken
    /// to be that identity.
    pub fn get_credential(&self, resource_id: &str) -> Result<Arc<dyn TokenProvider>, AzureError> {
        let found = self
            .identities()
            .find(|i| i.resource_id.as_deref().is_some_and(|r| eq_fold(r, resource_id)));
        let identity = match found {
            Some(i) => i,
            None => {
                let all: Vec<_> = self.identities().collect();
                match all.as_slice() {
                    [only] if only.resource_id.is_none() => *only,
                    _ => {
                        return Err(AzureError::Credential(format!(
                            "no identity matching '{}' in credentials object",
                            resource_id
                        )))
                    }
                }
            }
        };

        let credential = ClientCertificateCredential::from_identity(identity, &self.options)?;
        Ok(Arc::new(credential))
    }
}

// ── Client certificate credential ─────────────────────────────────────────────

/// Client-credentials token flow authenticated by the identity's certificate
/// over mutual TLS.
pub struct ClientCertificateCredential {
    tenant_id: String,
    client_id: String,
    authority: String,
    scope:     String,
    pkcs12:    Vec<u8>,
    client:    OnceCell<reqwest::Client>,
    cache:     TokenCache,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AzureError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AzureError::Credential(format!("identity has no {}", field)))
}

impl ClientCertificateCredential {
    /// `certificate` is the base64 PKCS#12 blob (no password) from the
    /// identity's `client_secret`.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        certificate: &str,
        authority: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, AzureError> {
        let pkcs12 = STANDARD
            .decode(certificate.trim())
            .map_err(|e| AzureError::Credential(format!("certificate is not base64: {}", e)))?;
        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority: authority.into().trim_end_matches('/').to_string(),
            scope: scope.into(),
            pkcs12,
            client: OnceCell::new(),
            cache: TokenCache::default(),
        })
    }

    fn from_identity(
        identity: &NestedCredentialsObject,
        options: &ArmClientOptions,
    ) -> Result<Self, AzureError> {
        let authority = identity
            .mtls_authentication_endpoint
            .clone()
            .or_else(|| identity.authentication_endpoint.clone())
            .unwrap_or_else(|| options.authority_host.clone());
        Self::new(
            required(&identity.tenant_id, "tenant_id")?,
            required(&identity.client_id, "client_id")?,
            required(&identity.client_secret, "client_secret")?,
            authority,
            options.scope(),
        )
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    async fn http_client(&self) -> Result<&reqwest::Client, AzureError> {
        self.client
            .get_or_try_init(|| async {
                let identity = reqwest::Identity::from_pkcs12_der(&self.pkcs12, "")
                    .map_err(|e| AzureError::Credential(format!("certificate: {}", e)))?;
                reqwest::Client::builder()
                    .identity(identity)
                    .build()
                    .map_err(|e| AzureError::Credential(format!("mTLS client: {}", e)))
            })
            .await
    }
}

#[async_trait]
impl TokenProvider for ClientCertificateCredential {
    async fn token(&self) -> Result<String, AzureError> {
        if let Some(tok) = self.cache.get().await {
            return Ok(tok);
        }

        let client = self.http_client().await?;
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
        ];
        debug!(url = %url, client_id = %self.client_id, "requesting certificate token");
        let resp: Value = client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AzureError::Auth(format!("certificate token request: {}", e)))?
            .json()
            .await
            .map_err(|e| AzureError::Auth(format!("certificate token decode: {}", e)))?;

        let (tok, expires_in) = parse_token_response("certificate token", &resp)?;
        self.cache.put(&tok, expires_in).await;
        Ok(tok)
    }
}
