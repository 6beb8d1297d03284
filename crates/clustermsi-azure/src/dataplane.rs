use std::sync::Arc;

use async_trait::async_trait;
use clustermsi_domain::{CredentialsObject, UserAssignedMsiRequest};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::DataplaneError;
use crate::token::TokenProvider;

/// Header carrying the tenant the identities belong to.
const TENANT_HEADER: &str = "x-ms-home-tenant-id";

/// Client of the MSI dataplane: exchanges identity resource ids for
/// credentials.
#[async_trait]
pub trait IdentityDataplaneClient: Send + Sync + 'static {
    async fn get_user_assigned_identities(
        &self,
        request: &UserAssignedMsiRequest,
    ) -> Result<CredentialsObject, DataplaneError>;
}

/// HTTP implementation: `POST {identity_url}?api-version=..` with body
/// `{"identityIds": [...]}`.
pub struct HttpDataplaneClient {
    client: reqwest::Client,
    token: Arc<dyn TokenProvider>,
    api_version: String,
}

impl HttpDataplaneClient {
    pub fn new(token: Arc<dyn TokenProvider>, api_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            api_version: api_version.into(),
        }
    }
}

fn dataplane_error_message(body: &Value) -> String {
    let err = body.get("error").unwrap_or(body);
    match (err["code"].as_str(), err["message"].as_str()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (None, Some(message)) => message.to_string(),
        _ => body.to_string(),
    }
}

#[async_trait]
impl IdentityDataplaneClient for HttpDataplaneClient {
    async fn get_user_assigned_identities(
        &self,
        request: &UserAssignedMsiRequest,
    ) -> Result<CredentialsObject, DataplaneError> {
        let token = self.token.token().await.map_err(DataplaneError::Token)?;
        debug!(url = %request.identity_url, identities = request.resource_ids.len(), "MSI dataplane POST");

        let resp = self
            .client
            .post(&request.identity_url)
            .query(&[("api-version", self.api_version.as_str())])
            .bearer_auth(&token)
            .header(TENANT_HEADER, &request.tenant_id)
            .json(&json!({ "identityIds": request.resource_ids }))
            .send()
            .await
            .map_err(|e| DataplaneError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(DataplaneError::Status {
                status,
                message: dataplane_error_message(&body),
            });
        }

        resp.json::<CredentialsObject>()
            .await
            .map_err(|e| DataplaneError::Decode(e.to_string()))
    }
}
