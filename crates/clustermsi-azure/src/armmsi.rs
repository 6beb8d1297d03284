use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::environment::ArmClientOptions;
use crate::error::AzureError;
use crate::token::TokenProvider;

const MSI_API_VERSION: &str = "2023-01-31";

// ── Resource types ────────────────────────────────────────────────────────────

/// A user-assigned managed identity resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub properties: IdentityProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProperties {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub principal_id: String,
    #[serde(default)]
    pub client_id: String,
}

/// A federated identity credential on a user-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentityCredential {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub properties: FederatedIdentityCredentialProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentityCredentialProperties {
    pub issuer: String,
    pub subject: String,
    pub audiences: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    next_link: Option<String>,
}

// ── ARM plumbing ──────────────────────────────────────────────────────────────

/// Subscription-scoped ARM REST client shared by the two MSI clients.
#[derive(Clone)]
struct ArmClient {
    endpoint: String,
    subscription_id: String,
    client: reqwest::Client,
    token: Arc<dyn TokenProvider>,
}

impl ArmClient {
    fn new(
        subscription_id: &str,
        token: Arc<dyn TokenProvider>,
        options: &ArmClientOptions,
    ) -> Result<Self, AzureError> {
        if subscription_id.trim().is_empty() {
            return Err(AzureError::Configuration("subscription id is empty".into()));
        }
        reqwest::Url::parse(&options.endpoint).map_err(|e| {
            AzureError::Configuration(format!("ARM endpoint '{}': {}", options.endpoint, e))
        })?;
        Ok(Self {
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            client: reqwest::Client::new(),
            token,
        })
    }

    fn identities_url(&self, resource_group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ManagedIdentity/userAssignedIdentities",
            self.endpoint, self.subscription_id, resource_group,
        )
    }

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    fn with_api_version(url: &str) -> String {
        if url.contains("api-version=") {
            url.to_string()
        } else {
            format!("{}?api-version={}", url, MSI_API_VERSION)
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<(u16, Value), AzureError> {
        let token = self.token.token().await?;
        let resp = req
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AzureError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    fn check(url: &str, status: u16, body: &Value) -> Result<(), AzureError> {
        match status {
            404 => Err(AzureError::NotFound(url.to_string())),
            s if (200..300).contains(&s) => Ok(()),
            s => Err(AzureError::Status {
                url: url.to_string(),
                status: s,
                message: Self::parse_arm_error(body),
            }),
        }
    }

    fn decode<T: DeserializeOwned>(url: &str, body: Value) -> Result<T, AzureError> {
        serde_json::from_value(body).map_err(|e| AzureError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn arm_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, AzureError> {
        let url = Self::with_api_version(url);
        debug!(url = %url, "Azure ARM GET");
        let (status, body) = self.send(self.client.get(&url), &url).await?;
        Self::check(&url, status, &body)?;
        Self::decode(&url, body)
    }

    async fn arm_put<T: DeserializeOwned>(&self, url: &str, payload: &impl Serialize) -> Result<T, AzureError> {
        let url = Self::with_api_version(url);
        debug!(url = %url, "Azure ARM PUT");
        let (status, body) = self.send(self.client.put(&url).json(payload), &url).await?;
        Self::check(&url, status, &body)?;
        Self::decode(&url, body)
    }

    /// Deleting something already gone succeeds.
    async fn arm_delete(&self, url: &str) -> Result<(), AzureError> {
        let url = Self::with_api_version(url);
        debug!(url = %url, "Azure ARM DELETE");
        let (status, body) = self.send(self.client.delete(&url), &url).await?;
        match Self::check(&url, status, &body) {
            Err(AzureError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Follow `nextLink` until the listing is exhausted.
    async fn arm_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, AzureError> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next {
            let page: Page<T> = self.arm_get(&url).await?;
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }
}

// ── UserAssignedIdentitiesClient ──────────────────────────────────────────────

/// ARM client for `Microsoft.ManagedIdentity/userAssignedIdentities`.
#[derive(Clone)]
pub struct UserAssignedIdentitiesClient {
    arm: ArmClient,
}

impl UserAssignedIdentitiesClient {
    pub fn new(
        subscription_id: &str,
        credential: Arc<dyn TokenProvider>,
        options: &ArmClientOptions,
    ) -> Result<Self, AzureError> {
        Ok(Self {
            arm: ArmClient::new(subscription_id, credential, options)?,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.arm.subscription_id
    }

    pub async fn get(&self, resource_group: &str, name: &str) -> Result<Identity, AzureError> {
        let url = format!("{}/{}", self.arm.identities_url(resource_group), name);
        self.arm.arm_get(&url).await
    }

    pub async fn list_by_resource_group(&self, resource_group: &str) -> Result<Vec<Identity>, AzureError> {
        self.arm.arm_list(&self.arm.identities_url(resource_group)).await
    }
}

// ── FederatedIdentityCredentialsClient ────────────────────────────────────────

/// ARM client for the `federatedIdentityCredentials` child resource of a
/// user-assigned identity.
#[derive(Clone)]
pub struct FederatedIdentityCredentialsClient {
    arm: ArmClient,
}

impl FederatedIdentityCredentialsClient {
    pub fn new(
        subscription_id: &str,
        credential: Arc<dyn TokenProvider>,
        options: &ArmClientOptions,
    ) -> Result<Self, AzureError> {
        Ok(Self {
            arm: ArmClient::new(subscription_id, credential, options)?,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.arm.subscription_id
    }

    fn credentials_url(&self, resource_group: &str, identity: &str) -> String {
        format!(
            "{}/{}/federatedIdentityCredentials",
            self.arm.identities_url(resource_group),
            identity
        )
    }

    pub async fn get(
        &self,
        resource_group: &str,
        identity: &str,
        name: &str,
    ) -> Result<FederatedIdentityCredential, AzureError> {
        let url = format!("{}/{}", self.credentials_url(resource_group, identity), name);
        self.arm.arm_get(&url).await
    }

    pub async fn list(
        &self,
        resource_group: &str,
        identity: &str,
    ) -> Result<Vec<FederatedIdentityCredential>, AzureError> {
        self.arm.arm_list(&self.credentials_url(resource_group, identity)).await
    }

    pub async fn create_or_update(
        &self,
        resource_group: &str,
        identity: &str,
        name: &str,
        properties: &FederatedIdentityCredentialProperties,
    ) -> Result<FederatedIdentityCredential, AzureError> {
        let url = format!("{}/{}", self.credentials_url(resource_group, identity), name);
        let payload = FederatedIdentityCredential {
            id: String::new(),
            name: String::new(),
            properties: properties.clone(),
        };
        self.arm.arm_put(&url, &payload).await
    }

    pub async fn delete(&self, resource_group: &str, identity: &str, name: &str) -> Result<(), AzureError> {
        let url = format!("{}/{}", self.credentials_url(resource_group, identity), name);
        self.arm.arm_delete(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticToken;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const BASE: &str = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities";

    fn options(server: &MockServer) -> ArmClientOptions {
        ArmClientOptions {
            endpoint: server.uri(),
            audience: format!("{}/", server.uri()),
            authority_host: server.uri(),
        }
    }

    fn token() -> Arc<dyn TokenProvider> {
        Arc::new(StaticToken("fake-token".into()))
    }

    fn identity_json(name: &str) -> Value {
        json!({
            "id": format!("{}/{}", BASE, name),
            "name": name,
            "location": "eastus",
            "properties": { "tenantId": "t", "principalId": "p", "clientId": "c" }
        })
    }

    #[tokio::test]
    async fn get_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/msi", BASE)))
            .and(query_param("api-version", MSI_API_VERSION))
            .and(header("Authorization", "Bearer fake-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(identity_json("msi")))
            .mount(&server)
            .await;

        let c = UserAssignedIdentitiesClient::new("sub-1", token(), &options(&server)).unwrap();
        let id = c.get("rg", "msi").await.unwrap();
        assert_eq!(id.name, "msi");
        assert_eq!(id.properties.client_id, "c");
        assert_eq!(id.properties.principal_id, "p");
    }

    #[tokio::test]
    async fn get_missing_identity_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "gone" }
            })))
            .mount(&server)
            .await;

        let c = UserAssignedIdentitiesClient::new("sub-1", token(), &options(&server)).unwrap();
        let err = c.get("rg", "msi").await.unwrap_err();
        assert!(matches!(err, AzureError::NotFound(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn list_follows_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BASE))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [identity_json("b")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(BASE))
            .and(query_param("api-version", MSI_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [identity_json("a")],
                "nextLink": format!("{}{}?api-version={}&page=2", server.uri(), BASE, MSI_API_VERSION)
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let c = UserAssignedIdentitiesClient::new("sub-1", token(), &options(&server)).unwrap();
        let all = c.list_by_resource_group("rg").await.unwrap();
        let names: Vec<_> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn create_federated_credential() {
        let server = MockServer::start().await;
        let props = FederatedIdentityCredentialProperties {
            issuer: "https://issuer.example".into(),
            subject: "system:serviceaccount:ns:sa".into(),
            audiences: vec!["api://AzureADTokenExchange".into()],
        };
        Mock::given(method("PUT"))
            .and(path(format!("{}/msi/federatedIdentityCredentials/fic", BASE)))
            .and(body_json(json!({
                "properties": {
                    "issuer": "https://issuer.example",
                    "subject": "system:serviceaccount:ns:sa",
                    "audiences": ["api://AzureADTokenExchange"]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("{}/msi/federatedIdentityCredentials/fic", BASE),
                "name": "fic",
                "properties": {
                    "issuer": "https://issuer.example",
                    "subject": "system:serviceaccount:ns:sa",
                    "audiences": ["api://AzureADTokenExchange"]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = FederatedIdentityCredentialsClient::new("sub-1", token(), &options(&server)).unwrap();
        let fic = c.create_or_update("rg", "msi", "fic", &props).await.unwrap();
        assert_eq!(fic.name, "fic");
        assert_eq!(fic.properties, props);
    }

    #[tokio::test]
    async fn delete_of_missing_credential_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/msi/federatedIdentityCredentials/fic", BASE)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let c = FederatedIdentityCredentialsClient::new("sub-1", token(), &options(&server)).unwrap();
        c.delete("rg", "msi", "fic").await.unwrap();
    }

    #[tokio::test]
    async fn server_error_carries_arm_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "InternalError", "message": "boom" }
            })))
            .mount(&server)
            .await;

        let c = FederatedIdentityCredentialsClient::new("sub-1", token(), &options(&server)).unwrap();
        let err = c.list("rg", "msi").await.unwrap_err();
        assert!(err.to_string().contains("InternalError: boom"), "got: {}", err);
    }

    #[test]
    fn empty_subscription_is_rejected() {
        let opts = ArmClientOptions {
            endpoint: "https://management.azure.com".into(),
            audience: "https://management.azure.com/".into(),
            authority_host: "https://login.microsoftonline.com".into(),
        };
        let err = UserAssignedIdentitiesClient::new("", token(), &opts).err().unwrap();
        assert!(matches!(err, AzureError::Configuration(_)));
    }

    #[test]
    fn parse_arm_error_missing_fields_gives_fallback() {
        let body = json!({ "error": {} });
        assert_eq!(ArmClient::parse_arm_error(&body), "Unknown: unknown error");
    }
}
