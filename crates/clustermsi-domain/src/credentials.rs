use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// Request sent to the MSI dataplane for one or more user-assigned identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssignedMsiRequest {
    pub identity_url: String,
    pub resource_ids: Vec<String>,
    pub tenant_id: String,
}

/// Credentials payload returned by the MSI dataplane.
///
/// Only `explicit_identities` is interpreted here. Every other field is kept
/// verbatim in `extra` so the payload can be stored and read back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_identities: Option<Vec<Option<NestedCredentialsObject>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credentials of a single identity inside a [`CredentialsObject`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedCredentialsObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Base64-encoded PKCS#12 certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls_authentication_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cannot_renew_after: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NestedCredentialsObject {
    /// Certificate expiry, from `not_after` in RFC 3339 form
    /// (e.g. `2017-03-01T14:11:00Z`).
    pub fn expires_at(&self) -> Result<DateTime<Utc>, DomainError> {
        let raw = self
            .not_after
            .as_deref()
            .ok_or(DomainError::MissingField { field: "not_after" })?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| DomainError::InvalidField {
                field: "not_after",
                reason: format!("'{}': {}", raw, e),
            })
    }

    /// `(client_id, object_id)`; both must be present.
    pub fn client_and_object_ids(&self) -> Result<(&str, &str), DomainError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(DomainError::MissingField { field: "client_id" })?;
        let object_id = self
            .object_id
            .as_deref()
            .ok_or(DomainError::MissingField { field: "object_id" })?;
        Ok((client_id, object_id))
    }
}

/// Return the identity a single-identity request is expected to produce.
///
/// Only the first slot is checked: the sequence must be present, non-empty,
/// and its first element populated. Additional elements are ignored.
pub fn extract_single_identity(
    creds: &CredentialsObject,
) -> Result<&NestedCredentialsObject, DomainError> {
    match creds.explicit_identities.as_deref() {
        Some([Some(first), ..]) => Ok(first),
        _ => Err(DomainError::IdentityNotPresent),
    }
}
