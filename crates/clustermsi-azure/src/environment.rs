use std::fmt;

use crate::error::AzureError;

// ── Cloud names ───────────────────────────────────────────────────────────────

/// Clouds the MSI dataplane serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudName {
    AzurePublicCloud,
    AzureUSGovernmentCloud,
}

impl CloudName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudName::AzurePublicCloud => "AzurePublicCloud",
            CloudName::AzureUSGovernmentCloud => "AzureUSGovernmentCloud",
        }
    }

    /// ARM endpoint, token audience and authority host of this cloud.
    pub fn arm_client_options(&self) -> ArmClientOptions {
        match self {
            CloudName::AzurePublicCloud => ArmClientOptions {
                endpoint: "https://management.azure.com".into(),
                audience: "https://management.azure.com/".into(),
                authority_host: "https://login.microsoftonline.com".into(),
            },
            CloudName::AzureUSGovernmentCloud => ArmClientOptions {
                endpoint: "https://management.usgovcloudapi.net".into(),
                audience: "https://management.usgovcloudapi.net/".into(),
                authority_host: "https://login.microsoftonline.us".into(),
            },
        }
    }
}

impl fmt::Display for CloudName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ARM client options ────────────────────────────────────────────────────────

/// Where ARM clients send requests and which audience their tokens carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmClientOptions {
    /// e.g. `https://management.azure.com`
    pub endpoint: String,
    /// e.g. `https://management.azure.com/`
    pub audience: String,
    /// e.g. `https://login.microsoftonline.com`
    pub authority_host: String,
}

impl ArmClientOptions {
    /// OAuth2 scope for the ARM audience.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.audience.trim_end_matches('/'))
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

/// The Azure environment the control plane runs in.
pub trait CloudEnvironment: Send + Sync + 'static {
    /// The cloud name as understood by the MSI dataplane. Fails for clouds the
    /// dataplane does not serve.
    fn cloud_name(&self) -> Result<CloudName, AzureError>;

    fn arm_client_options(&self) -> ArmClientOptions;
}

/// [`CloudEnvironment`] resolved from a configured cloud name.
#[derive(Debug, Clone)]
pub struct AzureEnvironment {
    name: String,
    options: ArmClientOptions,
}

impl AzureEnvironment {
    /// Resolve `name` (e.g. `AzurePublicCloud`). Clouds without dataplane
    /// support still get ARM defaults but fail `cloud_name()`.
    pub fn from_name(name: &str) -> Result<Self, AzureError> {
        let options = match name.to_ascii_lowercase().as_str() {
            "azurepubliccloud" => CloudName::AzurePublicCloud.arm_client_options(),
            "azureusgovernmentcloud" => CloudName::AzureUSGovernmentCloud.arm_client_options(),
            "azurechinacloud" => ArmClientOptions {
                endpoint: "https://management.chinacloudapi.cn".into(),
                audience: "https://management.chinacloudapi.cn/".into(),
                authority_host: "https://login.chinacloudapi.cn".into(),
            },
            _ => return Err(AzureError::UnsupportedCloud(name.to_string())),
        };
        Ok(Self {
            name: name.to_string(),
            options,
        })
    }

    /// Override the ARM options, e.g. to point clients at a local server.
    pub fn with_options(mut self, options: ArmClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CloudEnvironment for AzureEnvironment {
    fn cloud_name(&self) -> Result<CloudName, AzureError> {
        match self.name.to_ascii_lowercase().as_str() {
            "azurepubliccloud" => Ok(CloudName::AzurePublicCloud),
            "azureusgovernmentcloud" => Ok(CloudName::AzureUSGovernmentCloud),
            _ => Err(AzureError::UnsupportedCloud(self.name.clone())),
        }
    }

    fn arm_client_options(&self) -> ArmClientOptions {
        self.options.clone()
    }
}
