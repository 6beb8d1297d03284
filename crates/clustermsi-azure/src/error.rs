use thiserror::Error;

#[derive(Debug, Error)]
pub enum AzureError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url}: status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("cloud '{0}' is not supported by the MSI dataplane")]
    UnsupportedCloud(String),

    #[error("invalid credential material: {0}")]
    Credential(String),

    #[error("invalid client configuration: {0}")]
    Configuration(String),
}

#[derive(Debug, Error)]
pub enum DataplaneError {
    #[error("dataplane token: {0}")]
    Token(#[source] AzureError),

    #[error("dataplane request failed: {0}")]
    Request(String),

    #[error("dataplane returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("dataplane response could not be decoded: {0}")]
    Decode(String),
}
