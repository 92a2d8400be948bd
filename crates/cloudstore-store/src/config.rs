//! HTTP store configuration

use crate::DEFAULT_MIN_PART_SIZE;
use std::time::Duration;

/// Configuration of an S3-compatible HTTP store
#[derive(Clone, Debug)]
pub struct HttpStoreConfig {
    /// Store endpoint URL (path-style addressing)
    pub endpoint: String,
    /// Bearer access token
    pub access_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Minimum multipart part size accepted by the store
    pub min_part_size: u64,
    /// Keys per list request
    pub list_page_size: u32,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_token: None,
            timeout: Duration::from_secs(60),
            user_agent: format!("cloudstore/{}", env!("CARGO_PKG_VERSION")),
            min_part_size: DEFAULT_MIN_PART_SIZE,
            list_page_size: 1000,
        }
    }
}

impl HttpStoreConfig {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the minimum part size
    pub fn with_min_part_size(mut self, size: u64) -> Self {
        self.min_part_size = size;
        self
    }

    /// Endpoint without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
