//! Client configuration

use std::time::Duration;

/// Client configuration for connecting to the order service
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service base URL (e.g., "http://localhost:8080")
    pub base_url: String,

    /// Bearer token for authentication
    pub token: Option<String>,

    /// Establishment whose orders this client works with
    pub establishment_id: Option<i64>,

    /// Client name reported in the feed handshake
    pub client_name: String,

    /// Feed TCP address (e.g., "localhost:9010")
    pub feed_addr: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Attempts per idempotent read (1 = no retry)
    pub retry_attempts: u32,

    /// Backoff base delay; doubles per attempt
    pub retry_base_delay: Duration,

    /// Background refresh period for the sync controller
    pub auto_refresh_interval: Duration,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            establishment_id: None,
            client_name: "comanda-client".to_string(),
            feed_addr: None,
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            auto_refresh_interval: Duration::from_secs(30),
        }
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Scope requests to one establishment
    pub fn with_establishment(mut self, id: i64) -> Self {
        self.establishment_id = Some(id);
        self
    }

    /// Set the client name reported in the feed handshake
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the feed TCP address
    pub fn with_feed_addr(mut self, addr: impl Into<String>) -> Self {
        self.feed_addr = Some(addr.into());
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy for idempotent reads
    pub fn with_retry(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_base_delay = base_delay;
        self
    }

    /// Set the background refresh period
    pub fn with_auto_refresh_interval(mut self, interval: Duration) -> Self {
        self.auto_refresh_interval = interval;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}
