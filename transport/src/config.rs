//! Transport configuration.
//!
//! The coordination core consumes no configuration of its own; the endpoint
//! and timeouts here belong entirely to the transport boundary.

use std::env;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Default battery service endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:7000/api/v1";

/// Environment variable overriding the battery service endpoint.
pub const BASE_URL_ENV: &str = "BARRAGE_BASE_URL";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the battery service API.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Per-request timeout; expiry counts as a retryable failure.
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Defaults with the endpoint taken from `BARRAGE_BASE_URL` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(BASE_URL_ENV)
            && !value.trim().is_empty()
        {
            config.base_url = value.trim().to_string();
        }
        config
    }

    /// Defaults pointed at an explicit endpoint.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
