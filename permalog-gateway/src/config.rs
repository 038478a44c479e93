//! Gateway configuration
//!
//! Supports loading from environment variables with the PERMALOG_ prefix.

use serde::{Deserialize, Serialize};
use std::env;

/// Gateway connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    pub url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "https://arweave.net".to_string(),
            timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// - PERMALOG_GATEWAY_URL: gateway base URL
    /// - PERMALOG_GATEWAY_TIMEOUT: per-request timeout in seconds
    pub fn from_env() -> Self {
        Self {
            url: env::var("PERMALOG_GATEWAY_URL")
                .unwrap_or_else(|_| "https://arweave.net".to_string()),
            timeout_secs: env::var("PERMALOG_GATEWAY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Configuration for a local development gateway
    pub fn development() -> Self {
        Self {
            url: "http://127.0.0.1:1984".to_string(),
            timeout_secs: 10,
        }
    }

    /// Trim any trailing slash so joined paths stay canonical.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trims_slash() {
        let config = GatewayConfig {
            url: "https://arweave.net/".to_string(),
            timeout_secs: 30,
        };
        assert_eq!(config.base_url(), "https://arweave.net");
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.url.starts_with("https://"));
    }
}
