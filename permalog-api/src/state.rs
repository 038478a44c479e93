//! Application state for the API server

use std::env;
use std::sync::Arc;

use permalog_publisher::PublisherService;

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PublisherService>,
    /// Bearer secret; `None` disables auth on protected routes
    pub admin_secret: Option<String>,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<PublisherService>, admin_secret: Option<String>) -> Self {
        Self {
            service,
            admin_secret,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub admin_secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            admin_secret: None,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables
    ///
    /// - PERMALOG_API_HOST / PERMALOG_API_PORT
    /// - PERMALOG_ADMIN_SECRET: bearer secret for protected routes
    pub fn from_env() -> Self {
        Self {
            host: env::var("PERMALOG_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PERMALOG_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            enable_cors: true,
            admin_secret: env::var("PERMALOG_ADMIN_SECRET").ok().filter(|s| !s.is_empty()),
        }
    }
}
