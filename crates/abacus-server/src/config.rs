//! Server configuration.

use std::time::Duration;

use abacus_settings::{AbacusSettings, Environment};

use crate::shutdown::DEFAULT_GRACE_PERIOD;
use crate::transport::allow_list::AllowListPolicy;

/// Runtime configuration for the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// CORS origin: `*` or a comma-separated list.
    pub cors_origin: String,
    /// Host/origin allow-list for the transports.
    pub allow_list: AllowListPolicy,
    /// How long the drain waits for sessions to close.
    pub grace_period: Duration,
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &AbacusSettings) -> Self {
        let environment = settings.server.environment;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            environment,
            max_body_bytes: settings.server.max_body_bytes,
            cors_origin: settings.server.cors_origin.clone(),
            allow_list: AllowListPolicy::from_settings(&settings.security, environment),
            grace_period: settings.shutdown.grace_period(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            environment: Environment::Test,
            max_body_bytes: 10 * 1024 * 1024,
            cors_origin: "*".into(),
            allow_list: AllowListPolicy::permissive(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}
