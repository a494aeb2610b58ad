//! Settings types.
//!
//! All structs use `camelCase` on disk and `#[serde(default)]` so a partial
//! settings file only needs the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hosts accepted by the allow-list when none are configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["127.0.0.1", "localhost"];

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AbacusSettings {
    /// Listener and HTTP settings.
    pub server: ServerSettings,
    /// Host/origin allow-list settings.
    pub security: SecuritySettings,
    /// Graceful shutdown settings.
    pub shutdown: ShutdownSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Deployment environment tag.
///
/// Selects permissive (non-production) or restrictive (production)
/// allow-list defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Production deployment.
    Production,
}

impl Environment {
    /// Parse an environment name, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    /// Name as it appears on the wire (`/health`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

/// Listener and HTTP settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// CORS allowed origin (`*` for any).
    pub cors_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::Development,
            max_body_bytes: 10 * 1024 * 1024,
            cors_origin: "*".to_string(),
        }
    }
}

/// Host/origin allow-list settings.
///
/// Unset fields fall back to environment-dependent defaults, see
/// [`SecuritySettings::enforced`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    /// Accepted `Host` header values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
    /// Accepted `Origin` header values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    /// Force enforcement on or off regardless of environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce: Option<bool>,
}

impl SecuritySettings {
    /// Whether the allow-list is enforced in `environment`.
    ///
    /// Permissive outside production unless explicitly enabled.
    pub fn enforced(&self, environment: Environment) -> bool {
        self.enforce
            .unwrap_or(environment == Environment::Production)
    }

    /// Effective host allow-list.
    pub fn hosts(&self) -> Vec<String> {
        self.allowed_hosts.clone().unwrap_or_else(|| {
            DEFAULT_ALLOWED_HOSTS
                .iter()
                .map(|h| (*h).to_string())
                .collect()
        })
    }

    /// Effective origin allow-list (empty rejects every browser origin).
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins.clone().unwrap_or_default()
    }
}

/// Graceful shutdown settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShutdownSettings {
    /// How long live sessions get to close before exit proceeds anyway.
    pub grace_period_ms: u64,
}

impl ShutdownSettings {
    /// Grace period as a `Duration`.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level / `EnvFilter` directive.
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parse() {
        assert_eq!(Environment::parse("production"), Some(Environment::Production));
        assert_eq!(Environment::parse("PROD"), Some(Environment::Production));
        assert_eq!(Environment::parse("test"), Some(Environment::Test));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn environment_serde_lowercase() {
        let json = serde_json::to_string(&Environment::Production).unwrap();
        assert_eq!(json, "\"production\"");
    }

    #[test]
    fn allow_list_permissive_outside_production() {
        let sec = SecuritySettings::default();
        assert!(!sec.enforced(Environment::Development));
        assert!(!sec.enforced(Environment::Test));
        assert!(sec.enforced(Environment::Production));
    }

    #[test]
    fn explicit_enforce_overrides_environment() {
        let sec = SecuritySettings {
            enforce: Some(true),
            ..SecuritySettings::default()
        };
        assert!(sec.enforced(Environment::Development));

        let sec = SecuritySettings {
            enforce: Some(false),
            ..SecuritySettings::default()
        };
        assert!(!sec.enforced(Environment::Production));
    }

    #[test]
    fn default_hosts_and_origins() {
        let sec = SecuritySettings::default();
        assert_eq!(sec.hosts(), vec!["127.0.0.1", "localhost"]);
        assert!(sec.origins().is_empty());
    }

    #[test]
    fn configured_hosts_replace_defaults() {
        let sec = SecuritySettings {
            allowed_hosts: Some(vec!["calc.example.com".into()]),
            ..SecuritySettings::default()
        };
        assert_eq!(sec.hosts(), vec!["calc.example.com"]);
    }

    #[test]
    fn grace_period_duration() {
        let s = ShutdownSettings { grace_period_ms: 250 };
        assert_eq!(s.grace_period(), Duration::from_millis(250));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let settings: AbacusSettings =
            serde_json::from_str(r#"{"server": {"port": 8080}}"#).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn camel_case_keys() {
        let value = serde_json::to_value(AbacusSettings::default()).unwrap();
        assert!(value["server"].get("maxBodyBytes").is_some());
        assert!(value["shutdown"].get("gracePeriodMs").is_some());
        assert!(value["security"].get("allowedHosts").is_none());
    }
}
