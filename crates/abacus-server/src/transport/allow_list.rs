//! Host/origin allow-list (DNS-rebinding protection).
//!
//! Runs before any session lookup or creation, so a rejected request never
//! touches a session store.

use abacus_settings::{Environment, SecuritySettings};
use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN};
use tracing::warn;

use crate::error::ProtocolError;

/// Effective allow-list for the HTTP transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowListPolicy {
    enforce: bool,
    hosts: Vec<String>,
    origins: Vec<String>,
}

impl AllowListPolicy {
    /// Build from settings; enforcement defaults to on in production only.
    pub fn from_settings(security: &SecuritySettings, environment: Environment) -> Self {
        Self {
            enforce: security.enforced(environment),
            hosts: security.hosts(),
            origins: security.origins(),
        }
    }

    /// Policy that accepts everything.
    pub fn permissive() -> Self {
        Self {
            enforce: false,
            hosts: Vec::new(),
            origins: Vec::new(),
        }
    }

    /// Enforced policy over explicit lists.
    pub fn enforced(hosts: Vec<String>, origins: Vec<String>) -> Self {
        Self {
            enforce: true,
            hosts,
            origins,
        }
    }

    /// Whether checks are active.
    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Check the `Host` and `Origin` headers.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ProtocolError> {
        if !self.enforce {
            return Ok(());
        }

        let host = headers.get(HOST).and_then(|v| v.to_str().ok());
        match host {
            Some(host) if self.host_allowed(host) => {}
            Some(host) => {
                warn!(host, "rejected request: host not allowed");
                return Err(ProtocolError::Forbidden(format!("Invalid Host header: {host}")));
            }
            None => {
                warn!("rejected request: missing host header");
                return Err(ProtocolError::Forbidden("Missing Host header".into()));
            }
        }

        if let Some(origin) = headers.get(ORIGIN) {
            let origin = origin.to_str().unwrap_or_default();
            if !self.origins.iter().any(|o| o == origin) {
                warn!(origin, "rejected request: origin not allowed");
                return Err(ProtocolError::Forbidden(format!(
                    "Invalid Origin header: {origin}"
                )));
            }
        }

        Ok(())
    }

    fn host_allowed(&self, host: &str) -> bool {
        let name = hostname(host);
        self.hosts.iter().any(|h| h == host || h == name)
    }
}

impl Default for AllowListPolicy {
    fn default() -> Self {
        Self::from_settings(&SecuritySettings::default(), Environment::default())
    }
}

/// Host header without its port (`[::1]:3000` → `[::1]`, `localhost:3000` → `localhost`).
fn hostname(host: &str) -> &str {
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
