//! Lifecycle handlers: initialize, initialized, ping.

use abacus_core::constants::{
    LATEST_PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::registry::MethodHandler;

/// Pick the protocol version to speak.
///
/// Echoes the client's version when supported, otherwise offers the latest.
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|s| **s == v))
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Handshake: negotiates the protocol version and advertises capabilities.
pub struct InitializeHandler;

#[async_trait]
impl MethodHandler for InitializeHandler {
    #[instrument(skip_all, fields(method = "initialize"))]
    async fn handle(&self, params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        let requested = params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = negotiate_version(requested);
        debug!(requested, negotiated = version, "initialize");

        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
        }))
    }
}

/// `notifications/initialized`: nothing to do.
pub struct InitializedHandler;

#[async_trait]
impl MethodHandler for InitializedHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(Value::Null)
    }
}

/// Liveness check; returns an empty object.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_supported_version_echoes() {
        assert_eq!(negotiate_version(Some("2024-11-05")), "2024-11-05");
        assert_eq!(negotiate_version(Some("2025-03-26")), "2025-03-26");
    }

    #[test]
    fn negotiate_unknown_version_offers_latest() {
        assert_eq!(negotiate_version(Some("1999-01-01")), LATEST_PROTOCOL_VERSION);
        assert_eq!(negotiate_version(None), LATEST_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let ctx = RpcContext::default();
        let result = InitializeHandler
            .handle(Some(json!({"protocolVersion": "2024-11-05"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "advanced-calculator-server");
        assert_eq!(result["serverInfo"]["version"], "1.0.0");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let ctx = RpcContext::default();
        let result = PingHandler.handle(None, &ctx).await.unwrap();
        assert_eq!(result, json!({}));
    }
}
