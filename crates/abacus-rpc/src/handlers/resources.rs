//! Resource handlers: the `health://status` resource.

use abacus_core::constants::SERVER_VERSION;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::require_string_param;
use crate::registry::MethodHandler;

/// URI of the health resource.
pub const HEALTH_URI: &str = "health://status";

/// Health snapshot served by `resources/read`.
pub fn health_status(ctx: &RpcContext) -> Value {
    json!({
        "status": "healthy",
        "timestamp": abacus_core::timestamp(),
        "uptime": ctx.uptime_secs(),
        "version": SERVER_VERSION,
        "availableTools": ctx.operations.names(),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

/// Lists the health resource.
pub struct ListResourcesHandler;

#[async_trait]
impl MethodHandler for ListResourcesHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "resources": [{
                "uri": HEALTH_URI,
                "name": "health",
                "title": "Server Health Status",
                "description": "Current health and status information of the calculator server",
                "mimeType": "application/json",
            }],
        }))
    }
}

/// Reads a resource by URI.
pub struct ReadResourceHandler;

#[async_trait]
impl MethodHandler for ReadResourceHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let uri = require_string_param(params.as_ref(), "uri")?;
        if uri != HEALTH_URI {
            return Err(RpcError::InvalidParams {
                message: format!("Resource not found: {uri}"),
            });
        }

        let text =
            serde_json::to_string_pretty(&health_status(ctx)).map_err(|e| RpcError::Internal {
                message: format!("failed to encode health status: {e}"),
            })?;
        Ok(json!({
            "contents": [{
                "uri": HEALTH_URI,
                "mimeType": "application/json",
                "text": text,
            }],
        }))
    }
}
