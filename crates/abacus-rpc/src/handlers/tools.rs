//! Tool handlers: list and call the arithmetic operations.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers::require_string_param;
use crate::registry::MethodHandler;

/// Lists every registered operation with its input schema.
pub struct ListToolsHandler;

#[async_trait]
impl MethodHandler for ListToolsHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let tools: Vec<Value> = ctx
            .operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.name(),
                    "title": op.title(),
                    "description": op.description(),
                    "inputSchema": op.input_schema(),
                })
            })
            .collect();
        Ok(json!({ "tools": tools }))
    }
}

/// Invokes one operation and wraps its payload as text content.
///
/// Validation and compute failures come back as a result with
/// `isError: true`, never as an RPC error.
pub struct CallToolHandler;

#[async_trait]
impl MethodHandler for CallToolHandler {
    #[instrument(skip_all, fields(method = "tools/call", operation))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let name = require_string_param(params.as_ref(), "name")?;
        let _ = tracing::Span::current().record("operation", name);
        let args = params.as_ref().and_then(|p| p.get("arguments"));

        let outcome = ctx
            .operations
            .invoke(name, args)
            .ok_or_else(|| RpcError::InvalidParams {
                message: format!("Unknown tool: {name}"),
            })?;

        let text = serde_json::to_string_pretty(&outcome).map_err(|e| RpcError::Internal {
            message: format!("failed to encode operation result: {e}"),
        })?;

        let mut result = json!({
            "content": [{ "type": "text", "text": text }],
        });
        if outcome.is_error() {
            result["isError"] = Value::Bool(true);
        }
        Ok(result)
    }
}
