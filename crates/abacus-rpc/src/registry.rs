//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use abacus_core::constants::{RPC_ERRORS_TOTAL, RPC_REQUEST_DURATION_SECONDS, RPC_REQUESTS_TOTAL};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::types::{RequestId, RpcRequest, RpcResponse};

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Maximum time a single RPC handler is allowed to run.
    const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Dispatch a request to the appropriate handler.
    ///
    /// Always returns a response; callers drop it for notifications. Error
    /// responses carry the method (and the tool, for `tools/call`) in `data`.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let method = request.method.clone();
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);
        let context = error_context(&method, request.params.as_ref());

        let Some(handler) = self.handlers.get(&method) else {
            let err = RpcError::MethodNotFound {
                method: method.clone(),
            };
            return failed(request.id, &method, &err, context);
        };

        let start = std::time::Instant::now();
        let result =
            tokio::time::timeout(Self::HANDLER_TIMEOUT, handler.handle(request.params, ctx)).await;

        let response = match result {
            Ok(Ok(result)) => RpcResponse::success(request.id, result),
            Ok(Err(err)) => {
                if let RpcError::Internal { message } = &err {
                    error!(method, error = %message, "RPC handler failed");
                }
                failed(request.id, &method, &err, context)
            }
            Err(_elapsed) => {
                let err = RpcError::Internal {
                    message: format!("handler for '{method}' timed out"),
                };
                error!(method, "RPC handler timed out after {:?}", Self::HANDLER_TIMEOUT);
                failed(request.id, &method, &err, context)
            }
        };

        let duration = start.elapsed();
        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone())
            .record(duration.as_secs_f64());

        if duration.as_secs() >= 5 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `error.data` context for a request: its method, plus the tool for `tools/call`.
fn error_context(method: &str, params: Option<&Value>) -> Map<String, Value> {
    let mut context = Map::new();
    let _ = context.insert("method".into(), Value::String(method.to_owned()));
    if method == "tools/call" {
        if let Some(tool) = params.and_then(|p| p.get("name")).and_then(Value::as_str) {
            let _ = context.insert("tool".into(), Value::String(tool.to_owned()));
        }
    }
    context
}

fn failed(
    id: Option<RequestId>,
    method: &str,
    err: &RpcError,
    context: Map<String, Value>,
) -> RpcResponse {
    counter!(RPC_ERRORS_TOTAL, "method" => method.to_owned(), "code" => err.code().to_string())
        .increment(1);
    RpcResponse::from_error_with(id, err, context)
}
