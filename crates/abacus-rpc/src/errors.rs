//! RPC error codes and error type.

use serde_json::{Map, Value};

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Body is not valid JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Body is JSON but not a valid JSON-RPC message.
pub const INVALID_REQUEST: i32 = -32600;
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid or missing parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Unexpected internal error.
pub const INTERNAL_ERROR: i32 = -32603;
/// Session or transport level failure (unknown session, draining, rejected host).
pub const SERVER_ERROR: i32 = -32000;

/// RPC error type returned by handlers and the message parser.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Body could not be parsed as JSON.
    #[error("Parse error: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },

    /// Message is not a well-formed JSON-RPC request.
    #[error("Invalid Request: {message}")]
    InvalidRequest {
        /// What is wrong with the message.
        message: String,
    },

    /// No handler is registered for the method.
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description (logged, never sent).
        message: String,
    },
}

impl RpcError {
    /// JSON-RPC error code for this variant.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Message safe to send to the client.
    ///
    /// Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal { .. } => "Internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Convert to the wire-format error body. `data` carries a timestamp.
    pub fn to_error_body(&self) -> RpcErrorBody {
        self.to_error_body_with(Map::new())
    }

    /// Convert to the wire-format error body, with `context` merged into
    /// `data` next to the timestamp.
    pub fn to_error_body_with(&self, mut context: Map<String, Value>) -> RpcErrorBody {
        let _ = context.insert("timestamp".into(), Value::String(abacus_core::timestamp()));
        RpcErrorBody {
            code: self.code(),
            message: self.client_message(),
            data: Some(Value::Object(context)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_json_rpc() {
        assert_eq!(RpcError::Parse { message: "x".into() }.code(), -32700);
        assert_eq!(RpcError::InvalidRequest { message: "x".into() }.code(), -32600);
        assert_eq!(RpcError::MethodNotFound { method: "x".into() }.code(), -32601);
        assert_eq!(RpcError::InvalidParams { message: "x".into() }.code(), -32602);
        assert_eq!(RpcError::Internal { message: "x".into() }.code(), -32603);
    }

    #[test]
    fn method_not_found_names_method() {
        let err = RpcError::MethodNotFound {
            method: "tools/explode".into(),
        };
        assert_eq!(err.to_string(), "Method not found: tools/explode");
    }

    #[test]
    fn internal_error_is_sanitized() {
        let err = RpcError::Internal {
            message: "worker task failed at src/session/worker.rs:88".into(),
        };
        let body = err.to_error_body();
        assert_eq!(body.code, INTERNAL_ERROR);
        assert_eq!(body.message, "Internal error");
        let data = body.data.unwrap();
        assert!(data["timestamp"].is_string());
        assert!(!data.to_string().contains("worker.rs"));
    }

    #[test]
    fn invalid_params_keeps_message() {
        let err = RpcError::InvalidParams {
            message: "Unknown tool: modulo".into(),
        };
        assert_eq!(err.to_error_body().message, "Unknown tool: modulo");
    }

    #[test]
    fn error_body_with_data() {
        let err = RpcError::InvalidRequest {
            message: "Empty batch".into(),
        };
        let mut context = Map::new();
        let _ = context.insert("method".into(), "tools/list".into());
        let data = err.to_error_body_with(context).data.unwrap();
        assert_eq!(data["method"], "tools/list");
        assert!(data["timestamp"].is_string());
    }
}
