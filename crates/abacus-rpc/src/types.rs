//! JSON-RPC 2.0 wire-format types.

use std::fmt;

use abacus_core::constants::JSONRPC_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcError;

/// Request identifier: a string or an integer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    String(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// A request or notification addressed to the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; `None` for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Method name (e.g. `tools/call`).
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request with an id.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

/// One decoded inbound message.
#[derive(Clone, Debug)]
pub enum IncomingMessage {
    /// Request expecting exactly one response.
    Request(RpcRequest),
    /// Notification; dispatched but never answered.
    Notification(RpcRequest),
    /// A client's response to a server request; accepted and ignored.
    Response(Value),
    /// Not a valid JSON-RPC message; answered with `-32600`.
    Invalid {
        /// Id, if one could be recovered.
        id: Option<RequestId>,
        /// What is wrong.
        reason: String,
    },
}

impl IncomingMessage {
    /// Classify a JSON value as a JSON-RPC message.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::Invalid {
                id: None,
                reason: "message must be a JSON object".into(),
            };
        };

        let id = map.get("id").and_then(RequestId::from_value);

        if map.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Self::Invalid {
                id,
                reason: "jsonrpc must be \"2.0\"".into(),
            };
        }

        if let Some(method) = map.get("method") {
            let Some(method) = method.as_str().map(ToOwned::to_owned) else {
                return Self::Invalid {
                    id,
                    reason: "method must be a string".into(),
                };
            };
            let params = map.remove("params");
            return match map.get("id") {
                None => Self::Notification(RpcRequest {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id: None,
                    method,
                    params,
                }),
                Some(_) if id.is_none() => Self::Invalid {
                    id: None,
                    reason: "id must be a string or an integer".into(),
                },
                Some(_) => Self::Request(RpcRequest {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    method,
                    params,
                }),
            };
        }

        if id.is_some() && (map.contains_key("result") || map.contains_key("error")) {
            return Self::Response(Value::Object(map));
        }

        Self::Invalid {
            id,
            reason: "message has neither method nor result".into(),
        }
    }

    /// Whether this message expects a response.
    pub fn expects_response(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Invalid { .. })
    }
}

/// A decoded request body: one message or a batch.
#[derive(Clone, Debug)]
pub struct MessageBatch {
    /// Messages in arrival order.
    pub messages: Vec<IncomingMessage>,
    /// Whether the body was a JSON array (responses go back as an array too).
    pub batched: bool,
}

impl MessageBatch {
    /// Parse a raw body.
    ///
    /// Fails with `-32700` for malformed JSON and `-32600` for an empty array.
    pub fn parse(body: &[u8]) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| RpcError::Parse {
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Build from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(RpcError::InvalidRequest {
                        message: "empty batch".into(),
                    });
                }
                Ok(Self {
                    messages: items.into_iter().map(IncomingMessage::from_value).collect(),
                    batched: true,
                })
            }
            other => Ok(Self::single(IncomingMessage::from_value(other))),
        }
    }

    /// Wrap one message.
    pub fn single(message: IncomingMessage) -> Self {
        Self {
            messages: vec![message],
            batched: false,
        }
    }

    /// Number of `initialize` requests in the batch.
    pub fn initialize_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, IncomingMessage::Request(r) if r.method == "initialize"))
            .count()
    }

    /// Whether the batch is the reserved initialization shape.
    pub fn is_initialize(&self) -> bool {
        self.initialize_count() > 0
    }

    /// Whether any message will produce a response.
    pub fn expects_response(&self) -> bool {
        self.messages.iter().any(IncomingMessage::expects_response)
    }
}

/// Outgoing response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request id (`null` when it could not be determined).
    pub id: Option<RequestId>,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response from a body.
    pub fn error(id: Option<RequestId>, body: RpcErrorBody) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(body),
        }
    }

    /// Build an error response from an [`RpcError`].
    pub fn from_error(id: Option<RequestId>, err: &RpcError) -> Self {
        Self::error(id, err.to_error_body())
    }

    /// Build an error response whose `data` also carries `context`.
    pub fn from_error_with(
        id: Option<RequestId>,
        err: &RpcError,
        context: serde_json::Map<String, Value>,
    ) -> Self {
        Self::error(id, err.to_error_body_with(context))
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured error body inside an [`RpcResponse`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// JSON-RPC error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
