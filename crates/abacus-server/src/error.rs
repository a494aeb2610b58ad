//! HTTP-level protocol errors rendered as JSON-RPC error envelopes.

use abacus_core::CorrelationId;
use abacus_core::constants::{JSONRPC_VERSION, SESSION_ID_HEADER};
use abacus_rpc::RpcError;
use abacus_rpc::errors::{INTERNAL_ERROR, INVALID_REQUEST, SERVER_ERROR};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use metrics::counter;
use serde_json::{Map, Value, json};
use tracing::error;

use crate::metrics::PROTOCOL_ERRORS_TOTAL;

/// A request the server refuses before (or instead of) dispatching it.
///
/// Never mutates a session store.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Streamable request with no resolvable session that is not an initialization request.
    #[error("Bad Request: No valid session ID provided or invalid initialize request")]
    BadSession {
        /// Header names the client sent.
        received_headers: Vec<String>,
    },

    /// `initialize` sent on a session that is already active.
    #[error("Invalid Request: Server already initialized")]
    AlreadyInitialized,

    /// Initialization batched with other messages.
    #[error("Invalid Request: Only one initialization request is allowed")]
    MultipleInitialize,

    /// Legacy post without a `sessionId` query parameter.
    #[error("Bad Request: sessionId query parameter is required")]
    MissingSessionId,

    /// Legacy post naming a session that does not exist.
    #[error("No transport found for sessionId")]
    UnknownSession {
        /// Identifier the client sent.
        session_id: String,
    },

    /// The session closed before the request was answered.
    #[error("Session closed")]
    SessionClosed {
        /// Identifier of the closed session.
        session_id: String,
    },

    /// Body failed JSON or JSON-RPC decoding.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// `Accept` header admits no format the endpoint can produce.
    #[error("Not Acceptable: {0}")]
    NotAcceptable(&'static str),

    /// `Content-Type` is not JSON.
    #[error("Unsupported Media Type: Content-Type must be application/json")]
    UnsupportedMediaType,

    /// A standalone stream is already open for the session.
    #[error("Conflict: Only one SSE stream is allowed per session")]
    StreamConflict,

    /// The server is draining and accepts no new sessions.
    #[error("Service Unavailable: server is shutting down")]
    Draining,

    /// Host or origin rejected by the allow-list.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected failure; the detail is logged, never sent.
    #[error("Internal server error")]
    Internal(String),
}

impl ProtocolError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadSession { .. }
            | Self::AlreadyInitialized
            | Self::MultipleInitialize
            | Self::MissingSessionId
            | Self::Rpc(_) => StatusCode::BAD_REQUEST,
            Self::UnknownSession { .. } | Self::SessionClosed { .. } => StatusCode::NOT_FOUND,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::StreamConflict => StatusCode::CONFLICT,
            Self::Draining => StatusCode::SERVICE_UNAVAILABLE,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::AlreadyInitialized | Self::MultipleInitialize => INVALID_REQUEST,
            Self::Rpc(err) => err.code(),
            Self::Internal(_) => INTERNAL_ERROR,
            _ => SERVER_ERROR,
        }
    }

    /// Machine-readable context carried in `error.data`.
    fn data(&self) -> Value {
        let mut data = Map::new();
        let _ = data.insert("timestamp".into(), json!(abacus_core::timestamp()));
        match self {
            Self::BadSession { received_headers } => {
                let _ = data.insert("expectedHeaders".into(), json!([SESSION_ID_HEADER]));
                let _ = data.insert("receivedHeaders".into(), json!(received_headers));
            }
            Self::UnknownSession { session_id } | Self::SessionClosed { session_id } => {
                let _ = data.insert("sessionId".into(), json!(session_id));
            }
            Self::Internal(_) => {
                let _ = data.insert("requestId".into(), json!(CorrelationId::new()));
            }
            _ => {}
        }
        Value::Object(data)
    }

    /// Full JSON-RPC error envelope.
    pub fn to_body(&self) -> Value {
        let message = match self {
            Self::Rpc(err) => err.client_message(),
            other => other.to_string(),
        };
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "error": {
                "code": self.code(),
                "message": message,
                "data": self.data(),
            },
            "id": null,
        })
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let body = self.to_body();
        let status = self.status();
        counter!(PROTOCOL_ERRORS_TOTAL, "status" => status.as_u16().to_string()).increment(1);
        if let Self::Internal(detail) = &self {
            error!(
                request_id = %body["error"]["data"]["requestId"],
                error = %detail,
                "internal error handling request"
            );
        }
        (status, Json(body)).into_response()
    }
}

/// Errors starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metrics recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),

    /// The serve task panicked or was cancelled.
    #[error("serve task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience alias for server results.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_session_carries_diagnostics() {
        let err = ProtocolError::BadSession {
            received_headers: vec!["host".into(), "content-type".into()],
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.to_body();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(body["error"]["data"]["expectedHeaders"], json!(["mcp-session-id"]));
        assert_eq!(body["error"]["data"]["receivedHeaders"][1], "content-type");
        assert!(body["error"]["data"]["timestamp"].is_string());
    }

    #[test]
    fn already_initialized_is_invalid_request() {
        let err = ProtocolError::AlreadyInitialized;
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), -32600);
    }

    #[test]
    fn unknown_and_missing_session_are_distinct() {
        let missing = ProtocolError::MissingSessionId;
        let unknown = ProtocolError::UnknownSession {
            session_id: "nope".into(),
        };
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(unknown.to_body()["error"]["data"]["sessionId"], "nope");
    }

    #[test]
    fn parse_errors_keep_rpc_code() {
        let err = ProtocolError::from(RpcError::Parse {
            message: "EOF".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), -32700);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ProtocolError::Internal("mutex poisoned at line 42".into());
        let body = err.to_body();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["message"], "Internal server error");
        assert!(body["error"]["data"]["requestId"].is_string());
        assert!(!body.to_string().contains("mutex"));
    }

    #[test]
    fn status_table() {
        assert_eq!(ProtocolError::Draining.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ProtocolError::StreamConflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ProtocolError::Forbidden("host".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProtocolError::NotAcceptable("x").status(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            ProtocolError::UnsupportedMediaType.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }
}
