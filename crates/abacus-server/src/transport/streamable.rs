//! Streamable transport: `POST`, `GET` and `DELETE` on `/mcp`.
//!
//! A session is keyed by the `mcp-session-id` header. POST answers come back
//! either as a JSON body or as an SSE stream on the same response, depending
//! on what the client accepts. GET opens the standalone push stream that
//! carries responses whose POST went away.

use std::future::ready;
use std::sync::Arc;

use abacus_core::constants::SESSION_ID_HEADER;
use abacus_rpc::{MessageBatch, RpcResponse};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument, warn};

use super::{
    AttachError, CloseOnDrop, Inbound, Outbox, ReplyTo, message_event, require_json_content,
};
use crate::error::ProtocolError;
use crate::multiplexer::Route;
use crate::server::AppState;
use crate::session::{Session, TransportKind};

/// How a POST is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// `application/json` body.
    Json,
    /// `text/event-stream`, one `message` event per response.
    EventStream,
}

impl ResponseMode {
    /// Pick a mode from the `Accept` header. JSON wins when admitted or absent.
    pub fn negotiate(headers: &HeaderMap) -> Result<Self, ProtocolError> {
        let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) else {
            return Ok(Self::Json);
        };
        if accept.trim().is_empty() {
            return Ok(Self::Json);
        }
        let types = media_types(accept);
        if types
            .iter()
            .any(|t| matches!(t.as_str(), "application/json" | "application/*" | "*/*"))
        {
            Ok(Self::Json)
        } else if types.iter().any(|t| t == "text/event-stream" || t == "text/*") {
            Ok(Self::EventStream)
        } else {
            Err(ProtocolError::NotAcceptable(
                "Client must accept application/json or text/event-stream",
            ))
        }
    }
}

fn media_types(accept: &str) -> Vec<String> {
    accept
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(media_types)
        .is_some_and(|types| {
            types
                .iter()
                .any(|t| matches!(t.as_str(), "text/event-stream" | "text/*" | "*/*"))
        })
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// `POST /mcp`
#[instrument(skip_all, fields(session_id))]
pub async fn post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    state.allow_list.check(&headers)?;
    let mode = ResponseMode::negotiate(&headers)?;
    require_json_content(&headers)?;
    let batch = MessageBatch::parse(&body)?;

    let session_id = session_header(&headers);
    if let Some(id) = session_id {
        let _ = tracing::Span::current().record("session_id", id);
    }

    match state.mux.classify(session_id, &batch, &headers)? {
        Route::Initialize => initialize(&state, batch, mode).await,
        Route::Existing(session) => forward(&session, batch, mode).await,
    }
}

async fn initialize(
    state: &AppState,
    batch: MessageBatch,
    mode: ResponseMode,
) -> Result<Response, ProtocolError> {
    let session = state
        .mux
        .create_session(TransportKind::Streamable, Outbox::new())?;
    // a client that disconnects mid-handshake takes the session with it
    let guard = CloseOnDrop::new(Arc::clone(&session));
    let batched = batch.batched;

    let (tx, rx) = mpsc::unbounded_channel();
    if session
        .deliver(Inbound {
            batch,
            reply: ReplyTo::Caller(tx),
        })
        .await
        .is_err()
    {
        return Err(closed(&session));
    }

    let responses = collect(rx).await;
    let handshake_ok = responses
        .first()
        .is_some_and(|r| !r.is_error() && r.result.is_some());
    if !handshake_ok {
        debug!(session_id = %session.id(), "initialization failed; discarding session");
        if responses.is_empty() {
            return Err(closed(&session));
        }
        return Ok(render(responses, batched, mode));
    }

    let header = HeaderValue::from_str(session.id())
        .map_err(|e| ProtocolError::Internal(format!("session id not a header value: {e}")))?;
    if !state.mux.activate(&session) {
        // closed by a concurrent drain between handshake and activation
        return Err(closed(&session));
    }
    guard.disarm();

    let mut response = render(responses, batched, mode);
    let _ = response.headers_mut().insert(SESSION_ID_HEADER, header);
    Ok(response)
}

async fn forward(
    session: &Session,
    batch: MessageBatch,
    mode: ResponseMode,
) -> Result<Response, ProtocolError> {
    if !batch.expects_response() {
        session
            .deliver(Inbound {
                batch,
                reply: ReplyTo::Stream,
            })
            .await
            .map_err(|_| closed(session))?;
        return Ok(StatusCode::ACCEPTED.into_response());
    }

    let batched = batch.batched;
    let (tx, rx) = mpsc::unbounded_channel();
    session
        .deliver(Inbound {
            batch,
            reply: ReplyTo::Caller(tx),
        })
        .await
        .map_err(|_| closed(session))?;

    match mode {
        ResponseMode::Json => {
            let responses = collect(rx).await;
            if responses.is_empty() {
                return Err(closed(session));
            }
            Ok(render(responses, batched, mode))
        }
        ResponseMode::EventStream => {
            let events = UnboundedReceiverStream::new(rx).filter_map(|r| ready(message_event(&r)));
            Ok(Sse::new(events).into_response())
        }
    }
}

/// Drain a reply channel until the worker drops its sender.
async fn collect(mut rx: mpsc::UnboundedReceiver<RpcResponse>) -> Vec<RpcResponse> {
    let mut responses = Vec::new();
    while let Some(response) = rx.recv().await {
        responses.push(response);
    }
    responses
}

fn render(responses: Vec<RpcResponse>, batched: bool, mode: ResponseMode) -> Response {
    match mode {
        ResponseMode::EventStream => {
            let events = responses.iter().filter_map(message_event).collect::<Vec<_>>();
            Sse::new(futures::stream::iter(events)).into_response()
        }
        ResponseMode::Json if batched => Json(responses).into_response(),
        ResponseMode::Json => match responses.into_iter().next() {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

fn closed(session: &Session) -> ProtocolError {
    ProtocolError::SessionClosed {
        session_id: session.id().to_string(),
    }
}

/// `GET /mcp`: standalone server-push stream.
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProtocolError> {
    state.allow_list.check(&headers)?;
    if !accepts_event_stream(&headers) {
        return Err(ProtocolError::NotAcceptable(
            "Client must accept text/event-stream",
        ));
    }

    let Some(session) = session_header(&headers)
        .and_then(|id| state.mux.resolve(TransportKind::Streamable, id))
    else {
        return Err(ProtocolError::BadSession {
            received_headers: headers.keys().map(|k| k.as_str().to_owned()).collect(),
        });
    };

    let (tx, rx) = mpsc::unbounded_channel();
    session.outbox().attach(tx).map_err(|e| match e {
        AttachError::Conflict => {
            warn!(session_id = %session.id(), "second standalone stream refused");
            ProtocolError::StreamConflict
        }
        AttachError::Sealed => closed(&session),
    })?;
    debug!(session_id = %session.id(), "standalone stream attached");

    let events = UnboundedReceiverStream::new(rx).filter_map(|r| ready(message_event(&r)));
    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

/// `DELETE /mcp`: explicit session close.
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ProtocolError> {
    state.allow_list.check(&headers)?;
    let Some(session) = session_header(&headers)
        .and_then(|id| state.mux.resolve(TransportKind::Streamable, id))
    else {
        return Err(ProtocolError::BadSession {
            received_headers: headers.keys().map(|k| k.as_str().to_owned()).collect(),
        });
    };

    let _ = session.close();
    session.wait_closed().await;
    Ok(StatusCode::OK)
}
