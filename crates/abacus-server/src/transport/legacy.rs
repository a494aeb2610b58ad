//! Legacy transport: `GET /sse` event stream plus `POST /messages`.
//!
//! Opening the stream creates and activates the session; there is no
//! handshake request. The first event names the endpoint to post to, and
//! every response for the session is pushed on the stream. Dropping the
//! stream closes the session.

use std::convert::Infallible;
use std::future::ready;
use std::pin::Pin;
use std::task::{Context, Poll};

use abacus_core::constants::{LEGACY_MESSAGES_PATH, SESSION_ID_QUERY};
use abacus_rpc::MessageBatch;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument};

use super::{CloseOnDrop, Inbound, Outbox, ReplyTo, message_event, require_json_content};
use crate::error::ProtocolError;
use crate::server::AppState;
use crate::session::{Session, TransportKind};

/// `GET /sse`
#[instrument(skip_all)]
pub async fn open(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProtocolError> {
    state.allow_list.check(&headers)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let session = state
        .mux
        .create_session(TransportKind::Legacy, Outbox::with_sink(tx))?;
    let _ = state.mux.activate(&session);

    let endpoint = endpoint_url(&session);
    debug!(session_id = %session.id(), endpoint = %endpoint, "legacy stream opened");

    let first = stream::once(ready(Ok(Event::default().event("endpoint").data(endpoint))));
    let messages = UnboundedReceiverStream::new(rx).filter_map(|r| ready(message_event(&r)));
    let events = ClosingStream {
        inner: first.chain(messages).boxed(),
        _guard: CloseOnDrop::new(session),
    };

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn endpoint_url(session: &Session) -> String {
    format!("{LEGACY_MESSAGES_PATH}?{SESSION_ID_QUERY}={}", session.id())
}

struct ClosingStream {
    inner: BoxStream<'static, Result<Event, Infallible>>,
    _guard: CloseOnDrop,
}

impl Stream for ClosingStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Query string of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Session the body belongs to.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `POST /messages?sessionId=`
#[instrument(skip_all)]
pub async fn post(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    state.allow_list.check(&headers)?;

    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return Err(ProtocolError::MissingSessionId);
    };
    let Some(session) = state.mux.resolve(TransportKind::Legacy, &session_id) else {
        return Err(ProtocolError::UnknownSession { session_id });
    };

    require_json_content(&headers)?;
    let batch = MessageBatch::parse(&body)?;

    session
        .deliver(Inbound {
            batch,
            reply: ReplyTo::Stream,
        })
        .await
        .map_err(|_| ProtocolError::SessionClosed { session_id })?;

    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}
