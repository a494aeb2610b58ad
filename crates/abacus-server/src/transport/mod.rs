//! Transport adapters and the per-session channel contract.
//!
//! Both wire formats reduce to the same two operations: deliver an
//! [`Inbound`] batch to a session's worker, and emit responses through the
//! session's [`Outbox`]. A response either goes back to the caller that
//! sent the request ([`ReplyTo::Caller`]) or is pushed on the session's
//! long-lived event stream ([`ReplyTo::Stream`]). A caller that went away
//! does not lose its answer: the worker falls back to the outbox.

pub mod allow_list;
pub mod legacy;
pub mod streamable;

use std::convert::Infallible;
use std::sync::Arc;

use abacus_rpc::{MessageBatch, RpcResponse};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::sse::Event;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::session::Session;

/// One decoded request body on its way to a session worker.
#[derive(Debug)]
pub struct Inbound {
    /// Messages in arrival order.
    pub batch: MessageBatch,
    /// Where the responses go.
    pub reply: ReplyTo,
}

/// Destination for the responses to one [`Inbound`].
#[derive(Debug)]
pub enum ReplyTo {
    /// The HTTP request that carried the batch; dropped after the last response.
    Caller(mpsc::UnboundedSender<RpcResponse>),
    /// The session's event stream.
    Stream,
}

/// Why a sink could not be attached to an [`Outbox`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    /// The session is closing; nothing will be emitted again.
    #[error("outbox sealed")]
    Sealed,
    /// Another live stream already owns the outbox.
    #[error("stream already attached")]
    Conflict,
}

#[derive(Debug, Default)]
struct OutboxInner {
    sink: Option<mpsc::UnboundedSender<RpcResponse>>,
    sealed: bool,
}

/// Outbound half of a session channel.
///
/// Sealing and emitting take the same lock, so once [`Outbox::seal`]
/// returns no emit can succeed.
#[derive(Debug, Default)]
pub struct Outbox {
    inner: Mutex<OutboxInner>,
}

impl Outbox {
    /// Outbox with no stream attached yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbox bound to `sink` from the start (legacy sessions).
    pub fn with_sink(sink: mpsc::UnboundedSender<RpcResponse>) -> Self {
        Self {
            inner: Mutex::new(OutboxInner {
                sink: Some(sink),
                sealed: false,
            }),
        }
    }

    /// Attach a standalone stream. A previous sink whose receiver is gone is replaced.
    pub fn attach(&self, sink: mpsc::UnboundedSender<RpcResponse>) -> Result<(), AttachError> {
        let mut inner = self.inner.lock();
        if inner.sealed {
            return Err(AttachError::Sealed);
        }
        if inner.sink.as_ref().is_some_and(|s| !s.is_closed()) {
            return Err(AttachError::Conflict);
        }
        inner.sink = Some(sink);
        Ok(())
    }

    /// Push a response on the stream. Returns `false` if it was not delivered.
    pub fn emit(&self, response: RpcResponse) -> bool {
        let inner = self.inner.lock();
        if inner.sealed {
            return false;
        }
        inner
            .sink
            .as_ref()
            .is_some_and(|sink| sink.send(response).is_ok())
    }

    /// Answer on the caller's channel, or push on the stream if the caller
    /// went away. Returns `false` if the response was not delivered.
    ///
    /// Checked under the seal lock: once the session starts closing, no
    /// reply reaches either channel.
    pub fn reply(&self, caller: &mpsc::UnboundedSender<RpcResponse>, response: RpcResponse) -> bool {
        let inner = self.inner.lock();
        if inner.sealed {
            return false;
        }
        match caller.send(response) {
            Ok(()) => true,
            Err(mpsc::error::SendError(response)) => inner
                .sink
                .as_ref()
                .is_some_and(|sink| sink.send(response).is_ok()),
        }
    }

    /// Refuse all further emits and end the attached stream.
    pub fn seal(&self) {
        let mut inner = self.inner.lock();
        inner.sealed = true;
        inner.sink = None;
    }

    /// Whether [`Outbox::seal`] has run.
    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }
}

/// Closes its session when dropped, unless disarmed.
///
/// Held by whatever owns the client connection: the legacy event stream for
/// its whole life, the streamable handshake until activation.
pub(crate) struct CloseOnDrop {
    session: Option<Arc<Session>>,
}

impl CloseOnDrop {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Keep the session open past the guard.
    pub(crate) fn disarm(mut self) {
        self.session = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.close() {
                debug!(session_id = %session.id(), "connection dropped");
            }
        }
    }
}

/// Render a response as an SSE `message` event.
pub(crate) fn message_event(response: &RpcResponse) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(response) {
        Ok(json) => Some(Ok(Event::default().event("message").data(json))),
        Err(e) => {
            warn!(error = %e, "failed to encode response event");
            None
        }
    }
}

/// Require a JSON `Content-Type` on posted bodies.
pub(crate) fn require_json_content(headers: &HeaderMap) -> Result<(), ProtocolError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| v == "application/json" || v == "application/json-rpc");
    if is_json {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedMediaType)
    }
}
