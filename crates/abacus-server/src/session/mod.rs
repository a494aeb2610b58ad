//! Session state and lifecycle.
//!
//! A [`Session`] is one logical client connection. It owns its transport
//! channel: the sending half of the worker's inbound queue and the
//! [`Outbox`] for pushed responses. Its state lives in a `watch` channel so
//! the shutdown sweep can await the `Closed` transition without polling.
//!
//! ```text
//! Initializing ──activate──▶ Active ──close──▶ Closing ──supervisor──▶ Closed
//!       └────────────────────close────────────────▲
//! ```

pub mod store;
pub(crate) mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use abacus_core::SessionId;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::transport::{Inbound, Outbox};

pub use store::{SessionStore, SessionStores};

/// Depth of a session's inbound queue.
const INBOX_CAPACITY: usize = 64;

/// Which wire format a session speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Bidirectional streaming transport keyed by the `mcp-session-id` header.
    Streamable,
    /// Event stream plus out-of-band message posts.
    Legacy,
}

impl TransportKind {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streamable => "streamable",
            Self::Legacy => "sse",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, handshake not yet confirmed.
    Initializing,
    /// Accepting requests.
    Active,
    /// Close requested; worker winding down.
    Closing,
    /// Removed from its store; resources released.
    Closed,
}

/// One logical client connection.
pub struct Session {
    id: SessionId,
    kind: TransportKind,
    state: watch::Sender<SessionState>,
    inbox: mpsc::Sender<Inbound>,
    outbox: Arc<Outbox>,
    cancel: CancellationToken,
    activated: AtomicBool,
    created_at: Instant,
}

impl Session {
    /// New session in `Initializing` plus the receiving end of its inbound queue.
    pub(crate) fn new(kind: TransportKind, outbox: Outbox) -> (Arc<Self>, mpsc::Receiver<Inbound>) {
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        let (state, _) = watch::channel(SessionState::Initializing);
        let session = Arc::new(Self {
            id: SessionId::new(),
            kind,
            state,
            inbox,
            outbox: Arc::new(outbox),
            cancel: CancellationToken::new(),
            activated: AtomicBool::new(false),
            created_at: Instant::now(),
        });
        (session, rx)
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Transport kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session resolves for new requests.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Outbound half of the session channel.
    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Token cancelled when the session starts closing.
    pub fn closing(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `Initializing → Active`. Returns `false` if the session already moved on.
    pub(crate) fn activate(&self) -> bool {
        let activated = self.state.send_if_modified(|state| {
            if *state == SessionState::Initializing {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        });
        if activated {
            self.activated.store(true, Ordering::Release);
        }
        activated
    }

    /// Whether the session ever reached `Active`.
    pub(crate) fn was_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Begin closing. Idempotent: only the first call has any effect.
    ///
    /// The outbox is sealed while the state lock is held, so no write
    /// succeeds once the `Closing` transition is visible.
    pub fn close(&self) -> bool {
        let outbox = &self.outbox;
        let first = self.state.send_if_modified(|state| match state {
            SessionState::Initializing | SessionState::Active => {
                *state = SessionState::Closing;
                outbox.seal();
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        });
        if first {
            self.cancel.cancel();
            info!(session_id = %self.id, kind = %self.kind, "session closing");
        }
        first
    }

    /// Publish `Closed`. Called once, by the supervisor, after store removal.
    pub(crate) fn mark_closed(&self) {
        let _ = self.state.send_replace(SessionState::Closed);
    }

    /// Resolve once the session reaches `Closed`.
    pub async fn wait_closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Queue a batch for the worker.
    ///
    /// Accepted while `Initializing` (the handshake itself) or `Active`.
    pub async fn deliver(&self, inbound: Inbound) -> Result<(), SessionClosed> {
        if !matches!(
            self.state(),
            SessionState::Initializing | SessionState::Active
        ) {
            return Err(SessionClosed);
        }
        self.inbox.send(inbound).await.map_err(|_| SessionClosed)
    }

    /// Time since creation.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// The session stopped accepting requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("session closed")]
pub struct SessionClosed;
