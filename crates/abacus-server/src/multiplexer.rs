//! Session multiplexer: routes inbound requests to sessions.
//!
//! The only component that creates sessions or inserts them into a store.
//! Removal is left to each session's supervisor.

use std::sync::Arc;

use abacus_rpc::{Dispatcher, MessageBatch};
use axum::http::HeaderMap;
use metrics::{counter, gauge};
use tracing::{debug, info, instrument};

use crate::error::ProtocolError;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL};
use crate::session::{Session, SessionStores, TransportKind, worker};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::Outbox;

/// Where a Streamable request goes.
#[derive(Debug)]
pub enum Route {
    /// Forward to an active session.
    Existing(Arc<Session>),
    /// Create a session for this initialization request.
    Initialize,
}

/// Owns both session stores and decides which session a request belongs to.
pub struct SessionMultiplexer {
    stores: SessionStores,
    dispatcher: Dispatcher,
    shutdown: Arc<ShutdownCoordinator>,
}

impl SessionMultiplexer {
    /// Multiplexer with empty stores.
    pub fn new(dispatcher: Dispatcher, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            stores: SessionStores::new(),
            dispatcher,
            shutdown,
        }
    }

    /// Both session stores.
    pub fn stores(&self) -> &SessionStores {
        &self.stores
    }

    /// Shared dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Look up an `Active` session. Sessions in any other state do not resolve.
    pub fn resolve(&self, kind: TransportKind, id: &str) -> Option<Arc<Session>> {
        self.stores
            .for_kind(kind)
            .get(id)
            .filter(|session| session.is_active())
    }

    /// Classify a Streamable request by its session header and body.
    ///
    /// Never mutates a store.
    pub fn classify(
        &self,
        session_id: Option<&str>,
        batch: &MessageBatch,
        headers: &HeaderMap,
    ) -> Result<Route, ProtocolError> {
        if let Some(id) = session_id {
            return match self.resolve(TransportKind::Streamable, id) {
                Some(_) if batch.is_initialize() => Err(ProtocolError::AlreadyInitialized),
                Some(session) => Ok(Route::Existing(session)),
                None => {
                    debug!(session_id = id, "session header does not resolve");
                    Err(bad_session(headers))
                }
            };
        }

        if !batch.is_initialize() {
            return Err(bad_session(headers));
        }
        if batch.messages.len() > 1 {
            return Err(ProtocolError::MultipleInitialize);
        }
        if !self.shutdown.is_accepting() {
            return Err(ProtocolError::Draining);
        }
        Ok(Route::Initialize)
    }

    /// Create a session in `Initializing`, register it and start its worker.
    #[instrument(skip_all, fields(kind = %kind))]
    pub fn create_session(
        &self,
        kind: TransportKind,
        outbox: Outbox,
    ) -> Result<Arc<Session>, ProtocolError> {
        if !self.shutdown.is_accepting() {
            return Err(ProtocolError::Draining);
        }

        let (session, inbox) = Session::new(kind, outbox);
        let store = self.stores.for_kind(kind);
        if !store.insert(Arc::clone(&session)) {
            return Err(ProtocolError::Internal(format!(
                "session id collision: {}",
                session.id()
            )));
        }
        counter!(SESSIONS_CREATED_TOTAL, "kind" => kind.as_str()).increment(1);

        let _ = worker::spawn(
            Arc::clone(&session),
            inbox,
            self.dispatcher.clone(),
            store.clone(),
            self.shutdown.requested(),
        );

        // a drain that snapshotted before the insert would miss this session
        if !self.shutdown.is_accepting() {
            let _ = session.close();
            return Err(ProtocolError::Draining);
        }

        info!(session_id = %session.id(), "session created");
        Ok(session)
    }

    /// Confirm the handshake: `Initializing → Active`.
    pub fn activate(&self, session: &Session) -> bool {
        let activated = session.activate();
        if activated {
            gauge!(SESSIONS_ACTIVE, "kind" => session.kind().as_str()).increment(1.0);
            info!(session_id = %session.id(), kind = %session.kind(), "session active");
        }
        activated
    }
}

fn bad_session(headers: &HeaderMap) -> ProtocolError {
    ProtocolError::BadSession {
        received_headers: headers.keys().map(|k| k.as_str().to_owned()).collect(),
    }
}
