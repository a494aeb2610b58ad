//! Per-session worker and supervisor tasks.
//!
//! The worker drains the session's inbound queue one batch at a time, so
//! responses on a session keep request order. The supervisor awaits the
//! worker, then removes the session from its store and publishes `Closed`.
//! A panicking worker is reported as a fault so the shutdown coordinator
//! drains every session instead of the process crashing.

use std::sync::Arc;

use abacus_rpc::{Dispatcher, RpcResponse};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use super::{Session, SessionStore};
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL};
use crate::transport::{Inbound, Outbox, ReplyTo};

/// Spawn the worker and its supervisor. Returns the supervisor handle.
pub(crate) fn spawn(
    session: Arc<Session>,
    inbox: mpsc::Receiver<Inbound>,
    dispatcher: Dispatcher,
    store: SessionStore,
    faults: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("session", session_id = %session.id(), kind = %session.kind());

    let worker = tokio::spawn(
        run(
            inbox,
            dispatcher,
            Arc::clone(session.outbox()),
            session.closing(),
        )
        .instrument(span.clone()),
    );

    tokio::spawn(supervise(session, worker, store, faults).instrument(span))
}

async fn run(
    mut inbox: mpsc::Receiver<Inbound>,
    dispatcher: Dispatcher,
    outbox: Arc<Outbox>,
    closing: CancellationToken,
) {
    loop {
        let inbound = tokio::select! {
            biased;
            () = closing.cancelled() => break,
            next = inbox.recv() => match next {
                Some(inbound) => inbound,
                None => break,
            },
        };

        tokio::select! {
            biased;
            () = closing.cancelled() => {
                debug!("batch abandoned: session closing");
                break;
            }
            () = process(inbound, &dispatcher, &outbox) => {}
        }
    }
}

async fn process(inbound: Inbound, dispatcher: &Dispatcher, outbox: &Outbox) {
    let Inbound { batch, reply } = inbound;
    for message in batch.messages {
        if let Some(response) = dispatcher.handle_message(message).await {
            route(response, &reply, outbox);
        }
    }
    // dropping `reply` here ends the caller's response stream
}

fn route(response: RpcResponse, reply: &ReplyTo, outbox: &Outbox) {
    let id = response.id.clone();
    let delivered = match reply {
        ReplyTo::Caller(tx) => outbox.reply(tx, response),
        ReplyTo::Stream => outbox.emit(response),
    };
    if !delivered {
        debug!(?id, "response dropped: session closing or no open stream");
    }
}

async fn supervise(
    session: Arc<Session>,
    worker: JoinHandle<()>,
    store: SessionStore,
    faults: CancellationToken,
) {
    if let Err(e) = worker.await {
        if e.is_panic() {
            error!(error = %e, "session worker panicked; requesting drain");
            faults.cancel();
        }
    }

    let _ = session.close();
    let _ = store.remove(session.id());

    let kind = session.kind().as_str();
    counter!(SESSIONS_CLOSED_TOTAL, "kind" => kind).increment(1);
    if session.was_activated() {
        gauge!(SESSIONS_ACTIVE, "kind" => kind).decrement(1.0);
    }
    session.mark_closed();
    info!(age_ms = session.age().as_millis(), "session closed");
}
