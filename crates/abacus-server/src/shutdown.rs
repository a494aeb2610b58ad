//! Graceful shutdown coordination.
//!
//! `Running → Draining → Terminated`. Entering `Draining` stops new sessions
//! from being created; the drain then closes every live session and waits for
//! them up to the grace period. This is the only place that exits the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::session::{Session, SessionState, SessionStores};

/// Default grace period for closing sessions.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Shutdown phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Accepting new sessions.
    Running,
    /// Closing sessions; no new ones.
    Draining,
    /// Drain finished or abandoned.
    Terminated,
}

/// Outcome of a drain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Sessions that reached `Closed` within the grace period.
    pub closed: usize,
    /// Sessions still open when the grace period ran out.
    pub abandoned: usize,
}

impl DrainReport {
    /// `0` for a clean drain, `1` when closes were abandoned.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.abandoned > 0)
    }
}

/// Coordinates graceful shutdown across every session.
pub struct ShutdownCoordinator {
    phase: watch::Sender<ShutdownPhase>,
    requested: CancellationToken,
    grace: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator in `Running` with the given grace period.
    pub fn new(grace: Duration) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            phase,
            requested: CancellationToken::new(),
            grace,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Whether new sessions may be created.
    pub fn is_accepting(&self) -> bool {
        self.phase() == ShutdownPhase::Running
    }

    /// Grace period allowed for closes.
    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Ask the owner of the process to drain (signals, worker faults).
    pub fn request(&self, reason: &str) {
        if !self.requested.is_cancelled() {
            info!(reason, "shutdown requested");
        }
        self.requested.cancel();
    }

    /// Token cancelled once a drain has been requested.
    pub fn requested(&self) -> CancellationToken {
        self.requested.clone()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// `Running → Draining`. Returns `false` if already past `Running`.
    pub fn begin_drain(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == ShutdownPhase::Running {
                *phase = ShutdownPhase::Draining;
                true
            } else {
                false
            }
        })
    }

    /// Close every session in `stores` and wait for them, bounded by the
    /// grace period. Ends in `Terminated` either way.
    ///
    /// Re-sweeps until both stores are empty, so a session created
    /// concurrently with the phase change is still closed.
    pub async fn drain(&self, stores: &SessionStores) -> DrainReport {
        if self.begin_drain() {
            info!(
                sessions = stores.total(),
                grace_ms = self.grace.as_millis(),
                "draining sessions"
            );
        }

        let deadline = Instant::now() + self.grace;
        let mut report = DrainReport::default();

        loop {
            let sessions = stores.snapshot_all();
            if sessions.is_empty() {
                break;
            }
            for session in &sessions {
                let _ = session.close();
            }

            let waits = sessions.iter().map(|s| s.wait_closed());
            if tokio::time::timeout_at(deadline, futures::future::join_all(waits))
                .await
                .is_err()
            {
                let open = still_open(&sessions);
                report.closed += sessions.len() - open;
                report.abandoned += open;
                warn!(
                    abandoned = open,
                    "grace period elapsed; abandoning open sessions"
                );
                break;
            }
            report.closed += sessions.len();
        }

        let _ = self.phase.send_replace(ShutdownPhase::Terminated);
        info!(
            closed = report.closed,
            abandoned = report.abandoned,
            "drain complete"
        );
        report
    }

    /// Resolve once the phase reaches `Terminated`.
    pub async fn terminated(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|p| *p == ShutdownPhase::Terminated).await;
    }

    /// Exit the process with the report's exit code.
    pub fn exit(&self, report: DrainReport) -> ! {
        info!(code = report.exit_code(), "exiting");
        std::process::exit(report.exit_code())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD)
    }
}

fn still_open(sessions: &[Arc<Session>]) -> usize {
    sessions
        .iter()
        .filter(|s| s.state() != SessionState::Closed)
        .count()
}
