//! `/health` endpoint.

use std::time::Instant;

use abacus_core::constants::SERVER_VERSION;
use abacus_settings::Environment;
use serde::Serialize;

use crate::session::{SessionState, SessionStores};

/// `Active` session counts per transport kind.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct ActiveSessions {
    /// Streamable sessions.
    pub streamable: usize,
    /// Legacy event-stream sessions.
    pub sse: usize,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"healthy"` while the server answers.
    pub status: &'static str,
    /// Time of the check.
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime: f64,
    /// Sessions per transport kind.
    pub active_sessions: ActiveSessions,
    /// Deployment environment.
    pub environment: &'static str,
    /// Server version.
    pub version: &'static str,
    /// Declared operation names.
    pub operations: Vec<&'static str>,
    /// Process id.
    pub pid: u32,
}

/// Build a health response from the live stores.
pub fn health_check(
    start_time: Instant,
    stores: &SessionStores,
    environment: Environment,
    operations: Vec<&'static str>,
) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        timestamp: abacus_core::timestamp(),
        uptime: start_time.elapsed().as_secs_f64(),
        active_sessions: ActiveSessions {
            streamable: stores.streamable.count_in(SessionState::Active),
            sse: stores.legacy.count_in(SessionState::Active),
        },
        environment: environment.as_str(),
        version: SERVER_VERSION,
        operations,
        pid: std::process::id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_stores_report_zero() {
        let resp = health_check(Instant::now(), &SessionStores::new(), Environment::Test, vec![]);
        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.active_sessions, ActiveSessions { streamable: 0, sse: 0 });
        assert!(resp.uptime < 2.0);
    }

    #[test]
    fn only_active_sessions_are_counted() {
        use crate::session::{Session, TransportKind};
        use crate::transport::Outbox;

        let stores = SessionStores::new();
        let (pending, _pending_rx) = Session::new(TransportKind::Streamable, Outbox::new());
        let (live, _live_rx) = Session::new(TransportKind::Legacy, Outbox::new());
        assert!(live.activate());
        assert!(stores.streamable.insert(pending));
        assert!(stores.legacy.insert(live));

        let resp = health_check(Instant::now(), &stores, Environment::Test, vec![]);
        assert_eq!(resp.active_sessions, ActiveSessions { streamable: 0, sse: 1 });
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, &SessionStores::new(), Environment::Test, vec![]);
        assert!(resp.uptime >= 59.0);
    }

    #[test]
    fn serializes_camel_case() {
        let resp = health_check(
            Instant::now(),
            &SessionStores::new(),
            Environment::Production,
            vec!["add", "sqrt"],
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["activeSessions"]["streamable"], 0);
        assert_eq!(json["activeSessions"]["sse"], 0);
        assert_eq!(json["environment"], "production");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["operations"][1], "sqrt");
        assert!(json["pid"].is_number());
        assert!(json["timestamp"].is_string());
    }
}
