//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{Result, ServerError};

pub use abacus_core::constants::{
    PROTOCOL_ERRORS_TOTAL, SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL, SESSIONS_CREATED_TOTAL,
};

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before anything is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{counter, gauge};

    #[test]
    fn local_recorder_renders_session_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            counter!(SESSIONS_CREATED_TOTAL, "kind" => "streamable").increment(2);
            gauge!(SESSIONS_ACTIVE, "kind" => "sse").set(1.0);
        });

        let output = render(&handle);
        assert!(output.contains("sessions_created_total{kind=\"streamable\"} 2"));
        assert!(output.contains("sessions_active{kind=\"sse\"} 1"));
    }

    #[tokio::test]
    async fn dispatcher_metrics_share_names_with_the_exporter() {
        use abacus_core::constants::{OPERATIONS_TOTAL, RPC_ERRORS_TOTAL, RPC_REQUESTS_TOTAL};
        use abacus_rpc::{Dispatcher, MessageBatch};

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let batch = MessageBatch::parse(
            br#"[{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2}}},
                {"jsonrpc":"2.0","id":2,"method":"nope"}]"#,
        )
        .unwrap();
        let responses = Dispatcher::default().handle_batch(batch).await;
        assert_eq!(responses.len(), 2);

        let output = render(&handle);
        assert!(output.contains(RPC_REQUESTS_TOTAL));
        assert!(output.contains(RPC_ERRORS_TOTAL));
        assert!(output.contains(OPERATIONS_TOTAL));
    }
}
