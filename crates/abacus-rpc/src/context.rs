//! RPC dependency-injection context.

use std::sync::Arc;
use std::time::Instant;

use crate::operations::OperationRegistry;

/// Shared context passed to every RPC handler.
#[derive(Clone)]
pub struct RpcContext {
    /// Operations exposed through `tools/*`.
    pub operations: Arc<OperationRegistry>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Context over `operations`, starting the uptime clock now.
    pub fn new(operations: Arc<OperationRegistry>) -> Self {
        Self {
            operations,
            server_start_time: Instant::now(),
        }
    }

    /// Seconds since the server started.
    pub fn uptime_secs(&self) -> f64 {
        self.server_start_time.elapsed().as_secs_f64()
    }
}

impl Default for RpcContext {
    fn default() -> Self {
        Self::new(Arc::new(OperationRegistry::with_defaults()))
    }
}
