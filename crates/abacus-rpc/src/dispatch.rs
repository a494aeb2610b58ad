//! Batch dispatch: turn a [`MessageBatch`] into its responses.

use std::sync::Arc;

use tracing::debug;

use crate::context::RpcContext;
use crate::errors::RpcError;
use crate::handlers;
use crate::registry::MethodRegistry;
use crate::types::{IncomingMessage, MessageBatch, RpcResponse};

/// Method registry bound to its context.
///
/// Cheap to clone; every session shares one dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    ctx: RpcContext,
}

impl Dispatcher {
    /// Dispatcher with every MCP handler registered.
    pub fn new(ctx: RpcContext) -> Self {
        let mut registry = MethodRegistry::new();
        handlers::register_all(&mut registry);
        Self::with_registry(registry, ctx)
    }

    /// Dispatcher over a custom registry.
    pub fn with_registry(registry: MethodRegistry, ctx: RpcContext) -> Self {
        Self {
            registry: Arc::new(registry),
            ctx,
        }
    }

    /// Shared handler context.
    pub fn context(&self) -> &RpcContext {
        &self.ctx
    }

    /// Handle one message. `None` for notifications and client responses.
    pub async fn handle_message(&self, message: IncomingMessage) -> Option<RpcResponse> {
        match message {
            IncomingMessage::Request(request) => {
                Some(self.registry.dispatch(request, &self.ctx).await)
            }
            IncomingMessage::Notification(notification) => {
                if self.registry.has_method(&notification.method) {
                    let _ = self.registry.dispatch(notification, &self.ctx).await;
                } else {
                    debug!(method = %notification.method, "ignoring unknown notification");
                }
                None
            }
            IncomingMessage::Response(_) => {
                debug!("ignoring client response");
                None
            }
            IncomingMessage::Invalid { id, reason } => Some(RpcResponse::from_error(
                id,
                &RpcError::InvalidRequest { message: reason },
            )),
        }
    }

    /// Handle a batch sequentially; responses come back in request order.
    pub async fn handle_batch(&self, batch: MessageBatch) -> Vec<RpcResponse> {
        let mut responses = Vec::with_capacity(batch.messages.len());
        for message in batch.messages {
            if let Some(response) = self.handle_message(message).await {
                responses.push(response);
            }
        }
        responses
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RpcContext::default())
    }
}
