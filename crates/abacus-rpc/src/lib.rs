//! # abacus-rpc
//!
//! JSON-RPC 2.0 protocol layer for the calculator service.
//!
//! - **Wire types**: [`types`] parses single messages and batches into
//!   requests, notifications and client responses
//! - **Errors**: [`errors::RpcError`] maps onto the standard JSON-RPC codes
//! - **Registry**: [`registry::MethodRegistry`] routes a method name to its
//!   [`registry::MethodHandler`]
//! - **Operations**: [`operations::OperationRegistry`] holds the six
//!   arithmetic operations and their argument validation
//! - **Dispatch**: [`dispatch::Dispatcher`] answers a whole batch, in order
//!
//! Transports never look inside handlers; they hand a parsed batch to the
//! dispatcher and relay whatever comes back.

#![deny(unsafe_code)]

pub mod context;
pub mod dispatch;
pub mod errors;
pub mod handlers;
pub mod operations;
pub mod registry;
pub mod types;

pub use context::RpcContext;
pub use dispatch::Dispatcher;
pub use errors::RpcError;
pub use operations::OperationRegistry;
pub use types::{IncomingMessage, MessageBatch, RequestId, RpcErrorBody, RpcRequest, RpcResponse};
