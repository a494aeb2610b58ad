//! # abacus-server
//!
//! Axum HTTP server multiplexing MCP sessions over two transports.
//!
//! - Streamable transport on `/mcp`, keyed by the `mcp-session-id` header
//! - Legacy event-stream transport on `/sse` plus `/messages`
//! - Session stores, one per transport kind, with a worker task per session
//! - Graceful drain of every session on shutdown, bounded by a grace period

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod multiplexer;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use config::ServerConfig;
pub use error::{ProtocolError, Result, ServerError};
pub use multiplexer::SessionMultiplexer;
pub use server::{AppState, ServerHandle, build_router, start};
pub use session::{Session, SessionState, SessionStores, TransportKind};
pub use shutdown::{DrainReport, ShutdownCoordinator, ShutdownPhase};
