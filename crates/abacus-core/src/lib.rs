//! # abacus-core
//!
//! Foundation types shared by every Abacus crate:
//!
//! - **Branded IDs**: [`SessionId`] and [`CorrelationId`] as newtypes over `String`
//! - **Wire constants**: header names, supported protocol versions, server identity
//! - **Timestamps**: RFC 3339 UTC helper used by every result and error payload
//! - **Logging**: [`logging::init_subscriber`] for the global `tracing` subscriber

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod logging;

pub use ids::{CorrelationId, SessionId};

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
