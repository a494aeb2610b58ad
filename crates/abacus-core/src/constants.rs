//! Wire-level constants shared by the transports and the RPC layer.

/// Header carrying the Streamable session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Query parameter carrying the Legacy session identifier.
pub const SESSION_ID_QUERY: &str = "sessionId";

/// Path the Legacy event stream advertises for posting messages.
pub const LEGACY_MESSAGES_PATH: &str = "/messages";

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol versions accepted during `initialize`, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Latest protocol version, offered when the client asks for an unknown one.
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "advanced-calculator-server";

/// Version reported in `serverInfo` and the health resource.
pub const SERVER_VERSION: &str = "1.0.0";

// ── Metric names ────────────────────────────────────────────────────

/// Sessions created (counter, labels: kind).
pub const SESSIONS_CREATED_TOTAL: &str = "sessions_created_total";
/// Sessions closed (counter, labels: kind).
pub const SESSIONS_CLOSED_TOTAL: &str = "sessions_closed_total";
/// Sessions past the handshake and not yet closing (gauge, labels: kind).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Requests refused before dispatch (counter, labels: status).
pub const PROTOCOL_ERRORS_TOTAL: &str = "protocol_errors_total";
/// RPC requests (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors (counter, labels: method, code).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// Handler latency (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
/// Operation invocations (counter, labels: operation, outcome).
pub const OPERATIONS_TOTAL: &str = "operations_total";
