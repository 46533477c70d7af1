//! Audit telemetry for proxied-proxy.
//!
//! Security-relevant events (policy decisions, authentication failures,
//! interceptions) are serialized as JSON and written to syslog.
//!
//! - **Audit logging** (syslog): one JSON line per [`AuditEvent`]
//! - **Debug logging** (tracing): development logs to stderr via `tracing`
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"request_block","hop":"first_hop","method":"CONNECT","target":"reddit.com:443"}
//! ```

mod error;
mod events;
mod sink;

pub use error::TelemetryError;
pub use events::{AuditEvent, AuthFailureReason};
pub use sink::{AuditLogger, SYSLOG_TAG};
