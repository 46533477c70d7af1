//! Audit event types for structured logging.
//!
//! These events are logged to syslog with the `PROXIED_PROXY` tag so policy
//! decisions and authentication failures leave an audit trail.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Audit events for security logging.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A listener started accepting connections.
    ProxyStart {
        /// Which hop the listener serves.
        hop: String,
        /// Bound address.
        listen: String,
    },

    /// A request failed proxy authentication.
    AuthFailure {
        /// Which hop rejected the request.
        hop: String,
        /// Client address.
        peer: String,
        /// Why authentication failed.
        reason: AuthFailureReason,
    },

    /// A request was allowed through.
    RequestAllow {
        /// Which hop handled the request.
        hop: String,
        /// HTTP method (`CONNECT` for tunnels).
        method: String,
        /// Request target (URL or host:port).
        target: String,
    },

    /// A request matched the domain policy.
    RequestBlock {
        /// Which hop handled the request.
        hop: String,
        /// HTTP method.
        method: String,
        /// Request target.
        target: String,
    },

    /// A CONNECT to the blocked domain was answered by TLS interception.
    Intercept {
        /// Which hop intercepted.
        hop: String,
        /// The CONNECT target.
        target: String,
        /// Common name of the presented certificate.
        common_name: String,
    },

    /// A relayed tunnel finished.
    TunnelClosed {
        /// Which hop relayed the tunnel.
        hop: String,
        /// The CONNECT target.
        target: String,
        /// Bytes sent by the client.
        bytes_up: u64,
        /// Bytes sent to the client.
        bytes_down: u64,
    },
}

/// Reasons a request failed proxy authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    /// No `Proxy-Authorization` header.
    MissingCredentials,
    /// Header present but not `Basic <base64>`.
    Malformed,
    /// Credentials did not match.
    Rejected,
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}
