//! proxied-proxy: a chained forward HTTP/HTTPS proxy.
//!
//! Two cooperating listeners:
//!
//! - **First hop**: requires Basic proxy authentication and talks to targets
//!   directly.
//! - **Second hop**: accepts any client and routes everything through an
//!   upstream proxy (normally the first hop), injecting credentials.
//!
//! Both refuse a single configured domain. Plain requests for it get a `400`;
//! CONNECTs to it are answered by terminating TLS locally with a throwaway
//! certificate and writing a JSON `400` inside the encrypted channel.
//!
//! # Modules
//!
//! - **Proxy**: listeners, handlers, interception, relaying
//! - **Config**: hierarchical TOML configuration
//! - **Telemetry**: structured syslog audit trail

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod proxy;
pub mod telemetry;
