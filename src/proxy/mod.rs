//! Forward proxy with authentication, domain blocking, interception and
//! chaining.
//!
//! # Architecture
//!
//! ```text
//!  client ──► second hop (:5555) ──CONNECT + Proxy-Authorization──► first hop (:8080) ──► target
//!                 │                                                     │
//!                 └─ blocked domain: local TLS, 400 JSON                └─ auth gate, then
//!                                                                          blocked domain: local TLS, 400 JSON
//! ```
//!
//! Leaf utilities ([`policy`], [`cert`], [`relay`], [`takeover`]) are shared by
//! the request handlers in [`connect`] and [`forward`]; [`server`] owns the
//! listeners and dispatches by method.

pub mod auth;
pub mod body;
pub mod cert;
pub mod chain;
pub mod connect;
pub mod error;
pub mod forward;
pub mod intercept;
pub mod policy;
pub mod relay;
pub mod server;
pub mod takeover;
pub mod tls;

pub use auth::{AuthGate, Credentials};
pub use cert::{CertError, EphemeralCertificate};
pub use chain::UpstreamChain;
pub use error::{ProxyError, ProxyResult, PROXY_AUTH_CHALLENGE};
pub use policy::{DomainPolicy, PolicyDecision};
pub use relay::{relay, RelayStats};
pub use server::{
    HopMode, ProxyConfig, ProxyServer, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MITM_COMMON_NAME,
};
