//! Proxy listener and request dispatch.
//!
//! A [`ProxyServer`] owns one TCP listener and serves each accepted connection
//! on its own task with hyper's HTTP/1.1 server (upgrades enabled for
//! CONNECT). Every request is dispatched by method:
//!
//! - `CONNECT` → [`handle_connect`]
//! - anything else → [`handle_http`]
//!
//! The first hop wraps dispatch in the [`AuthGate`]; the second hop accepts
//! everyone and chains through its upstream.
//!
//! # Example
//!
//! ```ignore
//! use proxied_proxy::proxy::{Credentials, DomainPolicy, HopMode, ProxyConfig, ProxyServer};
//! use std::sync::Arc;
//!
//! let config = ProxyConfig::new(
//!     "127.0.0.1:8080".parse()?,
//!     HopMode::first_hop(Credentials::new("haha", "hehe")),
//!     Arc::new(DomainPolicy::new("reddit.com")),
//! );
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let server = ProxyServer::bind(config, shutdown_rx).await?;
//! server.run().await?;
//!
//! // To shutdown:
//! shutdown_tx.send(true)?;
//! ```

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::auth::{AuthGate, Credentials};
use super::body::ProxyBody;
use super::chain::UpstreamChain;
use super::connect::handle_connect;
use super::error::ProxyError;
use super::forward::{direct_client, handle_http, DirectClient};
use super::policy::DomainPolicy;
use crate::telemetry::{AuditEvent, AuditLogger, AuthFailureReason};

/// Timeout for dialing targets and the upstream proxy.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Common name on intercepted connections' certificates.
pub const DEFAULT_MITM_COMMON_NAME: &str = "localhost";

/// Role a listener plays in the chain.
#[derive(Debug, Clone)]
pub enum HopMode {
    /// Authenticates clients and talks to targets directly.
    FirstHop {
        /// Gate every request must pass.
        auth: Arc<AuthGate>,
    },
    /// Accepts any client and routes everything through an upstream proxy.
    SecondHop {
        /// Upstream proxy and the credentials injected for it.
        upstream: Arc<UpstreamChain>,
    },
}

impl HopMode {
    /// First hop requiring `credentials`.
    pub fn first_hop(credentials: Credentials) -> Self {
        HopMode::FirstHop {
            auth: Arc::new(AuthGate::new(credentials)),
        }
    }

    /// Second hop chaining through `upstream`.
    pub fn second_hop(upstream: UpstreamChain) -> Self {
        HopMode::SecondHop {
            upstream: Arc::new(upstream),
        }
    }

    /// Short name used in logs and audit events.
    pub fn name(&self) -> &'static str {
        match self {
            HopMode::FirstHop { .. } => "first_hop",
            HopMode::SecondHop { .. } => "second_hop",
        }
    }
}

/// Immutable per-listener configuration, shared by all its connections.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind.
    pub listen_addr: SocketAddr,
    /// First or second hop.
    pub mode: HopMode,
    /// Blocked-domain policy.
    pub policy: Arc<DomainPolicy>,
    /// CN for intercepted connections' certificates.
    pub mitm_common_name: String,
    /// Dial timeout for targets and the upstream.
    pub connect_timeout: Duration,
    /// Audit sink.
    pub audit: Arc<AuditLogger>,
}

impl ProxyConfig {
    /// Configuration with default timeout and CN, and auditing disabled.
    pub fn new(listen_addr: SocketAddr, mode: HopMode, policy: Arc<DomainPolicy>) -> Self {
        Self {
            listen_addr,
            mode,
            policy,
            mitm_common_name: DEFAULT_MITM_COMMON_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            audit: Arc::new(AuditLogger::new_null()),
        }
    }

    /// Set the interception certificate CN.
    pub fn with_mitm_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.mitm_common_name = common_name.into();
        self
    }

    /// Set the dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the audit sink.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }
}

/// A bound proxy listener.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    listener: TcpListener,
    local_addr: SocketAddr,
    client: Arc<DirectClient>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyServer {
    /// Bind the listener.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so callers can
    /// learn the actual port when binding to port 0.
    pub async fn bind(
        config: ProxyConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let client = Arc::new(direct_client(&config));

        Ok(Self {
            config: Arc::new(config),
            listener,
            local_addr,
            client,
            shutdown_rx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The listener's configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Accept connections until the shutdown signal is set.
    ///
    /// Connections already being served keep running after this returns.
    pub async fn run(self) -> Result<(), ProxyError> {
        let hop = self.config.mode.name();
        info!("[{}] Listening on {}", hop, self.local_addr);
        self.config.audit.log(AuditEvent::ProxyStart {
            hop: hop.to_string(),
            listen: self.local_addr.to_string(),
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("[{}] Accepted connection from {}", hop, peer);
                            self.spawn_connection_handler(stream, peer);
                        }
                        Err(e) => {
                            warn!("[{}] Failed to accept connection: {}", hop, e);
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("[{}] Shutting down", hop);
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_connection_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let config = self.config.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let hop = config.mode.name();
            if let Err(e) = handle_connection(stream, peer, config, client).await {
                if e.is_disconnect() {
                    debug!("[{}] Connection from {} ended: {}", hop, peer, e);
                } else {
                    warn!("[{}] Connection error from {}: {}", hop, peer, e);
                }
            }
        });
    }
}

/// Serve one client connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ProxyConfig>,
    client: Arc<DirectClient>,
) -> Result<(), ProxyError> {
    let _ = stream.set_nodelay(true);
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let config = config.clone();
        let client = client.clone();

        async move { Ok::<_, Infallible>(proxy_request(req, peer, config, client).await) }
    });

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

/// Authenticate (first hop only), dispatch, and render any error.
async fn proxy_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    config: Arc<ProxyConfig>,
    client: Arc<DirectClient>,
) -> Response<ProxyBody> {
    let result = match &config.mode {
        HopMode::FirstHop { auth } => {
            auth.guard(req, |req| dispatch(req, config.clone(), &client))
                .await
        }
        HopMode::SecondHop { .. } => dispatch(req, config.clone(), &client).await,
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            if let Some(reason) = auth_failure_reason(&e) {
                debug!("[{}] Rejected {}: {}", config.mode.name(), peer, e);
                config.audit.log(AuditEvent::AuthFailure {
                    hop: config.mode.name().to_string(),
                    peer: peer.to_string(),
                    reason,
                });
            } else if !matches!(e, ProxyError::Blocked { .. }) {
                warn!("[{}] Request from {} failed: {}", config.mode.name(), peer, e);
            }
            e.into_response()
        }
    }
}

async fn dispatch(
    req: Request<Incoming>,
    config: Arc<ProxyConfig>,
    client: &DirectClient,
) -> Result<Response<ProxyBody>, ProxyError> {
    if req.method() == Method::CONNECT {
        handle_connect(req, config).await
    } else {
        handle_http(req, config, client).await
    }
}

fn auth_failure_reason(err: &ProxyError) -> Option<AuthFailureReason> {
    match err {
        ProxyError::AuthRequired => Some(AuthFailureReason::MissingCredentials),
        ProxyError::MalformedAuth(_) => Some(AuthFailureReason::Malformed),
        ProxyError::AuthRejected => Some(AuthFailureReason::Rejected),
        _ => None,
    }
}
