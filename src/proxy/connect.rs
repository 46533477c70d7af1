//! HTTP CONNECT handling.
//!
//! The flow for `CONNECT host:port HTTP/1.1`:
//!
//! 1. Evaluate the domain policy against `host:port`
//! 2. Blocked: answer 200 and terminate TLS locally (see [`super::intercept`])
//! 3. First hop: dial the target, answer 200, relay bytes both ways
//! 4. Second hop: open a tunnel through the upstream proxy, answer 200, relay
//!
//! Dial and upstream failures are reported as HTTP errors because they happen
//! before the 200 is sent. Anything after the takeover is only logged.

use hyper::body::Incoming;
use hyper::http::uri::Authority;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::body::{empty_body, ProxyBody};
use super::error::ProxyError;
use super::intercept::intercept;
use super::policy::PolicyDecision;
use super::relay::relay;
use super::server::{HopMode, ProxyConfig};
use super::takeover::ClientTakeover;
use crate::telemetry::AuditEvent;

/// Port assumed when a CONNECT authority has none.
const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Handle a CONNECT request on either hop.
pub async fn handle_connect(
    mut req: Request<Incoming>,
    config: Arc<ProxyConfig>,
) -> Result<Response<ProxyBody>, ProxyError> {
    let target = tunnel_target(req.uri().authority())?;
    let hop = config.mode.name();

    debug!("[{}] CONNECT {}", hop, target);

    if config.policy.evaluate(&target) == PolicyDecision::Block {
        info!("[{}] Intercepting CONNECT to blocked target {}", hop, target);
        config.audit.log(AuditEvent::RequestBlock {
            hop: hop.to_string(),
            method: "CONNECT".to_string(),
            target: target.clone(),
        });
        return start_interception(&mut req, target, config.clone());
    }

    config.audit.log(AuditEvent::RequestAllow {
        hop: hop.to_string(),
        method: "CONNECT".to_string(),
        target: target.clone(),
    });

    match &config.mode {
        HopMode::FirstHop { .. } => {
            let server = dial(&target, config.connect_timeout).await?;
            debug!("[{}] Connected to {}", hop, target);
            start_relay(&mut req, server, target, config.clone())
        }
        HopMode::SecondHop { upstream } => {
            let server = upstream
                .open_tunnel(&target, config.connect_timeout)
                .await?;
            start_relay(&mut req, server, target, config.clone())
        }
    }
}

/// Open a TCP connection to `addr`, giving up after `connect_timeout`.
pub async fn dial(addr: &str, connect_timeout: Duration) -> Result<TcpStream, ProxyError> {
    match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProxyError::UpstreamUnavailable {
            addr: addr.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(ProxyError::Timeout(addr.to_string())),
    }
}

/// Claim the client connection and hand it to the interceptor once the 200
/// has been written.
fn start_interception(
    req: &mut Request<Incoming>,
    target: String,
    config: Arc<ProxyConfig>,
) -> Result<Response<ProxyBody>, ProxyError> {
    let takeover = ClientTakeover::take(req)?;
    let message = config.policy.block_message();

    tokio::spawn(async move {
        let hop = config.mode.name();
        let client = match takeover.into_stream().await {
            Ok(client) => client,
            Err(e) => {
                warn!("[{}] Upgrade failed for {}: {}", hop, target, e);
                return;
            }
        };

        config.audit.log(AuditEvent::Intercept {
            hop: hop.to_string(),
            target: target.clone(),
            common_name: config.mitm_common_name.clone(),
        });

        match intercept(client, &config.mitm_common_name, &message).await {
            Ok(()) => debug!("[{}] Served blocked response to {}", hop, target),
            Err(e) => debug!("[{}] Interception of {} aborted: {}", hop, target, e),
        }
    });

    Ok(connection_established())
}

/// Claim the client connection and relay it to `server` once the 200 has been
/// written.
fn start_relay<S>(
    req: &mut Request<Incoming>,
    server: S,
    target: String,
    config: Arc<ProxyConfig>,
) -> Result<Response<ProxyBody>, ProxyError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let takeover = ClientTakeover::take(req)?;

    tokio::spawn(async move {
        let hop = config.mode.name();
        let client = match takeover.into_stream().await {
            Ok(client) => client,
            Err(e) => {
                warn!("[{}] Upgrade failed for {}: {}", hop, target, e);
                return;
            }
        };

        let stats = relay(client, server).await;
        debug!("[{}] Tunnel to {} closed", hop, target);

        config.audit.log(AuditEvent::TunnelClosed {
            hop: hop.to_string(),
            target,
            bytes_up: stats.client_to_server,
            bytes_down: stats.server_to_client,
        });
    });

    Ok(connection_established())
}

/// Bare `200 OK` that switches the connection to raw bytes.
fn connection_established() -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::OK;
    response
}

/// `host:port` to tunnel to, defaulting the port to 443.
fn tunnel_target(authority: Option<&Authority>) -> Result<String, ProxyError> {
    let authority = authority.ok_or_else(|| {
        ProxyError::InvalidRequest("Missing authority in CONNECT request".into())
    })?;

    if authority.host().is_empty() {
        return Err(ProxyError::InvalidRequest(
            "Empty host in CONNECT request".into(),
        ));
    }

    Ok(match authority.port_u16() {
        Some(_) => authority.as_str().to_string(),
        None => format!("{}:{}", authority.host(), DEFAULT_TUNNEL_PORT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Uri;

    fn authority_of(uri: &str) -> Option<Authority> {
        uri.parse::<Uri>().unwrap().authority().cloned()
    }

    #[test]
    fn test_tunnel_target_with_port() {
        let authority = authority_of("api.example.com:8443");
        assert_eq!(
            tunnel_target(authority.as_ref()).unwrap(),
            "api.example.com:8443"
        );
    }

    #[test]
    fn test_tunnel_target_default_port() {
        let authority = authority_of("http://api.example.com/");
        assert_eq!(
            tunnel_target(authority.as_ref()).unwrap(),
            "api.example.com:443"
        );
    }

    #[test]
    fn test_tunnel_target_ipv6() {
        let authority = authority_of("[::1]:9000");
        assert_eq!(tunnel_target(authority.as_ref()).unwrap(), "[::1]:9000");
    }

    #[test]
    fn test_tunnel_target_missing() {
        let result = tunnel_target(None);
        assert!(matches!(result, Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_connection_established_is_bare_ok() {
        let response = connection_established();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().is_empty());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = dial(&addr, Duration::from_secs(5)).await;
        match result {
            Err(ProxyError::UpstreamUnavailable { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected UpstreamUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dial_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let stream = dial(&addr, Duration::from_secs(5)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().to_string(), addr);
    }
}
