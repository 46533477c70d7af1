//! Plain HTTP proxying (non-CONNECT).
//!
//! Requests arrive in absolute form (`GET http://host/path HTTP/1.1`). After
//! the domain policy check they are re-issued with the same method, headers
//! and body, either straight to the origin or through the upstream proxy, and
//! the origin's response is streamed back untouched.
//!
//! The first hop speaks plain HTTP to origins only. An absolute `https://`
//! URI fails with `503`; clients reach HTTPS origins through CONNECT.

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::PROXY_AUTHORIZATION;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tracing::{debug, info};

use super::body::ProxyBody;
use super::error::ProxyError;
use super::policy::PolicyDecision;
use super::server::{HopMode, ProxyConfig};
use crate::telemetry::AuditEvent;

/// Client used by the first hop to reach origins directly.
pub type DirectClient = Client<HttpConnector, Incoming>;

/// Build the direct-forwarding client.
pub fn direct_client(config: &ProxyConfig) -> DirectClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new()).build(connector)
}

/// Handle a plain HTTP proxy request on either hop.
pub async fn handle_http(
    mut req: Request<Incoming>,
    config: Arc<ProxyConfig>,
    client: &DirectClient,
) -> Result<Response<ProxyBody>, ProxyError> {
    let hop = config.mode.name();
    let target = req.uri().to_string();
    let method = req.method().to_string();

    debug!("[{}] {} {}", hop, method, target);

    if config.policy.evaluate(&target) == PolicyDecision::Block {
        info!("[{}] Blocking {} {}", hop, method, target);
        config.audit.log(AuditEvent::RequestBlock {
            hop: hop.to_string(),
            method,
            target,
        });
        return Err(ProxyError::Blocked {
            domain: config.policy.domain().to_string(),
        });
    }

    // Policy runs first so a blocked target is refused whatever its form.
    let authority = req.uri().authority().cloned().ok_or_else(|| {
        ProxyError::InvalidRequest(format!("Expected absolute-form URI, got {}", target))
    })?;

    config.audit.log(AuditEvent::RequestAllow {
        hop: hop.to_string(),
        method,
        target,
    });

    let response = match &config.mode {
        HopMode::FirstHop { .. } => {
            // Credentials for this proxy are not meant for the origin.
            req.headers_mut().remove(PROXY_AUTHORIZATION);
            client
                .request(req)
                .await
                .map_err(|e| ProxyError::UpstreamUnavailable {
                    addr: authority.to_string(),
                    message: e.to_string(),
                })?
        }
        HopMode::SecondHop { upstream } => {
            upstream.send_request(req, config.connect_timeout).await?
        }
    };

    debug!("[{}] Origin answered {}", hop, response.status());
    Ok(response.map(|body| body.boxed()))
}
