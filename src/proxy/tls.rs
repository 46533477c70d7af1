//! TLS server configuration for interception.
//!
//! # Critical ALPN Note
//!
//! We **must** force HTTP/1.1 via ALPN. The synthetic response written after
//! the handshake is HTTP/1.1 text; a client that negotiated H2 would not be
//! able to read it.

use super::cert::EphemeralCertificate;
use super::error::ProxyError;
use rustls::ServerConfig;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::trace;

/// ALPN protocols offered to intercepted clients.
pub const MITM_ALPN: &[&[u8]] = &[b"http/1.1"];

/// Create a TLS acceptor presenting `cert`.
///
/// The certificate is moved into the acceptor; build a new one (and a new
/// certificate) for each intercepted connection.
pub fn create_tls_acceptor(cert: EphemeralCertificate) -> Result<TlsAcceptor, ProxyError> {
    trace!("Building TLS acceptor for CN={}", cert.common_name());

    let (chain, key) = cert.into_rustls_parts();

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    // CRITICAL: Force HTTP/1.1 to prevent HTTP/2 negotiation.
    config.alpn_protocols = MITM_ALPN.iter().map(|p| p.to_vec()).collect();

    Ok(TlsAcceptor::from(Arc::new(config)))
}
