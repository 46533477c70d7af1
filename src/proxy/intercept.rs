//! TLS interception for the blocked domain.
//!
//! Instead of dialing the real target, the proxy terminates TLS on the
//! client's raw connection with a freshly generated certificate, writes one
//! synthetic `400 Bad Request` JSON response inside the encrypted channel,
//! and closes the connection.
//!
//! The certificate is issued for a fixed local name (by default `localhost`),
//! not for the intercepted host. Clients are expected to skip verification.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::cert::EphemeralCertificate;
use super::error::ProxyError;
use super::tls::create_tls_acceptor;

/// JSON body served to intercepted clients.
#[derive(Debug, Serialize)]
struct BlockedBody<'a> {
    status: u16,
    message: &'a str,
}

/// Build the complete HTTP/1.1 response written inside the TLS channel.
pub fn synthetic_response(message: &str) -> Result<Vec<u8>, ProxyError> {
    let body = serde_json::to_vec(&BlockedBody {
        status: 400,
        message,
    })
    .map_err(std::io::Error::from)?;

    let mut response = b"HTTP/1.1 400 Bad Request\r\n\
Content-Type: application/json\r\n\
Connection: close\r\n\
\r\n"
        .to_vec();
    response.extend_from_slice(&body);
    Ok(response)
}

/// Terminate TLS on `stream` and answer with the synthetic blocked response.
///
/// Generates a new certificate for `common_name` on every call. A handshake
/// failure aborts the connection without any response.
pub async fn intercept<S>(stream: S, common_name: &str, message: &str) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cert = EphemeralCertificate::generate(common_name)?;
    let acceptor = create_tls_acceptor(cert)?;

    let mut tls = acceptor
        .accept(stream)
        .await
        .map_err(|e| ProxyError::Tls(format!("Client TLS handshake failed: {}", e)))?;

    debug!("TLS established with intercepted client (CN={})", common_name);

    let response = synthetic_response(message)?;
    tls.write_all(&response).await?;
    tls.flush().await?;

    // Sends close_notify and shuts down the underlying stream.
    tls.shutdown().await?;
    Ok(())
}
