//! Error types for proxy operations.
//!
//! Every failure a handler can hit before the client connection is taken over
//! maps to an HTTP status via [`ProxyError::status`]. Failures after takeover
//! (TLS handshake, relay I/O) have no response channel left and are only logged.

use hyper::header::{CONTENT_TYPE, PROXY_AUTHENTICATE};
use hyper::{Response, StatusCode};
use thiserror::Error;

use super::body::{full_body, ProxyBody};

/// Challenge sent with every 407 response.
pub const PROXY_AUTH_CHALLENGE: &str = "Basic realm=\"Proxy\"";

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No `Proxy-Authorization` header on a request that requires one.
    #[error("Proxy authentication required")]
    AuthRequired,

    /// `Proxy-Authorization` present but not a usable `Basic <token>` value.
    #[error("{0}")]
    MalformedAuth(&'static str),

    /// Credentials decoded fine but do not match the configured pair.
    #[error("Invalid username or password")]
    AuthRejected,

    /// Target matches the domain policy.
    #[error("Access to {domain} is not allowed.")]
    Blocked {
        /// The configured blocked domain.
        domain: String,
    },

    /// Could not reach the target or the upstream proxy.
    #[error("Failed to connect to upstream '{addr}': {message}")]
    UpstreamUnavailable {
        /// The address we tried to reach.
        addr: String,
        /// Underlying error text.
        message: String,
    },

    /// The upstream proxy refused our CONNECT or sent an unusable response head.
    #[error("Error connecting to the upstream proxy: {0}")]
    UpstreamRejected(String),

    /// The inbound connection cannot be converted into a raw byte stream.
    #[error("Hijacking not supported")]
    HijackUnsupported,

    /// Request is missing the target information a proxy needs.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// TLS error during handshake or configuration.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Certificate synthesis failed.
    #[error("Certificate generation failed: {0}")]
    CertGeneration(#[from] super::cert::CertError),

    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Connection attempt exceeded the configured timeout.
    #[error("Connection to '{0}' timed out")]
    Timeout(String),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<rustls::Error> for ProxyError {
    fn from(err: rustls::Error) -> Self {
        ProxyError::Tls(err.to_string())
    }
}

impl ProxyError {
    /// HTTP status reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::AuthRequired => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            ProxyError::MalformedAuth(_) => StatusCode::BAD_REQUEST,
            ProxyError::AuthRejected => StatusCode::FORBIDDEN,
            ProxyError::Blocked { .. } => StatusCode::BAD_REQUEST,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable { .. } | ProxyError::Timeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::UpstreamRejected(_) => StatusCode::BAD_GATEWAY,
            ProxyError::HijackUnsupported
            | ProxyError::Tls(_)
            | ProxyError::CertGeneration(_)
            | ProxyError::Io(_)
            | ProxyError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render this error as a plain-text response.
    ///
    /// `AuthRequired` additionally carries the `Proxy-Authenticate` challenge.
    pub fn into_response(self) -> Response<ProxyBody> {
        let mut builder = Response::builder()
            .status(self.status())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");

        if matches!(self, ProxyError::AuthRequired) {
            builder = builder.header(PROXY_AUTHENTICATE, PROXY_AUTH_CHALLENGE);
        }

        builder
            .body(full_body(self.to_string()))
            .unwrap_or_else(|_| Response::new(full_body(String::new())))
    }

    /// Whether this error is an ordinary peer disconnect rather than a fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProxyError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            ProxyError::Http(e) => e.is_incomplete_message() || e.is_closed(),
            _ => false,
        }
    }
}
