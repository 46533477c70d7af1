//! Basic proxy authentication.
//!
//! The first hop requires `Proxy-Authorization: Basic <base64(user:secret)>` on
//! every request; there is no session, each request is checked on its own.
//! The second hop uses [`Credentials::basic_header_value`] to inject the same
//! header into everything it sends upstream.

use base64::{engine::general_purpose, Engine as _};
use hyper::header::{HeaderMap, HeaderValue, PROXY_AUTHORIZATION};
use hyper::{Request, Response};
use std::future::Future;

use super::body::ProxyBody;
use super::error::ProxyError;

/// A fixed username/secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Secret.
    pub password: String,
}

impl Credentials {
    /// Create a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Basic <base64(username:password)>`.
    pub fn basic_header_value(&self) -> String {
        let token = general_purpose::STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }

    /// The header value as a [`HeaderValue`].
    pub fn to_header_value(&self) -> Result<HeaderValue, ProxyError> {
        HeaderValue::from_str(&self.basic_header_value())
            .map_err(|e| ProxyError::InvalidRequest(format!("Invalid credentials: {}", e)))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates `Proxy-Authorization` against one configured credential pair.
#[derive(Debug, Clone)]
pub struct AuthGate {
    expected: Credentials,
}

impl AuthGate {
    /// Create a gate accepting exactly `expected`.
    pub fn new(expected: Credentials) -> Self {
        Self { expected }
    }

    /// Check the request headers.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ProxyError> {
        let header = headers
            .get(PROXY_AUTHORIZATION)
            .ok_or(ProxyError::AuthRequired)?;

        let value = header
            .to_str()
            .map_err(|_| ProxyError::MalformedAuth("Invalid authentication format"))?;

        let (scheme, token) = value
            .split_once(' ')
            .ok_or(ProxyError::MalformedAuth("Invalid authentication format"))?;
        if scheme != "Basic" {
            return Err(ProxyError::MalformedAuth("Invalid authentication format"));
        }

        let decoded = general_purpose::STANDARD
            .decode(token)
            .map_err(|_| ProxyError::MalformedAuth("Invalid authentication token"))?;
        let decoded = String::from_utf8_lossy(&decoded);

        match decoded.split_once(':') {
            Some((user, secret))
                if user == self.expected.username && secret == self.expected.password =>
            {
                Ok(())
            }
            _ => Err(ProxyError::AuthRejected),
        }
    }

    /// Run `next` only if the request carries valid credentials.
    pub async fn guard<B, F, Fut>(
        &self,
        req: Request<B>,
        next: F,
    ) -> Result<Response<ProxyBody>, ProxyError>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<Response<ProxyBody>, ProxyError>>,
    {
        self.authorize(req.headers())?;
        next(req).await
    }
}
