//! Proxy chaining through an upstream proxy.
//!
//! The second hop forwards everything to another proxy, injecting
//! `Proxy-Authorization` with its configured credentials:
//!
//! - Plain requests are sent over a fresh HTTP/1.1 connection to the upstream
//!   with their absolute-form URI intact.
//! - CONNECT requests are replayed upstream as a raw `CONNECT host:port`
//!   request; once the upstream answers 200 the connection is handed back to
//!   the caller for relaying.

use hyper::body::Incoming;
use hyper::header::PROXY_AUTHORIZATION;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::auth::Credentials;
use super::connect::dial;
use super::error::ProxyError;

/// Upper bound on header lines accepted in the upstream's CONNECT response.
const MAX_RESPONSE_HEADERS: usize = 100;

/// Upstream proxy connection, with any bytes the upstream sent past its
/// response head still buffered.
pub type UpstreamStream = BufReader<TcpStream>;

/// Address of an upstream proxy and the credentials to present to it.
#[derive(Debug, Clone)]
pub struct UpstreamChain {
    addr: String,
    credentials: Credentials,
}

impl UpstreamChain {
    /// Create a chain adapter for the proxy at `addr`.
    pub fn new(addr: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            addr: addr.into(),
            credentials,
        }
    }

    /// Upstream proxy address (`host:port`).
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Raw CONNECT request sent to the upstream for `target`.
    pub fn connect_request(&self, target: &str) -> String {
        format!(
            "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Authorization: {}\r\n\r\n",
            self.credentials.basic_header_value(),
        )
    }

    /// Ask the upstream to open a tunnel to `target`.
    ///
    /// Returns the upstream connection positioned right after the upstream's
    /// `200` response head.
    pub async fn open_tunnel(
        &self,
        target: &str,
        connect_timeout: Duration,
    ) -> Result<UpstreamStream, ProxyError> {
        let mut stream = dial(&self.addr, connect_timeout).await?;

        debug!("Sending CONNECT {} to upstream {}", target, self.addr);
        stream
            .write_all(self.connect_request(target).as_bytes())
            .await
            .map_err(|e| ProxyError::UpstreamRejected(format!("sending CONNECT: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let status = read_response_head(&mut reader).await?;
        if status != 200 {
            return Err(ProxyError::UpstreamRejected(format!(
                "upstream answered {}",
                status
            )));
        }

        debug!("Upstream {} opened tunnel to {}", self.addr, target);
        Ok(reader)
    }

    /// Send a plain HTTP request through the upstream proxy.
    pub async fn send_request(
        &self,
        mut req: Request<Incoming>,
        connect_timeout: Duration,
    ) -> Result<Response<Incoming>, ProxyError> {
        let stream = dial(&self.addr, connect_timeout).await?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| self.unavailable(e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Upstream connection ended: {}", e);
            }
        });

        req.headers_mut()
            .insert(PROXY_AUTHORIZATION, self.credentials.to_header_value()?);

        sender
            .send_request(req)
            .await
            .map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> ProxyError {
        ProxyError::UpstreamUnavailable {
            addr: self.addr.clone(),
            message: err.to_string(),
        }
    }
}

/// Read an HTTP response head line by line and return its status code.
///
/// Read failures, including a head that is not valid UTF-8, count as the
/// upstream rejecting the tunnel.
async fn read_response_head<R>(reader: &mut R) -> Result<u16, ProxyError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    if read_head_line(reader, &mut line).await? == 0 {
        return Err(ProxyError::UpstreamRejected(
            "connection closed before response".into(),
        ));
    }
    let status = parse_status_line(&line)?;
    trace!("Upstream status line: {}", line.trim_end());

    for _ in 0..MAX_RESPONSE_HEADERS {
        line.clear();
        if read_head_line(reader, &mut line).await? == 0 {
            return Err(ProxyError::UpstreamRejected(
                "connection closed inside response head".into(),
            ));
        }
        if line == "\r\n" || line == "\n" {
            return Ok(status);
        }
    }

    Err(ProxyError::UpstreamRejected("response head too large".into()))
}

async fn read_head_line<R>(reader: &mut R, line: &mut String) -> Result<usize, ProxyError>
where
    R: AsyncBufReadExt + Unpin,
{
    reader
        .read_line(line)
        .await
        .map_err(|e| ProxyError::UpstreamRejected(format!("reading response head: {}", e)))
}

/// Parse `HTTP/1.x <code> <reason>` into the status code.
fn parse_status_line(line: &str) -> Result<u16, ProxyError> {
    let mut parts = line.split_whitespace();

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(ProxyError::UpstreamRejected(format!(
            "malformed status line: {:?}",
            line.trim_end()
        )));
    }

    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            ProxyError::UpstreamRejected(format!("malformed status line: {:?}", line.trim_end()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

    /// Yields `head` once, then fails as if the peer reset the connection.
    struct ResetAfter {
        head: Option<&'static [u8]>,
    }

    impl AsyncRead for ResetAfter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.head.take() {
                Some(head) => {
                    buf.put_slice(head);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::ErrorKind::ConnectionReset.into())),
            }
        }
    }

    fn chain() -> UpstreamChain {
        UpstreamChain::new("127.0.0.1:8080", Credentials::new("haha", "hehe"))
    }

    #[test]
    fn test_connect_request_format() {
        assert_eq!(
            chain().connect_request("example.com:443"),
            "CONNECT example.com:443 HTTP/1.1\r\n\
             Host: example.com:443\r\n\
             Proxy-Authorization: Basic aGFoYTpoZWhl\r\n\r\n"
        );
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK\r\n").unwrap(), 200);
        assert_eq!(
            parse_status_line("HTTP/1.0 200 Connection established\r\n").unwrap(),
            200
        );
        assert_eq!(
            parse_status_line("HTTP/1.1 407 Proxy Authentication Required\r\n").unwrap(),
            407
        );
    }

    #[test]
    fn test_parse_status_line_rejects_garbage() {
        assert!(parse_status_line("SSH-2.0-OpenSSH\r\n").is_err());
        assert!(parse_status_line("HTTP/1.1 abc\r\n").is_err());
        assert!(parse_status_line("\r\n").is_err());
    }

    #[tokio::test]
    async fn test_read_response_head_keeps_trailing_bytes() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\nVia: upstream\r\n\r\nearly-bytes";
        let mut reader = BufReader::new(data);

        let status = read_response_head(&mut reader).await.unwrap();
        assert_eq!(status, 200);

        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "early-bytes");
    }

    #[tokio::test]
    async fn test_read_response_head_truncated() {
        let data: &[u8] = b"HTTP/1.1 200 OK\r\nVia: upstream\r\n";
        let mut reader = BufReader::new(data);

        let result = read_response_head(&mut reader).await;
        assert!(matches!(result, Err(ProxyError::UpstreamRejected(_))));
    }

    #[tokio::test]
    async fn test_read_response_head_not_utf8() {
        let data: &[u8] = b"\xff\xfe garbage\r\n\r\n";
        let mut reader = BufReader::new(data);

        let result = read_response_head(&mut reader).await;
        assert!(matches!(result, Err(ProxyError::UpstreamRejected(_))));
    }

    #[tokio::test]
    async fn test_read_response_head_reset_mid_head() {
        let mut reader = BufReader::new(ResetAfter {
            head: Some(b"HTTP/1.1 200 OK\r\nVia: ups"),
        });

        let result = read_response_head(&mut reader).await;
        assert!(matches!(result, Err(ProxyError::UpstreamRejected(_))));
    }

    #[tokio::test]
    async fn test_open_tunnel_garbage_from_upstream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"\xff\xfe garbage\r\n\r\n").await;
        });

        let chain = UpstreamChain::new(addr.to_string(), Credentials::new("haha", "hehe"));
        let result = chain
            .open_tunnel("example.com:443", Duration::from_secs(5))
            .await;
        let err = result.err().unwrap();
        assert!(matches!(err, ProxyError::UpstreamRejected(_)));
        assert_eq!(err.status(), hyper::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_open_tunnel_rejected_by_upstream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await;
        });

        let chain = UpstreamChain::new(addr.to_string(), Credentials::new("haha", "hehe"));
        let result = chain
            .open_tunnel("example.com:443", Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(ProxyError::UpstreamRejected(_))));
    }

    #[tokio::test]
    async fn test_open_tunnel_upstream_down() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let chain = UpstreamChain::new(addr.to_string(), Credentials::new("haha", "hehe"));
        let result = chain
            .open_tunnel("example.com:443", Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(ProxyError::UpstreamUnavailable { .. })));
    }
}
