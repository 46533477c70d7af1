//! Converting an HTTP exchange into a raw byte stream.
//!
//! After a `200` is returned for a CONNECT, hyper hands the underlying
//! connection back as an [`Upgraded`] stream. [`ClientTakeover::take`] claims
//! that capability from the request up front, so a request that cannot be
//! upgraded is rejected with `HijackUnsupported` before any response is sent.

use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::Request;
use hyper_util::rt::TokioIo;

use super::error::ProxyError;

/// Raw client stream after takeover, usable with tokio I/O traits.
pub type ClientStream = TokioIo<Upgraded>;

/// A pending takeover of the client connection.
#[derive(Debug)]
pub struct ClientTakeover {
    on_upgrade: OnUpgrade,
}

impl ClientTakeover {
    /// Claim the takeover capability from `req`.
    ///
    /// Can succeed at most once per request: the capability is removed from
    /// the request's extensions.
    pub fn take<B>(req: &mut Request<B>) -> Result<Self, ProxyError> {
        let on_upgrade = req
            .extensions_mut()
            .remove::<OnUpgrade>()
            .ok_or(ProxyError::HijackUnsupported)?;
        Ok(Self { on_upgrade })
    }

    /// Wait for hyper to release the connection.
    ///
    /// Resolves once the response for this request has been written.
    pub async fn into_stream(self) -> Result<ClientStream, ProxyError> {
        let upgraded = self.on_upgrade.await?;
        Ok(TokioIo::new(upgraded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_request_cannot_be_taken_over() {
        let mut req = Request::new(());
        let result = ClientTakeover::take(&mut req);
        assert!(matches!(result, Err(ProxyError::HijackUnsupported)));
    }
}
