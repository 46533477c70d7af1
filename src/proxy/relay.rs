//! Bidirectional byte relay between two streams.
//!
//! A relay session spawns one task per direction and waits for both. When a
//! direction hits end-of-stream or an error it shuts down its write side and
//! signals the other direction to stop, so a peer that goes quiet cannot keep
//! the other half of the tunnel open. Both streams are dropped (closed) once
//! both tasks have finished.
//!
//! The copy loop is written out instead of using `tokio::io::copy` so the byte
//! count survives when the stop signal cancels it inside `select!`.

use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Buffer size for each copy direction.
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Byte counts for a finished relay session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the client side to the server side.
    pub client_to_server: u64,
    /// Bytes copied from the server side to the client side.
    pub server_to_client: u64,
}

/// Relay bytes between `client` and `server` until either side closes.
///
/// Returns only after both copy directions have finished.
pub async fn relay<C, S>(client: C, server: S) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = io::split(client);
    let (server_read, server_write) = io::split(server);

    let (closed_tx, closed_rx) = watch::channel(false);

    let upstream = tokio::spawn(copy_direction(
        "client->server",
        client_read,
        server_write,
        closed_tx.clone(),
        closed_rx.clone(),
    ));
    let downstream = tokio::spawn(copy_direction(
        "server->client",
        server_read,
        client_write,
        closed_tx,
        closed_rx,
    ));

    let (up, down) = tokio::join!(upstream, downstream);

    let stats = RelayStats {
        client_to_server: up.unwrap_or_default(),
        server_to_client: down.unwrap_or_default(),
    };
    debug!(
        "Relay finished: {} bytes up, {} bytes down",
        stats.client_to_server, stats.server_to_client
    );
    stats
}

/// Copy one direction until EOF, error, or the peer direction finishing.
async fn copy_direction<R, W>(
    label: &'static str,
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    closed_tx: watch::Sender<bool>,
    mut closed_rx: watch::Receiver<bool>,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut total = 0u64;

    {
        let copy = async {
            let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<_, io::Error>(());
                }
                writer.write_all(&buf[..n]).await?;
                total += n as u64;
            }
        };

        tokio::select! {
            result = copy => match result {
                Ok(()) => trace!("{}: end of stream", label),
                Err(e) => debug!("{}: copy ended: {}", label, e),
            },
            _ = closed_rx.changed() => trace!("{}: peer direction closed", label),
        }
    }

    let _ = writer.shutdown().await;
    closed_tx.send_replace(true);
    total
}
