/*!
The per-client sender task: the only writer of a client's socket.
*/
use std::time::Duration;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    queue::{Outbound, OutboundReceiver},
    registry::ClientId,
};

/// Why a sender task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// Pulled the close sentinel and half-closed the socket.
    Closed,
    /// A write failed or timed out.
    WriteFailed,
}

/// Drains `queue` into `writer` until the close sentinel arrives or a write
/// fails. The registry is never touched from here; the owning receiver task
/// is the only one that deregisters.
pub async fn run_sender<W>(
    id: ClientId,
    mut writer: W,
    queue: OutboundReceiver,
    write_timeout: Duration,
) -> SenderExit
where
    W: AsyncWrite + Unpin,
{
    loop {
        let payload = match queue.pull().await {
            Outbound::Payload(payload) => payload,
            Outbound::Close => break,
        };

        match timeout(write_timeout, writer.write_all(&payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(client = %id, "write failed, stopping sender: {}", e);
                return SenderExit::WriteFailed;
            }
            Err(_) => {
                warn!(client = %id, "write timed out after {:?}, stopping sender", write_timeout);
                return SenderExit::WriteFailed;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(client = %id, "shutdown after close sentinel: {}", e);
    }

    debug!(client = %id, "sender finished");
    SenderExit::Closed
}
