/*!
The receiver task: one per accepted connection.

It owns the whole client lifecycle. A connection is first `Handshaking`
(prompt sent, waiting for a display name), then `Active` (registered, with
its own sender task, reading and broadcasting), then `Draining`
(deregistered, leave notice sent, close sentinel queued) and finally
`Closed`. A sender that cannot flush within the drain timeout is aborted,
which closes the socket. A failed handshake goes straight to `Closed`
without ever touching the registry.
*/
use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{DEFAULT_NAME, HANDSHAKE_CHUNK_SIZE, READ_CHUNK_SIZE, ServerConfig},
    error::{Error, Result},
    queue::outbound_queue,
    registry::{ClientId, ClientRecord, ClientRegistry},
    sender::run_sender,
};

pub const WELCOME_PROMPT: &str = "Welcome to the chat. Enter your name: ";

pub fn join_notice(name: &str) -> String {
    format!("{} joined the chat.\n", name)
}

pub fn leave_notice(name: &str) -> String {
    format!("{} left the chat.\n", name)
}

/// Why an active client stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    PeerClosed,
    ReadFailed,
    Shutdown,
}

/// Turns the first inbound payload into a display name.
pub fn display_name(payload: &[u8]) -> String {
    let name = String::from_utf8_lossy(payload);
    let name = name.trim();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Formats one inbound chunk as `"<name>: <text>"`, always newline-terminated.
pub fn chat_line(name: &str, payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut line = format!("{}: {}", name, text);
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

async fn exchange_name<R, W>(reader: &mut R, writer: &mut W) -> Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(WELCOME_PROMPT.as_bytes()).await?;

    let mut buf = [0u8; HANDSHAKE_CHUNK_SIZE];
    match reader.read(&mut buf).await? {
        0 => Err(Error::HandshakeClosed),
        n => Ok(display_name(&buf[..n])),
    }
}

/// Sends the prompt and waits for the name, bounded by `limit` and by
/// `cancel`.
pub async fn handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::HandshakeClosed),
        res = timeout(limit, exchange_name(reader, writer)) => {
            res.unwrap_or(Err(Error::HandshakeTimeout))
        }
    }
}

/// Runs one connection from accept to close. Never returns an error: every
/// fault ends this client only.
pub async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let id = ClientId::allocate();
    let (mut reader, mut writer) = stream.into_split();

    let limit = config.handshake_timeout();
    let name = match handshake(&mut reader, &mut writer, limit, &cancel).await {
        Ok(name) => name,
        Err(e) => {
            info!(client = %id, peer = %peer, "handshake failed: {}", e);
            return;
        }
    };

    let (queue, outbound) = outbound_queue();
    registry.register(
        id,
        ClientRecord {
            name: name.clone(),
            queue: queue.clone(),
            peer,
            closer: cancel.clone(),
        },
    );

    let mut sender = tokio::spawn(run_sender(id, writer, outbound, config.write_timeout()));

    info!(client = %id, peer = %peer, name = %name, "client joined");
    registry.broadcast(join_notice(&name), Some(id));

    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let departure = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Departure::Shutdown,
            res = reader.read(&mut buf) => match res {
                Ok(0) => break Departure::PeerClosed,
                Ok(n) => {
                    registry.broadcast(chat_line(&name, &buf[..n]), Some(id));
                }
                Err(e) => {
                    warn!(client = %id, "read failed: {}", e);
                    break Departure::ReadFailed;
                }
            }
        }
    };

    // Draining.
    let left = registry.deregister(id).map(|record| record.name).unwrap_or(name);
    info!(client = %id, peer = %peer, name = %left, ?departure, "client left");

    // On shutdown every queue is being closed; a leave notice would only
    // race the close sentinels.
    if departure != Departure::Shutdown {
        registry.broadcast(leave_notice(&left), Some(id));
    }

    queue.close();
    drop(reader);

    match timeout(config.drain_timeout(), &mut sender).await {
        Ok(Ok(exit)) => debug!(client = %id, ?exit, "sender joined"),
        Ok(Err(e)) => warn!(client = %id, "sender task failed: {}", e),
        Err(_) => {
            // Dropping the write half with the read half already gone closes
            // the socket, whatever is still queued or in flight.
            sender.abort();
            let _ = sender.await;
            warn!(
                client = %id,
                "sender still draining after {:?}, connection force-closed",
                config.drain_timeout()
            );
        }
    }
}
