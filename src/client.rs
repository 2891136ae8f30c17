/*!
Client side of the relay.

The client connects (retrying on a fixed backoff), answers the server's
prompt with a display name and then runs two loops: the caller-driven input
loop in [`ChatClient::run`] and a background receive loop that shows
whatever the server sends. A failed send tears the receive loop down,
reconnects, resends the stored name and starts a fresh receive loop.
*/
use std::{io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::{ClientConfig, DEFAULT_NAME, HANDSHAKE_CHUNK_SIZE, READ_CHUNK_SIZE},
    error::{Error, Result},
};

const RECEIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the client shows things to its user.
pub trait Console: Send + Sync + 'static {
    /// Text received from the server.
    fn show(&self, text: &str);
    /// Locally generated status notice.
    fn notice(&self, text: &str);
}

const QUIT_COMMANDS: [&str; 3] = ["exit", "quit", "salir"];

/// `exit`, `quit` or `salir`, in any case, ends the session.
pub fn is_quit_command(line: &str) -> bool {
    let line = line.trim();
    QUIT_COMMANDS
        .iter()
        .any(|command| line.eq_ignore_ascii_case(command))
}

async fn read_prompt(reader: &mut OwnedReadHalf, limit: Duration) -> Result<String> {
    let mut buf = [0u8; HANDSHAKE_CHUNK_SIZE];
    match timeout(limit, reader.read(&mut buf)).await {
        Err(_) => Err(Error::HandshakeTimeout),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(0)) => Err(Error::HandshakeClosed),
        Ok(Ok(n)) => Ok(String::from_utf8_lossy(&buf[..n]).into_owned()),
    }
}

async fn receive_loop(
    mut reader: OwnedReadHalf,
    console: Arc<dyn Console>,
    stop: CancellationToken,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) => {
                    console.notice("The server closed the connection.");
                    stop.cancel();
                    break;
                }
                Ok(n) => console.show(&String::from_utf8_lossy(&buf[..n])),
                Err(e) => {
                    console.notice(&format!("Connection to the server lost: {}", e));
                    stop.cancel();
                    break;
                }
            }
        }
    }

    debug!("receive loop finished");
}

/// One live connection: the write half plus the receive loop reading the
/// other half under its own stop signal.
struct Link {
    writer: OwnedWriteHalf,
    stop: CancellationToken,
    receiver: JoinHandle<()>,
}

impl Link {
    fn start(reader: OwnedReadHalf, writer: OwnedWriteHalf, console: Arc<dyn Console>) -> Self {
        let stop = CancellationToken::new();
        let receiver = tokio::spawn(receive_loop(reader, console, stop.clone()));
        Self {
            writer,
            stop,
            receiver,
        }
    }

    async fn send(&mut self, line: &str) -> io::Result<()> {
        // The receive loop already saw the connection go away.
        if self.stop.is_cancelled() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }

        let mut payload = String::with_capacity(line.len() + 1);
        payload.push_str(line);
        payload.push('\n');
        self.writer.write_all(payload.as_bytes()).await
    }

    async fn stop(mut self) {
        self.stop.cancel();
        let _ = self.writer.shutdown().await;
        drop(self.writer);
        if timeout(RECEIVER_JOIN_TIMEOUT, self.receiver).await.is_err() {
            debug!("receive loop did not stop in time");
        }
    }
}

pub struct ChatClient {
    config: ClientConfig,
    console: Arc<dyn Console>,
    name: Option<String>,
}

impl ChatClient {
    /// A name preset in `config` is sent without asking for one.
    pub fn new(config: ClientConfig, console: Arc<dyn Console>) -> Self {
        let name = config.name.clone();
        Self {
            config,
            console,
            name,
        }
    }

    /// Retries on the fixed backoff until the server accepts.
    async fn connect(&self) -> TcpStream {
        let addr = self.config.server_addr();
        loop {
            let attempt = TcpStream::connect(&addr);
            let source = match timeout(self.config.connect_timeout(), attempt).await {
                Ok(Ok(stream)) => {
                    info!("connected to {}", addr);
                    return stream;
                }
                Ok(Err(e)) => e,
                Err(_) => io::Error::from(io::ErrorKind::TimedOut),
            };

            let err = Error::Connect {
                addr: addr.clone(),
                source,
            };
            self.console.notice(&format!(
                "{}, retrying in {:?}...",
                err,
                self.config.reconnect_delay()
            ));
            sleep(self.config.reconnect_delay()).await;
        }
    }

    /// Connects again and re-registers under the stored name. Keeps trying
    /// until a connection completes the handshake.
    async fn reconnect(&self, name: &str) -> Link {
        loop {
            let (mut reader, mut writer) = self.connect().await.into_split();

            if let Err(e) = read_prompt(&mut reader, self.config.prompt_timeout()).await {
                self.console.notice(&format!("No prompt from the server: {}", e));
                sleep(self.config.reconnect_delay()).await;
                continue;
            }

            if let Err(e) = writer.write_all(name.as_bytes()).await {
                self.console.notice(&format!("Could not resend name: {}", e));
                sleep(self.config.reconnect_delay()).await;
                continue;
            }

            return Link::start(reader, writer, self.console.clone());
        }
    }

    /// Runs the input loop over `input` until a quit command or end of
    /// input. Each line is sent to the server as one message.
    pub async fn run<I>(mut self, input: I) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();

        let (mut reader, mut writer) = self.connect().await.into_split();
        let prompt = match read_prompt(&mut reader, self.config.prompt_timeout()).await {
            Ok(prompt) => prompt,
            Err(e) => {
                self.console.notice(&format!("No prompt from the server: {}", e));
                return Err(e);
            }
        };

        let name = match self.name.take() {
            Some(name) => name,
            None => {
                self.console.show(&prompt);
                match lines.next_line().await? {
                    Some(line) => match line.trim() {
                        "" => DEFAULT_NAME.to_string(),
                        name => name.to_string(),
                    },
                    None => return Ok(()),
                }
            }
        };

        writer.write_all(name.as_bytes()).await?;
        self.name = Some(name.clone());

        let mut link = Link::start(reader, writer, self.console.clone());

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!("input closed: {}", e);
                    break;
                }
            };

            if is_quit_command(&line) {
                break;
            }

            if let Err(e) = link.send(&line).await {
                self.console
                    .notice(&format!("Cannot send ({}). Connection lost, reconnecting...", e));
                link.stop().await;
                link = self.reconnect(&name).await;
            }
        }

        self.console.notice("Closing connection...");
        link.stop().await;
        Ok(())
    }
}
