/*!
Server and client settings: compiled-in defaults plus `CHAT_*` environment
and command-line overrides.
*/
use std::{net::SocketAddr, time::Duration};

use clap::Parser;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Name given to a client whose handshake payload trims to nothing.
pub const DEFAULT_NAME: &str = "Anon";

/// Largest chunk a receiver task reads from its socket in one call.
pub const READ_CHUNK_SIZE: usize = 4096;
pub const HANDSHAKE_CHUNK_SIZE: usize = 1024;

/// Pause after a failed accept before the listener is polled again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Parser, Debug, Clone)]
#[clap(
    about = "Line-oriented chat relay server.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct ServerConfig {
    /// Interface the listening endpoint binds to.
    #[clap(long)]
    #[clap(env = "CHAT_HOST")]
    #[clap(default_value = DEFAULT_HOST)]
    pub host: String,

    #[clap(long)]
    #[clap(env = "CHAT_PORT")]
    #[clap(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// How long a fresh connection may take to send its display name.
    #[clap(long)]
    #[clap(env = "CHAT_HANDSHAKE_TIMEOUT_MS")]
    #[clap(default_value_t = 10_000)]
    pub handshake_timeout_ms: u64,

    /// Upper bound on a single write to a client socket.
    #[clap(long)]
    #[clap(env = "CHAT_WRITE_TIMEOUT_MS")]
    #[clap(default_value_t = 10_000)]
    pub write_timeout_ms: u64,

    /// How long a closing client waits for its sender task to drain.
    #[clap(long)]
    #[clap(env = "CHAT_DRAIN_TIMEOUT_MS")]
    #[clap(default_value_t = 500)]
    pub drain_timeout_ms: u64,

    /// Per-task join budget during shutdown.
    #[clap(long)]
    #[clap(env = "CHAT_JOIN_TIMEOUT_MS")]
    #[clap(default_value_t = 500)]
    pub join_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            handshake_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            drain_timeout_ms: 500,
            join_timeout_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(
    about = "Interactive client for the chat relay.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct ClientConfig {
    #[clap(long)]
    #[clap(env = "CHAT_HOST")]
    #[clap(default_value = DEFAULT_HOST)]
    pub host: String,

    #[clap(long)]
    #[clap(env = "CHAT_PORT")]
    #[clap(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Pause between failed connection attempts.
    #[clap(long)]
    #[clap(env = "CHAT_RECONNECT_DELAY_MS")]
    #[clap(default_value_t = 3_000)]
    pub reconnect_delay_ms: u64,

    #[clap(long)]
    #[clap(env = "CHAT_CONNECT_TIMEOUT_MS")]
    #[clap(default_value_t = 5_000)]
    pub connect_timeout_ms: u64,

    /// How long to wait for the server's welcome prompt.
    #[clap(long)]
    #[clap(env = "CHAT_PROMPT_TIMEOUT_MS")]
    #[clap(default_value_t = 5_000)]
    pub prompt_timeout_ms: u64,

    /// Display name to register with; asked for interactively when unset.
    #[clap(long)]
    #[clap(env = "CHAT_NAME")]
    pub name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reconnect_delay_ms: 3_000,
            connect_timeout_ms: 5_000,
            prompt_timeout_ms: 5_000,
            name: None,
        }
    }
}

impl ClientConfig {
    pub fn for_addr(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..Self::default()
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }
}
