//! A line-oriented chat relay.
//!
//! Clients connect over TCP, answer a name prompt and then every chunk they
//! send is relayed as `"<name>: <text>"` to all other connected clients.
//! Each client has its own receiver task, sender task and unbounded
//! outbound queue, so one slow client never stalls the others.

pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod sender;
pub mod server;
pub mod session;
pub mod shutdown;

use tokio::net::TcpListener;

pub use client::{ChatClient, Console};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Error, Result};
pub use queue::{Outbound, OutboundQueue, OutboundReceiver, outbound_queue};
pub use registry::{ClientId, ClientRecord, ClientRegistry};
pub use server::ChatServer;
pub use shutdown::ShutdownHandle;

/// Serves `listener` with the default settings until the process exits.
pub async fn run_chat_server(listener: TcpListener) {
    ChatServer::from_listener(listener, ServerConfig::default())
        .run()
        .await;
}
