/*!
Accept loop and shutdown coordinator.
*/
use std::{io, net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    config::{ACCEPT_ERROR_BACKOFF, ServerConfig},
    registry::ClientRegistry,
    session::run_session,
    shutdown::ShutdownHandle,
};

pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    config: Arc<ServerConfig>,
    shutdown: ShutdownHandle,
}

impl ChatServer {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self::from_listener(listener, config))
    }

    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            registry: Arc::new(ClientRegistry::new()),
            config: Arc::new(config),
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accepts until the shutdown signal is set, then tears everything down.
    pub async fn run(self) {
        let ChatServer {
            listener,
            registry,
            config,
            shutdown,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!("chat server listening on {}", addr);
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                res = listener.accept() => match res {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "accepted connection");
                        tasks.retain(|task| !task.is_finished());
                        tasks.push(tokio::spawn(run_session(
                            stream,
                            peer,
                            registry.clone(),
                            config.clone(),
                            shutdown.client_token(),
                        )));
                    }
                    Err(e) => {
                        // Persistent faults such as EMFILE would otherwise
                        // spin the loop.
                        warn!("failed to accept connection: {}", e);
                        if shutdown.pause(ACCEPT_ERROR_BACKOFF).await {
                            break;
                        }
                    }
                }
            }
        }

        info!(clients = registry.len(), "shutting down");

        for (id, record) in registry.snapshot() {
            record.queue.close();
            record.closer.cancel();
            debug!(client = %id, name = %record.name, "closed client");
        }

        drop(listener);
        info!("listener closed");

        let join_timeout = config.join_timeout();
        let joined = join_all(tasks.into_iter().map(|task| timeout(join_timeout, task))).await;
        let overran = joined.iter().filter(|res| res.is_err()).count();
        if overran > 0 {
            warn!(overran, "client tasks still running after {:?}", join_timeout);
        }

        registry.clear();
        info!("chat server closed cleanly");
    }
}
