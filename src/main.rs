use anyhow::Context;
use chat_relay::{ChatServer, ServerConfig, shutdown::spawn_ctrl_c_handler};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let num_cores = num_cpus::get();
    info!("detected {} CPU cores", num_cores);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cores)
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?
        .block_on(async move {
            let addr = config.bind_addr();
            let server = ChatServer::bind(config)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;

            spawn_ctrl_c_handler(server.shutdown_handle());
            server.run().await;
            Ok::<(), anyhow::Error>(())
        })
}
