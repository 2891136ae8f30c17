use std::{
    io::{self, Write},
    sync::Arc,
};

use chat_relay::{ChatClient, ClientConfig, Console};
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

struct Terminal;

impl Terminal {
    fn print(&self, text: &str) {
        // `\r` overwrites the pending "> " prompt.
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r{}\n> ", text.trim_end_matches('\n'));
        let _ = out.flush();
    }
}

impl Console for Terminal {
    fn show(&self, text: &str) {
        self.print(text);
    }

    fn notice(&self, text: &str) {
        self.print(&format!("*** {}", text));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let client = ChatClient::new(config, Arc::new(Terminal));
    client.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}
