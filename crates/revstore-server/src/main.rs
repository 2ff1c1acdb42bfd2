//! revstore server binary.
//!
//! Serves a fresh in-memory engine over TCP.

use std::sync::Arc;

use clap::Parser;
use revstore_core::engine::Engine;
use revstore_server::RevstoreServer;
use tracing::info;

/// revstore server: a document backend speaking JSON lines over TCP.
#[derive(Parser, Debug)]
#[command(name = "revstore-server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:28015")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(listen = %cli.listen, "starting");

    let server = RevstoreServer::bind(Arc::new(Engine::new()), cli.listen.as_str()).await?;
    server.run().await?;

    Ok(())
}
