//! sheetd worker process entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sheetd_core::scratch::ScratchEngine;
use sheetd_worker::{run, WorkerConfig};

#[derive(Parser)]
#[command(name = "sheetd-worker")]
#[command(author, version, about = "Spreadsheet automation worker process")]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = sheetd_protocol::DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = WorkerConfig {
        host: args.host,
        port: args.port,
        ..WorkerConfig::default()
    };

    run(config, Arc::new(ScratchEngine)).await?;
    Ok(())
}
