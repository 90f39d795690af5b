//! sheetd CLI - drive spreadsheet automation sessions from the shell

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use sheetd_client::{
    ClientConfig, CommandClient, Forwarder, SupervisorConfig, WorkerSupervisor,
};
use sheetd_tools::{ToolAdapter, ToolEnvelope};

#[derive(Parser)]
#[command(name = "sheetd")]
#[command(
    author,
    version,
    about = "Spreadsheet automation sessions over a background worker"
)]
struct Cli {
    /// Worker host.
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Worker port.
    #[arg(long, global = true, default_value_t = sheetd_protocol::DEFAULT_PORT)]
    port: u16,

    /// Path to the sheetd-worker executable (default: next to this binary).
    #[arg(long, global = true)]
    worker_exe: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a workbook and print the new session id
    Begin {
        /// Workbook file to open
        path: PathBuf,
    },

    /// Save (unless --discard) and close a session
    Commit {
        /// Session id from `begin`
        session: String,

        /// Close without saving
        #[arg(long)]
        discard: bool,

        /// Save timeout in seconds (clamped by the worker)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List live sessions
    List,

    /// Probe worker liveness
    Ping,

    /// Invoke any tool action with JSON parameters
    Call {
        /// Action name, e.g. "range.set-values"
        action: String,

        /// JSON parameter object
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// Ask the worker to drain its sessions and exit
    ShutdownWorker,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let adapter = build_adapter(&cli);

    let envelope = match &cli.command {
        Commands::Begin { path } => adapter.run("batch.begin", &json!({ "path": path })).await,
        Commands::Commit {
            session,
            discard,
            timeout_secs,
        } => {
            let mut params = json!({ "session": session, "save": !discard });
            if let Some(secs) = timeout_secs {
                params["timeout_ms"] = json!(secs * 1000);
            }
            adapter.run("batch.commit", &params).await
        }
        Commands::List => adapter.run("batch.list", &json!({})).await,
        Commands::Ping => adapter.run("worker.ping", &json!({})).await,
        Commands::Call { action, params } => {
            let params: serde_json::Value = serde_json::from_str(params)
                .with_context(|| format!("invalid JSON in --params: {params}"))?;
            adapter.run(action, &params).await
        }
        Commands::ShutdownWorker => adapter.run("worker.shutdown", &json!({})).await,
    };

    print_envelope(&envelope)?;
    if envelope.is_error {
        std::process::exit(1);
    }
    Ok(())
}

fn build_adapter(cli: &Cli) -> ToolAdapter {
    let config = SupervisorConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..SupervisorConfig::default()
    };
    let executable = cli
        .worker_exe
        .clone()
        .unwrap_or_else(find_worker_exe);
    let supervisor = Arc::new(WorkerSupervisor::with_executable(config, executable));
    let client = CommandClient::new(ClientConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..ClientConfig::default()
    });
    ToolAdapter::new(Arc::new(Forwarder::new(supervisor, client)))
}

fn print_envelope(envelope: &ToolEnvelope) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(envelope).context("failed to render result envelope")?;
    println!("{rendered}");
    Ok(())
}

/// Locate the worker executable next to the current binary, falling back to
/// the development target directory and finally PATH lookup.
fn find_worker_exe() -> PathBuf {
    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        let candidate = exe.join("sheetd-worker");
        if candidate.exists() {
            return candidate;
        }
    }

    for profile in ["release", "debug"] {
        let candidate = PathBuf::from(format!("target/{profile}/sheetd-worker"));
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from("sheetd-worker")
}
