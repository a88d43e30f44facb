use anyhow::Context;
use clap::Parser;
use mcp_coordinator::{Coordinator, CoordinatorSettings, Manifest, ShutdownSignal};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mcp-coordinator",
    version,
    about = "Serve many stdio MCP servers through one MCP endpoint"
)]
struct Cli {
    /// Manifest of servers; defaults to manifest.json next to the executable
    #[arg(long, env = "MCP_COORDINATOR_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Upper bound on a single tools/list or tools/call round-trip
    #[arg(long, default_value_t = 60)]
    call_timeout_secs: u64,

    /// Upper bound on spawn-to-initialized for a server
    #[arg(long, default_value_t = 30)]
    handshake_timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL when stopping a server
    #[arg(long, default_value_t = 2000)]
    termination_grace_ms: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn default_manifest_path() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the coordinator executable")?;
    let dir = exe
        .parent()
        .context("coordinator executable has no parent directory")?;
    Ok(dir.join("manifest.json"))
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcp_coordinator=info"));
    // stdout carries the protocol
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(run(cli));
    // The stdin reader sits in a blocking read for as long as the client
    // holds the pipe open; waiting on it would keep the process alive.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut signals = ShutdownSignal::install().context("failed to install signal handlers")?;

    let manifest_path = match cli.manifest {
        Some(path) => path,
        None => default_manifest_path()?,
    };
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;
    info!(
        "Loaded {} servers from {}",
        manifest.len(),
        manifest_path.display()
    );

    let settings = CoordinatorSettings::builder()
        .call_timeout(Duration::from_secs(cli.call_timeout_secs))
        .handshake_timeout(Duration::from_secs(cli.handshake_timeout_secs))
        .termination_grace(Duration::from_millis(cli.termination_grace_ms))
        .build()
        .context("invalid coordinator settings")?;

    let coordinator = Coordinator::new(manifest, settings);
    let service = tokio::select! {
        served = coordinator.server().serve(rmcp::transport::stdio()) => {
            Some(served.context("failed to start MCP server on stdio")?)
        }
        name = signals.recv() => {
            info!("Received {} before the client initialized, shutting down", name);
            None
        }
    };

    if let Some(service) = service {
        info!("mcp-coordinator serving on stdio");
        tokio::select! {
            quit = service.waiting() => match quit {
                Ok(reason) => info!("Client session ended: {:?}", reason),
                Err(e) => error!("MCP server task failed: {}", e),
            },
            name = signals.recv() => info!("Received {}, shutting down", name),
        }
    }

    let report = coordinator.shutdown().await;
    if !report.all_terminated() {
        warn!("Some server processes could not be confirmed terminated");
    }
    Ok(())
}
