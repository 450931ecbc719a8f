use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use flood_target::{router, SharedStats, DEFAULT_MAX_LOGS, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

/// Instrumented target server for load runs.
#[derive(Parser, Debug)]
#[command(name = "flood-target", version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Number of request log entries kept in memory
    #[arg(long, default_value_t = DEFAULT_MAX_LOGS)]
    max_logs: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(run_server(args))
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((args.bind.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    let stats = SharedStats::new(args.max_logs);
    tracing::info!(%addr, "target server listening");

    axum::serve(
        listener,
        router(stats.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server failed")?;

    tracing::info!(
        total_requests = stats.total_requests(),
        "target server shut down"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
