use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use flood::config::{DEFAULT_TARGET, DEFAULT_WORKERS};
use flood::{ConsoleSink, HttpClient, RunConfig};
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Controlled HTTP load generator. Use only on targets you are authorized to test.
#[derive(Parser, Debug)]
#[command(name = "flood", version, about, long_about = None)]
struct Args {
    /// Target base url
    #[arg(short = 't', long, env = "FLOOD_TARGET", default_value = DEFAULT_TARGET)]
    target: String,

    /// Number of concurrent workers
    #[arg(
        short = 'w',
        long,
        env = "FLOOD_WORKERS",
        default_value_t = DEFAULT_WORKERS as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    workers: u64,

    /// Duration of the run in seconds
    #[arg(short = 'd', long, env = "FLOOD_DURATION", default_value_t = 60)]
    duration: u64,

    /// Delay between two requests of one worker, in milliseconds
    #[arg(long, env = "FLOOD_DELAY", default_value_t = 10)]
    delay: u64,

    /// Comma separated endpoint paths, picked at random for every request
    #[arg(
        long,
        env = "FLOOD_ENDPOINTS",
        value_delimiter = ',',
        default_value = "/,/test,/api/stats"
    )]
    endpoints: Vec<String>,

    /// Don't print the configuration banner
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn run_config(&self) -> anyhow::Result<RunConfig> {
        let workers = usize::try_from(self.workers).context("Worker count out of range")?;
        let config = RunConfig::new(self.target.clone())
            .with_workers(workers)
            .with_duration(Duration::from_secs(self.duration))
            .with_delay(Duration::from_millis(self.delay))
            .with_endpoints(self.endpoints.iter().map(|e| e.trim().to_string()));
        config.validate().context("Invalid run configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let config = args.run_config()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let res = rt.block_on(run_flood(config, args.quiet));
    // Pooled connections may still be winding down, they don't hold up the exit.
    rt.shutdown_background();
    res
}

async fn run_flood(config: RunConfig, quiet: bool) -> anyhow::Result<()> {
    let sink = ConsoleSink;
    if !quiet {
        sink.banner(&config);
    }
    let handle = flood::start(config, Arc::new(HttpClient::new()), Arc::new(sink))
        .context("Failed to start run")?;
    handle.stop_on_ctrl_c();
    let outcome = handle.wait().await.context("Run failed")?;
    tracing::debug!(
        launched = outcome.launched,
        drained = outcome.drained,
        aborted = outcome.aborted,
        "run finished"
    );
    Ok(())
}
