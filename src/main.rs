use beacon_flow::config::constants::{DEFAULT_REDIS_URL, DEFAULT_WORKERS};
use beacon_flow::config::{PipelineConfig, TimeBasis};
use beacon_flow::ops::telemetry::{init_tracing, start_metrics_server};
use beacon_flow::store::RedisCounterStore;
use beacon_flow::{Pipeline, PipelineError};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Tails a beacon access log and aggregates PV/UV counters into Redis
#[derive(Parser, Debug)]
#[command(name = "beacon-flow", version)]
struct Cli {
    /// Access log written by the tracking beacon
    #[arg(long = "log-file-path", default_value = "/var/log/nginx/dig.log")]
    log_file_path: PathBuf,

    /// Number of parser workers
    #[arg(long, alias = "routine-num", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// File for this program's own operational log (stdout if unset)
    #[arg(short = 'l', long = "log-output")]
    log_output: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_REDIS_URL)]
    redis_url: String,

    /// Attribute counters to aggregation time or to the beacon's own timestamp
    #[arg(long, default_value = "aggregation")]
    bucket_time: TimeBasis,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // * Initialize Telemetry
    let _log_guard = init_tracing("info", cli.log_output.as_deref());

    info!(
        log_file_path = %cli.log_file_path.display(),
        workers = cli.workers,
        "Beacon-Flow starting"
    );

    if let Err(e) = run(cli).await {
        error!(error = %e, "Fatal startup error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    let store = RedisCounterStore::connect(&cli.redis_url).await?;

    let metrics = match cli.metrics_port {
        Some(port) => Some(start_metrics_server(port).await),
        None => None,
    };

    let config = PipelineConfig::new(cli.log_file_path)
        .with_workers(cli.workers)
        .with_time_basis(cli.bucket_time);
    let handle = Pipeline::new(config, Arc::new(store)).start().await?;

    shutdown_signal().await;

    let stats = handle.shutdown().await;
    info!(
        lines = stats.lines_read,
        pv = stats.pv_commands,
        uv = stats.uv_commands,
        "Beacon-Flow stopped"
    );

    if let Some(metrics) = metrics {
        if !metrics.is_running() {
            warn!("Metrics server had already stopped before shutdown");
        }
        metrics.shutdown();
    }
    Ok(())
}

// * Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
