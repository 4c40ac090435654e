// * Telemetry - JSON Logging, Prometheus Metrics and Pipeline Stats
// * Structured operational logging plus counters that make lossy defaults visible

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter, CounterVec, Encoder, IntCounter, TextEncoder,
    TEXT_FORMAT,
};
use serde::Serialize;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::aggregate::command::CounterKind;
use crate::ingest::PageType;

lazy_static! {
    // * Raw lines taken off the access log
    pub static ref LINES_READ_TOTAL: IntCounter = register_int_counter!(
        "beacon_lines_read_total",
        "Total raw lines read from the access log"
    ).expect("register beacon_lines_read_total");

    // * Parsed events by page type, including unclassified defaults
    pub static ref EVENTS_PARSED_TOTAL: CounterVec = register_counter_vec!(
        "beacon_events_parsed_total",
        "Visit events parsed by page type",
        &["page_type"]
    ).expect("register beacon_events_parsed_total");

    // * Increment commands emitted by kind
    pub static ref COMMANDS_TOTAL: CounterVec = register_counter_vec!(
        "beacon_commands_total",
        "Increment commands emitted by counter kind",
        &["kind"]
    ).expect("register beacon_commands_total");

    // * Visits dropped from the UV path as already seen today
    pub static ref UV_DUPLICATES_TOTAL: IntCounter = register_int_counter!(
        "beacon_uv_duplicates_total",
        "Visits not counted as unique visitors"
    ).expect("register beacon_uv_duplicates_total");

    // * Counter key writes by outcome
    pub static ref COUNTER_WRITES_TOTAL: CounterVec = register_counter_vec!(
        "beacon_counter_writes_total",
        "Ranked counter writes by outcome",
        &["outcome"]
    ).expect("register beacon_counter_writes_total");

    // * Counter store errors by operation
    pub static ref STORE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "beacon_store_errors_total",
        "Counter store errors by operation",
        &["op"]
    ).expect("register beacon_store_errors_total");
}

/// Initializes JSON tracing, writing to `log_output` when it can be opened
///
/// Falls back to stdout otherwise. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
pub fn init_tracing(level: &str, log_output: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let file = log_output.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.display().to_string(), e))
    });

    match file {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .init();
            Some(guard)
        }
        Some(Err((path, e))) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
            tracing::warn!(path = %path, error = %e, "Cannot open log output, using stdout");
            None
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
            None
        }
    }
}

/// Records a counter store error for `op`
pub fn record_store_error(op: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[op]).inc();
}

/// Returns the current metrics in Prometheus text format
pub fn get_metrics_string() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Running totals for one pipeline instance, mirrored into Prometheus
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    events_parsed: AtomicU64,
    unclassified_events: AtomicU64,
    pv_commands: AtomicU64,
    uv_commands: AtomicU64,
    uv_duplicates: AtomicU64,
    counter_writes: AtomicU64,
    counter_write_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub events_parsed: u64,
    pub unclassified_events: u64,
    pub pv_commands: u64,
    pub uv_commands: u64,
    pub uv_duplicates: u64,
    pub counter_writes: u64,
    pub counter_write_failures: u64,
}

impl StatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
        LINES_READ_TOTAL.inc();
    }

    pub fn record_event(&self, page_type: PageType) {
        self.events_parsed.fetch_add(1, Ordering::Relaxed);
        if page_type == PageType::Unclassified {
            self.unclassified_events.fetch_add(1, Ordering::Relaxed);
        }
        EVENTS_PARSED_TOTAL
            .with_label_values(&[page_type.label()])
            .inc();
    }

    pub fn record_command(&self, kind: CounterKind) {
        let counter = match kind {
            CounterKind::Pv => &self.pv_commands,
            CounterKind::Uv => &self.uv_commands,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        COMMANDS_TOTAL.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_uv_duplicate(&self) {
        self.uv_duplicates.fetch_add(1, Ordering::Relaxed);
        UV_DUPLICATES_TOTAL.inc();
    }

    pub fn record_writes(&self, written: usize, failed: usize) {
        self.counter_writes.fetch_add(written as u64, Ordering::Relaxed);
        self.counter_write_failures.fetch_add(failed as u64, Ordering::Relaxed);
        COUNTER_WRITES_TOTAL
            .with_label_values(&["ok"])
            .inc_by(written as f64);
        COUNTER_WRITES_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            events_parsed: self.events_parsed.load(Ordering::Relaxed),
            unclassified_events: self.unclassified_events.load(Ordering::Relaxed),
            pv_commands: self.pv_commands.load(Ordering::Relaxed),
            uv_commands: self.uv_commands.load(Ordering::Relaxed),
            uv_duplicates: self.uv_duplicates.load(Ordering::Relaxed),
            counter_writes: self.counter_writes.load(Ordering::Relaxed),
            counter_write_failures: self.counter_write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics server handle for graceful shutdown
pub struct MetricsServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl MetricsServerHandle {
    /// Signals the metrics server to shut down
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Serves `/metrics` and `/health` on `port`
pub async fn start_metrics_server(port: u16) -> MetricsServerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tokio::spawn(async move {
        let make_svc = hyper::service::make_service_fn(|_conn| async {
            Ok::<_, std::convert::Infallible>(hyper::service::service_fn(handle_metrics_request))
        });

        let server = match hyper::Server::try_bind(&addr) {
            Ok(builder) => builder.serve(make_svc).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            }),
            Err(e) => {
                tracing::error!(port = port, error = %e, "Metrics server bind failed");
                running_clone.store(false, Ordering::Relaxed);
                return;
            }
        };

        tracing::info!(port = port, "Metrics server started");

        if let Err(e) = server.await {
            tracing::error!(error = %e, "Metrics server error");
        }

        running_clone.store(false, Ordering::Relaxed);
        tracing::info!("Metrics server stopped");
    });

    MetricsServerHandle {
        shutdown_tx: Some(shutdown_tx),
        running,
    }
}

async fn handle_metrics_request(
    req: hyper::Request<hyper::Body>,
) -> Result<hyper::Response<hyper::Body>, std::convert::Infallible> {
    let (status, content_type, body) = match req.uri().path() {
        "/metrics" => (hyper::StatusCode::OK, TEXT_FORMAT, get_metrics_string()),
        "/health" => (hyper::StatusCode::OK, "text/plain", "OK".to_string()),
        _ => (hyper::StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };

    let response = hyper::Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, content_type)
        .body(hyper::Body::from(body))
        .unwrap_or_else(|_| hyper::Response::new(hyper::Body::empty()));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = PipelineStats::new();
        stats.record_line();
        stats.record_line();
        stats.record_event(PageType::Detail);
        stats.record_event(PageType::Unclassified);
        stats.record_command(CounterKind::Pv);
        stats.record_command(CounterKind::Uv);
        stats.record_uv_duplicate();
        stats.record_writes(5, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines_read, 2);
        assert_eq!(snapshot.events_parsed, 2);
        assert_eq!(snapshot.unclassified_events, 1);
        assert_eq!(snapshot.pv_commands, 1);
        assert_eq!(snapshot.uv_commands, 1);
        assert_eq!(snapshot.uv_duplicates, 1);
        assert_eq!(snapshot.counter_writes, 5);
        assert_eq!(snapshot.counter_write_failures, 1);
    }

    #[test]
    fn test_snapshot_json() {
        let json = StatsSnapshot::default().to_json();
        assert!(json.contains("\"lines_read\":0"));
        assert!(json.contains("\"counter_write_failures\":0"));
    }

    #[test]
    fn test_metrics_string_contains_pipeline_counters() {
        PipelineStats::new().record_event(PageType::Unclassified);
        record_store_error("zincrby");
        let metrics = get_metrics_string();
        assert!(metrics.contains("beacon_events_parsed_total"));
        assert!(metrics.contains("unclassified"));
        assert!(metrics.contains("beacon_store_errors_total"));
    }

    #[tokio::test]
    async fn test_metrics_route_sets_prometheus_content_type() {
        let req = hyper::Request::builder()
            .uri("/metrics")
            .body(hyper::Body::empty())
            .unwrap();
        let response = handle_metrics_request(req).await.unwrap();
        assert_eq!(response.status(), hyper::StatusCode::OK);
        assert_eq!(
            response.headers()[hyper::header::CONTENT_TYPE],
            TextEncoder::new().format_type()
        );

        let req = hyper::Request::builder()
            .uri("/nope")
            .body(hyper::Body::empty())
            .unwrap();
        let response = handle_metrics_request(req).await.unwrap();
        assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_server_handle() {
        let running = Arc::new(AtomicBool::new(true));
        let handle = MetricsServerHandle {
            shutdown_tx: None,
            running: running.clone(),
        };

        assert!(handle.is_running());
        handle.shutdown();
        assert!(!running.load(Ordering::Relaxed));
    }
}
