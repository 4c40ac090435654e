// * Operations: logging, metrics and run statistics

pub mod telemetry;

pub use telemetry::{
    get_metrics_string, init_tracing, record_store_error, start_metrics_server,
    MetricsServerHandle, PipelineStats, StatsSnapshot,
};
