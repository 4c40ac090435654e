// * Beacon-Flow: real-time PV/UV aggregation from a tailed beacon access log

pub mod aggregate;
pub mod config;
pub mod ingest;
pub mod ops;
pub mod pipeline;
pub mod store;

pub use pipeline::{Pipeline, PipelineError, PipelineHandle};
