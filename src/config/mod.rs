// * Runtime configuration for the ingestion pipeline

pub mod constants;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use constants::{
    DEFAULT_WORKERS, EOF_BACKOFF_MS, HLL_TTL_SECS, KEEPALIVE_INTERVAL_MS,
    PROGRESS_LINES_PER_WORKER, RAW_QUEUE_FACTOR,
};

/// Which instant a counter increment is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBasis {
    /// Wall-clock time when the command is aggregated
    #[default]
    Aggregation,
    /// The beacon's own `time` field (unix seconds)
    Event,
}

impl FromStr for TimeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aggregation" | "now" => Ok(TimeBasis::Aggregation),
            "event" => Ok(TimeBasis::Event),
            other => Err(format!("unknown time basis '{}', expected 'aggregation' or 'event'", other)),
        }
    }
}

/// Configuration for one pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Access log to tail
    pub log_path: PathBuf,
    /// Number of parser tasks
    pub workers: usize,
    /// Pause after hitting end of file
    pub eof_backoff: Duration,
    /// Liveness probe period against the counter store
    pub keepalive_interval: Duration,
    /// Expiry of each day-scoped visitor set
    pub hll_ttl_secs: u64,
    /// Instant used for time buckets and the daily visitor set
    pub time_basis: TimeBasis,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("/var/log/nginx/dig.log"),
            workers: DEFAULT_WORKERS,
            eof_backoff: Duration::from_millis(EOF_BACKOFF_MS),
            keepalive_interval: Duration::from_millis(KEEPALIVE_INTERVAL_MS),
            hll_ttl_secs: HLL_TTL_SECS,
            time_basis: TimeBasis::Aggregation,
        }
    }
}

impl PipelineConfig {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_eof_backoff(mut self, backoff: Duration) -> Self {
        self.eof_backoff = backoff;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_time_basis(mut self, basis: TimeBasis) -> Self {
        self.time_basis = basis;
        self
    }

    // * Raw lines get extra room to absorb bursty reads ahead of parsing
    pub fn raw_queue_capacity(&self) -> usize {
        RAW_QUEUE_FACTOR * self.workers.max(1)
    }

    pub fn stage_queue_capacity(&self) -> usize {
        self.workers.max(1)
    }

    pub fn progress_every(&self) -> u64 {
        PROGRESS_LINES_PER_WORKER * self.workers.max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_capacities_follow_worker_count() {
        let config = PipelineConfig::new("/tmp/dig.log").with_workers(4);
        assert_eq!(config.raw_queue_capacity(), 12);
        assert_eq!(config.stage_queue_capacity(), 4);
        assert_eq!(config.progress_every(), 4_000);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let config = PipelineConfig::default().with_workers(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.raw_queue_capacity(), 3);
    }

    #[test]
    fn test_time_basis_parsing() {
        assert_eq!("event".parse::<TimeBasis>().unwrap(), TimeBasis::Event);
        assert_eq!("Aggregation".parse::<TimeBasis>().unwrap(), TimeBasis::Aggregation);
        assert!("yesterday".parse::<TimeBasis>().is_err());
        assert_eq!(TimeBasis::default(), TimeBasis::Aggregation);
    }
}
