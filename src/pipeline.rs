// * Pipeline Wiring
// * Tailer -> N parsers -> {PV, UV} -> writer, connected by bounded queues
// *
// * Every send to a full queue waits, which is the only flow control: a slow
// * writer throttles the aggregators, then the parsers, then the tailer.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::aggregate::{Clock, CounterWriter, PvAggregator, SystemClock, UvDeduplicator};
use crate::config::PipelineConfig;
use crate::ingest::{Classifier, EventParser, TailError, Tailer};
use crate::ops::telemetry::{PipelineStats, StatsSnapshot};
use crate::store::{spawn_keepalive, CounterStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tail(#[from] TailError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builder for one pipeline instance
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    classifier: Classifier,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            classifier: Classifier::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Opens the log and spawns every stage
    ///
    /// Fails only if the log file cannot be opened; nothing is spawned then.
    pub async fn start(self) -> Result<PipelineHandle, PipelineError> {
        let config = self.config;
        let workers = config.workers.max(1);

        let tailer = Tailer::open(&config.log_path, config.eof_backoff, config.progress_every()).await?;

        let token = CancellationToken::new();
        let stats = Arc::new(PipelineStats::new());

        let (line_tx, line_rx) = mpsc::channel::<String>(config.raw_queue_capacity());
        let (pv_tx, pv_rx) = mpsc::channel(config.stage_queue_capacity());
        let (uv_tx, uv_rx) = mpsc::channel(config.stage_queue_capacity());
        let (command_tx, command_rx) = mpsc::channel(config.stage_queue_capacity());

        info!(
            path = %config.log_path.display(),
            workers,
            raw_capacity = config.raw_queue_capacity(),
            stage_capacity = config.stage_queue_capacity(),
            time_basis = ?config.time_basis,
            "Pipeline starting"
        );

        let mut tasks: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(workers + 5);

        tasks.push((
            "keepalive".to_string(),
            spawn_keepalive(self.store.clone(), config.keepalive_interval, token.child_token()),
        ));

        let tailer_token = token.clone();
        let tailer_stats = stats.clone();
        tasks.push((
            "tailer".to_string(),
            tokio::spawn(
                async move {
                    tailer.run(line_tx, tailer_token, tailer_stats).await;
                }
                .instrument(info_span!("tailer")),
            ),
        ));

        let shared_lines = Arc::new(Mutex::new(line_rx));
        for worker in 0..workers {
            let parser = EventParser::new(self.classifier.clone());
            tasks.push((
                format!("parser-{}", worker),
                tokio::spawn(
                    parser
                        .run(
                            worker,
                            shared_lines.clone(),
                            pv_tx.clone(),
                            uv_tx.clone(),
                            stats.clone(),
                        )
                        .instrument(info_span!("parser", worker)),
                ),
            ));
        }
        // * Queues close once every parser has dropped its clone
        drop(pv_tx);
        drop(uv_tx);

        tasks.push((
            "pv".to_string(),
            tokio::spawn(
                PvAggregator::new()
                    .run(pv_rx, command_tx.clone(), stats.clone())
                    .instrument(info_span!("pv")),
            ),
        ));

        let dedup = UvDeduplicator::new(
            self.store.clone(),
            self.clock.clone(),
            config.time_basis,
            config.hll_ttl_secs,
        );
        tasks.push((
            "uv".to_string(),
            tokio::spawn(
                dedup
                    .run(uv_rx, command_tx, stats.clone())
                    .instrument(info_span!("uv")),
            ),
        ));

        let writer = CounterWriter::new(self.store, self.clock, config.time_basis);
        tasks.push((
            "writer".to_string(),
            tokio::spawn(writer.run(command_rx, stats.clone()).instrument(info_span!("writer"))),
        ));

        Ok(PipelineHandle {
            token,
            stats,
            tasks,
        })
    }
}

/// Running pipeline
pub struct PipelineHandle {
    token: CancellationToken,
    stats: Arc<PipelineStats>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl PipelineHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops reading and waits until everything already read has been written
    pub async fn shutdown(self) -> StatsSnapshot {
        info!("Pipeline shutdown requested");
        self.token.cancel();
        self.join().await
    }

    /// Waits for every stage to finish
    pub async fn join(self) -> StatsSnapshot {
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(stage = %name, error = %e, "Pipeline stage panicked");
            }
        }

        let snapshot = self.stats.snapshot();
        info!(stats = %snapshot.to_json(), "Pipeline stopped");
        snapshot
    }
}
