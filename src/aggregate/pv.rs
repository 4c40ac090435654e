// * Page-view aggregation: one increment per visit, no filtering

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::aggregate::command::{CounterKind, IncrementCommand};
use crate::ingest::VisitEvent;
use crate::ops::telemetry::PipelineStats;

#[derive(Debug, Default)]
pub struct PvAggregator;

impl PvAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn command_for(&self, event: &VisitEvent) -> IncrementCommand {
        IncrementCommand::unit(CounterKind::Pv, event.page.clone())
    }

    /// Runs until the event queue is closed and drained
    pub async fn run(
        self,
        mut events: mpsc::Receiver<Arc<VisitEvent>>,
        commands: mpsc::Sender<IncrementCommand>,
        stats: Arc<PipelineStats>,
    ) {
        debug!("PV aggregator started");

        while let Some(event) = events.recv().await {
            let command = self.command_for(&event);
            if commands.send(command).await.is_err() {
                warn!("Command queue closed, PV aggregator stopping");
                break;
            }
            stats.record_command(CounterKind::Pv);
        }

        debug!("PV aggregator stopped");
    }
}
