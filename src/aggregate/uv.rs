// * Unique-visitor deduplication
// * Tests each visitor against a day-scoped HyperLogLog; only first sightings are counted

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::aggregate::buckets::{resolve_instant, visitor_set_key, Clock};
use crate::aggregate::command::{CounterKind, IncrementCommand};
use crate::config::constants::HLL_KEY_PREFIX;
use crate::config::TimeBasis;
use crate::ingest::VisitEvent;
use crate::ops::telemetry::{record_store_error, PipelineStats};
use crate::store::CounterStore;

/// Outcome of testing one visit against the day's visitor set
#[derive(Debug, Clone, PartialEq)]
pub enum VisitCheck {
    /// First sighting today
    New(IncrementCommand),
    /// Already counted today
    Seen,
    /// Store unreachable; the visit is not counted
    Unavailable,
}

impl VisitCheck {
    pub fn into_command(self) -> Option<IncrementCommand> {
        match self {
            VisitCheck::New(command) => Some(command),
            VisitCheck::Seen | VisitCheck::Unavailable => None,
        }
    }
}

pub struct UvDeduplicator {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    time_basis: TimeBasis,
    ttl_secs: u64,
}

impl UvDeduplicator {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        time_basis: TimeBasis,
        ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            clock,
            time_basis,
            ttl_secs,
        }
    }

    /// Tests the visitor against the day's set
    ///
    /// Store errors are never counted: UV undercounts rather than overcounts.
    pub async fn check(&self, event: &VisitEvent) -> VisitCheck {
        let instant = resolve_instant(self.time_basis, &event.payload.time, self.clock.as_ref());
        let key = visitor_set_key(HLL_KEY_PREFIX, instant);

        match self
            .store
            .pfadd_with_ttl(&key, event.visitor.as_str(), self.ttl_secs)
            .await
        {
            Ok(true) => VisitCheck::New(IncrementCommand::unit(CounterKind::Uv, event.page.clone())),
            Ok(false) => VisitCheck::Seen,
            Err(e) => {
                record_store_error("pfadd");
                warn!(key = %key, error = %e, "Visitor set check failed, skipping UV");
                VisitCheck::Unavailable
            }
        }
    }

    /// Runs until the event queue is closed and drained
    pub async fn run(
        self,
        mut events: mpsc::Receiver<Arc<VisitEvent>>,
        commands: mpsc::Sender<IncrementCommand>,
        stats: Arc<PipelineStats>,
    ) {
        debug!(ttl_secs = self.ttl_secs, "UV deduplicator started");

        while let Some(event) = events.recv().await {
            let command = match self.check(&event).await {
                VisitCheck::New(command) => command,
                VisitCheck::Seen => {
                    stats.record_uv_duplicate();
                    continue;
                }
                VisitCheck::Unavailable => continue,
            };
            if commands.send(command).await.is_err() {
                warn!("Command queue closed, UV deduplicator stopping");
                break;
            }
            stats.record_command(CounterKind::Uv);
        }

        debug!("UV deduplicator stopped");
    }
}
