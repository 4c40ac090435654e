// * Counter Writer
// * Fans every increment out to six ranked counters; keys are written independently

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::aggregate::buckets::{counter_keys, resolve_instant, Clock};
use crate::aggregate::command::{IncrementCommand, IncrementOp};
use crate::config::TimeBasis;
use crate::ops::telemetry::{record_store_error, PipelineStats};
use crate::store::CounterStore;

/// Outcome of applying one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<String>,
    pub failed: Vec<String>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct CounterWriter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    time_basis: TimeBasis,
}

impl CounterWriter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, time_basis: TimeBasis) -> Self {
        Self {
            store,
            clock,
            time_basis,
        }
    }

    /// Applies `command` to all six keys; a failed key never stops the rest
    pub async fn apply(&self, command: &IncrementCommand) -> WriteReport {
        let instant = resolve_instant(self.time_basis, &command.page.time, self.clock.as_ref());
        let keys = counter_keys(command.kind.as_str(), command.page.page_type, instant);
        let member = command.page.resource_id.to_string();
        let IncrementOp::ScoreBy(by) = command.op;

        let mut report = WriteReport::default();
        for key in keys {
            match self.store.zincrby(&key, by, &member).await {
                Ok(_) => report.written.push(key),
                Err(e) => {
                    record_store_error("zincrby");
                    error!(
                        command = command.op.command_name(),
                        key = %key,
                        member = %member,
                        error = %e,
                        "Counter write failed"
                    );
                    report.failed.push(key);
                }
            }
        }
        report
    }

    /// Runs until every aggregator has dropped its sender
    pub async fn run(self, mut commands: mpsc::Receiver<IncrementCommand>, stats: Arc<PipelineStats>) {
        info!("Counter writer started");

        while let Some(command) = commands.recv().await {
            let report = self.apply(&command).await;
            stats.record_writes(report.written.len(), report.failed.len());
            if !report.is_complete() {
                debug!(
                    kind = %command.kind,
                    failed = report.failed.len(),
                    "Increment partially applied"
                );
            }
        }

        info!("Counter writer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::buckets::ManualClock;
    use crate::aggregate::command::CounterKind;
    use crate::ingest::{Classifier, PageType};
    use crate::store::InMemoryCounterStore;
    use chrono::{Local, NaiveDateTime, TimeZone};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            NaiveDateTime::parse_from_str("2024-01-15 10:42:31", "%Y-%m-%d %H:%M:%S").unwrap(),
        ))
    }

    fn command(kind: CounterKind, url: &str, time: &str) -> IncrementCommand {
        IncrementCommand::unit(kind, Classifier::default().classify(url, time))
    }

    #[tokio::test]
    async fn test_fans_out_to_six_keys() {
        let store = Arc::new(InMemoryCounterStore::new());
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Aggregation);

        let report = writer
            .apply(&command(CounterKind::Pv, "http://x/movie/42.html", "1"))
            .await;
        assert!(report.is_complete());
        assert_eq!(report.written.len(), 6);

        let mut expected = vec![
            "pv_day_1705276800",
            "pv_hour_1705312800",
            "pv_min_1705315320",
            "pv_detail_day_1705276800",
            "pv_detail_hour_1705312800",
            "pv_detail_min_1705315320",
        ];
        expected.sort();
        assert_eq!(store.counter_keys(), expected);
        for key in expected {
            assert_eq!(store.score(key, "42"), Some(1.0));
        }
    }

    #[tokio::test]
    async fn test_failed_key_does_not_abort_others() {
        let store = Arc::new(InMemoryCounterStore::new());
        store.fail_writes_to("uv_hour_1705312800");
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Aggregation);

        let report = writer.apply(&command(CounterKind::Uv, "http://x/list/3.html", "")).await;
        assert_eq!(report.failed, vec!["uv_hour_1705312800".to_string()]);
        assert_eq!(report.written.len(), 5);
        assert_eq!(store.score("uv_min_1705315320", "3"), Some(1.0));
        assert_eq!(store.score("uv_list_min_1705315320", "3"), Some(1.0));
    }

    #[tokio::test]
    async fn test_aggregation_time_ignores_event_timestamp() {
        let store = Arc::new(InMemoryCounterStore::new());
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Aggregation);

        writer
            .apply(&command(CounterKind::Pv, "http://x/", "1600000000"))
            .await;
        assert_eq!(store.score("pv_home_day_1705276800", "1"), Some(1.0));
    }

    #[tokio::test]
    async fn test_event_time_basis_uses_beacon_timestamp() {
        let store = Arc::new(InMemoryCounterStore::new());
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Event);

        writer
            .apply(&command(CounterKind::Pv, "http://x/", "1600000000"))
            .await;

        let event_day = Local
            .timestamp_opt(1_600_000_000, 0)
            .unwrap()
            .naive_local()
            .date()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        assert_eq!(
            store.score(&format!("pv_home_day_{}", event_day), "1"),
            Some(1.0)
        );
        assert_eq!(store.score("pv_home_day_1705276800", "1"), None);
    }

    #[tokio::test]
    async fn test_unclassified_written_as_home() {
        let store = Arc::new(InMemoryCounterStore::new());
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Aggregation);

        let cmd = command(CounterKind::Pv, "", "");
        assert_eq!(cmd.page.page_type, PageType::Unclassified);
        writer.apply(&cmd).await;
        assert_eq!(store.score("pv_home_min_1705315320", "1"), Some(1.0));
    }

    #[tokio::test]
    async fn test_run_drains_queue() {
        let store = Arc::new(InMemoryCounterStore::new());
        let writer = CounterWriter::new(store.clone(), clock(), TimeBasis::Aggregation);
        let (tx, rx) = mpsc::channel(4);
        let stats = Arc::new(PipelineStats::new());
        let task = tokio::spawn(writer.run(rx, stats.clone()));

        tx.send(command(CounterKind::Pv, "http://x/movie/1.html", "")).await.unwrap();
        tx.send(command(CounterKind::Pv, "http://x/movie/1.html", "")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(store.score("pv_day_1705276800", "1"), Some(2.0));
        assert_eq!(stats.snapshot().counter_writes, 12);
    }
}
