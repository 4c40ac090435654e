// * Event Parser Workers
// * Turns raw log lines into visit events and hands each one to the PV and UV stages

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::ingest::classifier::{Classifier, PageClassification};
use crate::ingest::payload::{TrackingPayload, VisitorId};
use crate::ops::telemetry::PipelineStats;

/// Raw line queue shared by all parser workers
pub type SharedLineReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Unit handed to the aggregators; read-only once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitEvent {
    pub payload: TrackingPayload,
    pub visitor: VisitorId,
    pub page: PageClassification,
}

impl VisitEvent {
    /// True for lines that carried no beacon payload
    pub fn is_degenerate(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Parses lines into [`VisitEvent`]s; malformed lines become degenerate events
#[derive(Debug, Clone, Default)]
pub struct EventParser {
    classifier: Classifier,
}

impl EventParser {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub fn parse(&self, line: &str) -> VisitEvent {
        let payload = TrackingPayload::extract(line);
        let visitor = payload.visitor_id();
        let page = self.classifier.classify(&payload.url, &payload.time);
        VisitEvent {
            payload,
            visitor,
            page,
        }
    }

    /// Worker loop; exits once the line queue is closed and drained
    ///
    /// Both downstream sends must complete before the next line is taken, so a
    /// slow aggregator throttles every worker.
    pub async fn run(
        self,
        worker: usize,
        lines: SharedLineReceiver,
        pv_tx: mpsc::Sender<Arc<VisitEvent>>,
        uv_tx: mpsc::Sender<Arc<VisitEvent>>,
        stats: Arc<PipelineStats>,
    ) {
        debug!(worker, "Parser worker started");

        loop {
            // * Lock only for the receive; parsing runs unlocked
            let line = {
                let mut rx = lines.lock().await;
                rx.recv().await
            };
            let Some(line) = line else {
                break;
            };

            let event = Arc::new(self.parse(&line));
            stats.record_event(event.page.page_type);
            if event.is_degenerate() {
                debug!(worker, "Line without beacon payload, counting under default page");
            }

            if pv_tx.send(Arc::clone(&event)).await.is_err() {
                warn!(worker, "PV queue closed, parser stopping");
                break;
            }
            if uv_tx.send(event).await.is_err() {
                warn!(worker, "UV queue closed, parser stopping");
                break;
            }
        }

        debug!(worker, "Parser worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classifier::PageType;

    #[test]
    fn test_parse_detail_line() {
        let event = EventParser::default()
            .parse(" /dig?time=1&url=http://x/movie/42.html&refer=http://x/&ua=UA1 HTTP/1.1");
        assert_eq!(event.page.page_type, PageType::Detail);
        assert_eq!(event.page.resource_id, 42);
        assert_eq!(event.page.time, "1");
        assert_eq!(event.visitor, VisitorId::derive("http://x/", "UA1"));
        assert!(!event.is_degenerate());
    }

    #[test]
    fn test_parse_line_without_marker() {
        let event = EventParser::default().parse("GET /favicon.ico HTTP/1.1");
        assert!(event.is_degenerate());
        assert_eq!(event.page.page_type.tag(), "home");
        assert_eq!(event.page.resource_id, 1);
        assert_eq!(event.visitor, VisitorId::derive("", ""));
    }

    #[tokio::test]
    async fn test_worker_sends_each_event_to_both_queues() {
        let (line_tx, line_rx) = mpsc::channel(4);
        let (pv_tx, mut pv_rx) = mpsc::channel(4);
        let (uv_tx, mut uv_rx) = mpsc::channel(4);
        let stats = Arc::new(PipelineStats::new());

        let worker = tokio::spawn(EventParser::default().run(
            0,
            Arc::new(Mutex::new(line_rx)),
            pv_tx,
            uv_tx,
            stats.clone(),
        ));

        line_tx
            .send(" /dig?url=http://x/list/3.html&refer=a&ua=b HTTP/1.1".to_string())
            .await
            .unwrap();
        drop(line_tx);
        worker.await.unwrap();

        let pv = pv_rx.recv().await.unwrap();
        let uv = uv_rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&pv, &uv));
        assert_eq!(pv.page.page_type, PageType::List);
        assert!(pv_rx.recv().await.is_none());
        assert_eq!(stats.snapshot().events_parsed, 1);
    }
}
