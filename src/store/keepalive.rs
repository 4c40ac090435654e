// * Counter store keep-alive
// * Periodic PING so idle connections are not dropped, independent of pipeline traffic

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::ops::telemetry::record_store_error;
use crate::store::CounterStore;

/// Spawns the liveness loop; it ends when `token` is cancelled
pub fn spawn_keepalive(
    store: Arc<dyn CounterStore>,
    period: Duration,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let span = tracing::info_span!("keepalive");
    tokio::spawn(
        async move {
            let mut tick = interval(period);
            info!(period_ms = period.as_millis() as u64, "Keep-alive started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        match store.ping().await {
                            Ok(()) => debug!("Counter store alive"),
                            Err(e) => {
                                record_store_error("ping");
                                warn!(error = %e, "Counter store liveness probe failed");
                            }
                        }
                    }
                }
            }

            info!("Keep-alive stopped");
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCounterStore;

    #[tokio::test]
    async fn test_keepalive_pings_until_cancelled() {
        let store = Arc::new(InMemoryCounterStore::new());
        let token = CancellationToken::new();
        let handle = spawn_keepalive(store.clone(), Duration::from_millis(10), token.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        handle.await.unwrap();

        let pings = store.ping_count();
        assert!(pings >= 2, "expected several pings, got {}", pings);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.ping_count(), pings);
    }
}
