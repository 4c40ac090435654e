// * Redis-backed counter store
// * One multiplexed ConnectionManager shared by the UV stage, the writer and the keep-alive

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::store::{CounterStore, StoreError, StoreFuture};

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connects to `redis_url`; failure is a fatal startup error
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url = redis_url, "Counter store connected");
        Ok(Self { conn })
    }
}

impl CounterStore for RedisCounterStore {
    fn zincrby<'a>(&'a self, key: &'a str, by: i64, member: &'a str) -> StoreFuture<'a, f64> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let score: f64 = conn.zincr(key, member, by).await?;
            Ok(score)
        })
    }

    fn pfadd_with_ttl<'a>(
        &'a self,
        key: &'a str,
        element: &'a str,
        ttl_secs: u64,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            // * PFADD has no expiry option; pair it with EXPIRE atomically
            let (added,): (i64,) = redis::pipe()
                .atomic()
                .pfadd(key, element)
                .expire(key, ttl_secs as i64)
                .ignore()
                .query_async(&mut conn)
                .await?;
            match added {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(StoreError::UnexpectedReply {
                    command: "PFADD",
                    detail: other.to_string(),
                }),
            }
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: redis::Value = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
    }
}
