// * Counter Store
// * Ranked counters and day-scoped visitor sets behind a Redis-compatible protocol

pub mod keepalive;
pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub use keepalive::spawn_keepalive;
pub use memory::InMemoryCounterStore;
pub use redis_store::RedisCounterStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unexpected reply to {command}: {detail}")]
    UnexpectedReply {
        command: &'static str,
        detail: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Boxed future returned by [`CounterStore`] operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Remote operations the pipeline needs from the counter store
pub trait CounterStore: Send + Sync {
    /// `ZINCRBY key by member`; resolves to the member's new score
    fn zincrby<'a>(&'a self, key: &'a str, by: i64, member: &'a str) -> StoreFuture<'a, f64>;

    /// Adds `element` to the HyperLogLog at `key` and (re)arms its expiry
    ///
    /// Resolves to true when the element was not observed before.
    fn pfadd_with_ttl<'a>(
        &'a self,
        key: &'a str,
        element: &'a str,
        ttl_secs: u64,
    ) -> StoreFuture<'a, bool>;

    /// Liveness probe; any reply counts as healthy
    fn ping(&self) -> StoreFuture<'_, ()>;
}
