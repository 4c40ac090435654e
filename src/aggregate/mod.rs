// * Aggregation: PV counting, UV deduplication and counter fan-out

pub mod buckets;
pub mod command;
pub mod pv;
pub mod uv;
pub mod writer;

pub use buckets::{counter_keys, Clock, Granularity, ManualClock, SystemClock};
pub use command::{CounterKind, IncrementCommand, IncrementOp};
pub use pv::PvAggregator;
pub use uv::{UvDeduplicator, VisitCheck};
pub use writer::{CounterWriter, WriteReport};
