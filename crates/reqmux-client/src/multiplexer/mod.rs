//! Request multiplexing core.
//!
//! Requests flow through four stages:
//!
//! 1. **Keying**: each request gets a dedup key from its route and data
//! 2. **Cache gateway**: the fetch policy decides between cache and network
//! 3. **Batching**: network-bound requests are grouped by key and flushed
//!    when the batch is full, when the debounce timer fires, or when the
//!    latency cap is reached
//! 4. **Routing**: responses are matched back by index, written to the cache,
//!    and delivered unless a newer send of the same request superseded them
//!
//! State is kept behind a single mutex per multiplexer and is never held
//! across an await point.

mod accumulator;
mod engine;
mod gateway;
mod router;
mod scheduler;
mod types;

pub use engine::{Multiplexer, MultiplexerBuilder};
pub use gateway::{CacheGateway, Resolution};
pub use router::RankLedger;
pub use types::{
    RequestHandle, Submission, DEFAULT_BATCH_SIZE, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY,
};
