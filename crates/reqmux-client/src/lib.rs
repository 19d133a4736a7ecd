//! reqmux-client: batching request multiplexer
//!
//! This crate turns many logical read requests into few network round trips:
//! - Time-windowed batching with a debounce and a latency cap
//! - Deduplication of identical requests by content key
//! - Fetch-policy driven cache reads and writes
//! - Rank-based rejection of stale responses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               reqmux-client                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration loading     │
//! │  callbacks.rs   - Per-request callbacks     │
//! │  multiplexer/   - Batching core             │
//! │    scheduler.rs   - Flush timing            │
//! │    gateway.rs     - Fetch policies          │
//! │    router.rs      - Response routing        │
//! │  transport/     - Envelope transport        │
//! │  observability/ - Logging setup             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod callbacks;
pub mod config;
pub mod multiplexer;
pub mod observability;
pub mod transport;

// Re-exports for convenience
pub use callbacks::{CallbackFns, RequestCallbacks};
pub use config::{ConfigLoadError, MultiplexerConfig};
pub use multiplexer::{Multiplexer, MultiplexerBuilder, RequestHandle, Submission};
pub use transport::{HttpTransport, Transport, TransportError};

pub use reqmux_domain::{
    Cache, DedupKey, FetchError, FetchPolicy, MemoryCache, MemoryCacheConfig, MuxError,
    MuxResult, RequestKeyer, RequestSpec,
};
