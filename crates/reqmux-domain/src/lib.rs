//! reqmux-domain: request model for the batching client
//!
//! This crate contains the pieces shared by every part of the multiplexer:
//! - Request descriptors and fetch policies
//! - Deduplication keys
//! - Wire envelopes
//! - The cache contract and an in-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                reqmux-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  request.rs  - Descriptors & fetch policy   │
//! │  keyer.rs    - Dedup key derivation         │
//! │  envelope.rs - Wire format                  │
//! │  cache/      - Cache contract & memory cache│
//! │  error.rs    - Error taxonomy               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod envelope;
pub mod error;
pub mod keyer;
pub mod request;

// Re-export commonly used types at the crate root
pub use cache::{Cache, MemoryCache, MemoryCacheConfig};
pub use envelope::{InboundEnvelope, OutboundEnvelope, WireRequest, WireResponse};
pub use error::{FetchError, MuxError, MuxResult};
pub use keyer::{DedupKey, RequestKeyer, Sha256Keyer};
pub use request::{FetchPolicy, RequestDefaults, RequestDescriptor, RequestId, RequestSpec};
