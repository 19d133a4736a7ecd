//! Observability setup.
//!
//! The multiplexer emits `tracing` events and `metrics` counters; this
//! module only installs a subscriber for binaries and tests that want one.

mod logging;

pub use logging::{capture_subscriber, init_logging, LogFormat, LoggingConfig};
