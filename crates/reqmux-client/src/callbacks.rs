//! Per-request callbacks.
//!
//! Every submitted request carries a callback record. The multiplexer holds
//! no reference to whatever renders the results; it only calls back.

use std::fmt;
use std::sync::Arc;

use reqmux_domain::FetchError;
use serde_json::Value;

/// Receives the lifecycle signals of one request.
///
/// `on_loading_delta(+1)` is signalled when a request joins a network batch
/// and `on_loading_delta(-1)` exactly once when that batch resolves, whether
/// the result was delivered, errored or dropped as stale. Callers maintaining
/// an in-flight counter can rely on the two being paired.
///
/// Callbacks run on whichever task resolves the batch and must not block.
pub trait RequestCallbacks: Send + Sync {
    /// Adjusts the caller's in-flight count by `+1` or `-1`.
    fn on_loading_delta(&self, delta: i32);

    /// Delivers a payload, either from cache or from the network.
    ///
    /// Under `CacheAndNetwork` this can fire twice: once with the cached
    /// value and again if the network returns something different.
    fn on_success(&self, payload: &Value);

    /// Delivers a per-request failure. Never called for stale responses.
    fn on_error(&self, error: &FetchError);
}

type LoadingFn = dyn Fn(i32) + Send + Sync;
type SuccessFn = dyn Fn(&Value) + Send + Sync;
type ErrorFn = dyn Fn(&FetchError) + Send + Sync;

/// Closure-backed [`RequestCallbacks`]. Unset handlers are no-ops.
///
/// # Example
///
/// ```rust,ignore
/// let callbacks = CallbackFns::new()
///     .on_loading_delta(|delta| spinner.adjust(delta))
///     .on_success(|payload| render(payload))
///     .on_error(|error| tracing::warn!(%error, "fetch failed"))
///     .into_arc();
/// ```
#[derive(Default)]
pub struct CallbackFns {
    loading: Option<Box<LoadingFn>>,
    success: Option<Box<SuccessFn>>,
    error: Option<Box<ErrorFn>>,
}

impl CallbackFns {
    /// Creates a record with every handler unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler for in-flight count changes.
    pub fn on_loading_delta(mut self, f: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.loading = Some(Box::new(f));
        self
    }

    /// Sets the handler for delivered payloads.
    pub fn on_success(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    /// Sets the handler for per-request failures.
    pub fn on_error(mut self, f: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Wraps the record for [`Submission::new`](crate::Submission::new).
    pub fn into_arc(self) -> Arc<dyn RequestCallbacks> {
        Arc::new(self)
    }
}

impl fmt::Debug for CallbackFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackFns")
            .field("loading", &self.loading.is_some())
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl RequestCallbacks for CallbackFns {
    fn on_loading_delta(&self, delta: i32) {
        if let Some(f) = &self.loading {
            f(delta);
        }
    }

    fn on_success(&self, payload: &Value) {
        if let Some(f) = &self.success {
            f(payload);
        }
    }

    fn on_error(&self, error: &FetchError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }
}
