//! Public submission types and defaults.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqmux_domain::{RequestDescriptor, RequestId, RequestSpec};

use crate::callbacks::RequestCallbacks;

/// Distinct keys per batch when not configured.
pub const DEFAULT_BATCH_SIZE: usize = 4;
/// Debounce window when not configured.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(8);
/// Latency cap when not configured.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(32);

/// A request plus the callbacks that receive its results.
pub struct Submission {
    pub spec: RequestSpec,
    pub callbacks: Arc<dyn RequestCallbacks>,
}

impl Submission {
    pub fn new(spec: RequestSpec, callbacks: Arc<dyn RequestCallbacks>) -> Self {
        Self { spec, callbacks }
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Returned for every submitted request; pass it to `refresh` to re-fetch.
#[derive(Clone)]
pub struct RequestHandle {
    pub(crate) descriptor: RequestDescriptor,
    pub(crate) callbacks: Arc<dyn RequestCallbacks>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.descriptor.id()
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
