//! The multiplexer: submission, timer-driven flushing and dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use reqmux_domain::{
    Cache, DedupKey, FetchError, FetchPolicy, MemoryCache, MemoryCacheConfig, MuxError,
    MuxResult, RequestDefaults, RequestDescriptor, RequestId, RequestKeyer, RequestSpec,
    Sha256Keyer,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::accumulator::{FlushedBatch, Insertion, PendingBatch, PendingRequest};
use super::gateway::CacheGateway;
use super::router::{RankLedger, ResponseRouter};
use super::scheduler::{BatchScheduler, TimerAction};
use super::types::{
    RequestHandle, Submission, DEFAULT_BATCH_SIZE, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY,
};
use crate::callbacks::RequestCallbacks;
use crate::config::MultiplexerConfig;
use crate::transport::{HttpTransport, Transport};

/// Coalesces requests into batched round trips.
///
/// Requests submitted within a short window are grouped by dedup key and
/// sent as one envelope. Identical requests share one wire entry and one
/// response. Fetch policies decide whether a request is answered from cache,
/// from the network, or both.
///
/// Cloning is cheap; all clones share one pending batch, one rank counter
/// and one rank ledger.
///
/// # Example
///
/// ```rust,ignore
/// let mux = Multiplexer::builder()
///     .endpoint("https://example.com/batch")
///     .batch_size(5)
///     .min_delay(Duration::from_millis(10))
///     .max_delay(Duration::from_millis(50))
///     .build()?;
///
/// let callbacks = CallbackFns::new()
///     .on_success(|payload| println!("{payload}"))
///     .into_arc();
/// mux.submit(vec![Submission::new(RequestSpec::new("getUsers"), callbacks)]).await;
/// ```
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

struct Inner {
    batch_size: usize,
    defaults: RequestDefaults,
    keyer: Arc<dyn RequestKeyer>,
    gateway: CacheGateway,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    /// Pending batch, timer, rank counter and ledger move together.
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    pending: PendingBatch,
    scheduler: BatchScheduler,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    last_rank: u64,
    ledger: RankLedger,
}

/// A request that passed the cache gateway and needs the network.
struct Admitted {
    key: DedupKey,
    request: PendingRequest,
}

impl Multiplexer {
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::default()
    }

    /// Submits requests, each with its own callbacks.
    ///
    /// Cache hits are delivered before this returns. Requests that need the
    /// network join the pending batch, which may flush immediately when it
    /// reaches the batch size or the latency cap.
    pub async fn submit(&self, submissions: Vec<Submission>) -> Vec<RequestHandle> {
        let mut handles = Vec::with_capacity(submissions.len());
        let mut admitted = Vec::new();

        for Submission { spec, callbacks } in submissions {
            let id = RequestId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            let descriptor = spec.into_descriptor(id, &self.inner.defaults);
            handles.push(RequestHandle {
                descriptor: descriptor.clone(),
                callbacks: Arc::clone(&callbacks),
            });

            if let Some(request) = self.inner.admit(descriptor, callbacks).await {
                admitted.push(request);
            }
        }

        self.inner.enqueue(admitted);
        handles
    }

    /// Submits a single request.
    pub async fn submit_one(
        &self,
        spec: RequestSpec,
        callbacks: Arc<dyn RequestCallbacks>,
    ) -> RequestHandle {
        let mut handles = self.submit(vec![Submission::new(spec, callbacks)]).await;
        // submit returns exactly one handle per submission
        handles.remove(0)
    }

    /// Re-sends a request bypassing the cache read.
    ///
    /// The request keeps its id, so a response to an earlier send that is
    /// still in flight will be dropped as stale.
    pub async fn refresh(&self, handle: &RequestHandle) {
        let descriptor = handle.descriptor.refreshed();
        if let Some(request) = self
            .inner
            .admit(descriptor, Arc::clone(&handle.callbacks))
            .await
        {
            self.inner.enqueue(vec![request]);
        }
    }

    /// Sends the pending batch now and waits until its responses are routed.
    ///
    /// Does nothing when the batch is empty; no rank is consumed.
    pub async fn flush(&self) {
        let batch = self.inner.state.lock().take_batch();
        if let Some(batch) = batch {
            self.inner.dispatch(batch).await;
        }
    }

    /// Removes the cached result for one `(route, data)` pair.
    pub async fn invalidate(&self, spec: &RequestSpec) {
        let key = self.inner.keyer.key(spec.route(), spec.payload());
        self.inner.gateway.invalidate(&key).await;
    }

    pub async fn clear_cache(&self) {
        self.inner.gateway.clear().await;
    }

    /// Number of distinct keys waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.key_count()
    }

    /// Rank of the most recently flushed batch; zero before the first flush.
    pub fn last_rank(&self) -> u64 {
        self.inner.state.lock().last_rank
    }
}

impl Inner {
    async fn admit(
        &self,
        descriptor: RequestDescriptor,
        callbacks: Arc<dyn RequestCallbacks>,
    ) -> Option<Admitted> {
        let key = self.keyer.key(descriptor.route(), descriptor.data());
        let resolution = self.gateway.resolve(&key, &descriptor).await;

        if let Some(payload) = &resolution.served_from_cache {
            debug!(request = %descriptor.id(), route = descriptor.route(), "served from cache");
            callbacks.on_success(payload);
        }

        if resolution.is_cache_miss() {
            callbacks.on_error(&FetchError::CacheMiss {
                route: descriptor.route().to_string(),
            });
            return None;
        }

        if !resolution.should_also_fetch {
            return None;
        }

        Some(Admitted {
            key,
            request: PendingRequest {
                descriptor,
                callbacks,
                cached: resolution.served_from_cache,
            },
        })
    }

    fn enqueue(self: &Arc<Self>, admitted: Vec<Admitted>) {
        if admitted.is_empty() {
            return;
        }

        // signalled before the lock so a timer flush can never resolve first
        for item in &admitted {
            item.request.callbacks.on_loading_delta(1);
        }

        let (flushed, absorbed) = {
            let mut state = self.state.lock();
            self.accumulate(&mut state, admitted)
        };

        for request in absorbed {
            request.callbacks.on_loading_delta(-1);
        }

        for batch in flushed {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.dispatch(batch).await;
            });
        }
    }

    fn accumulate(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        admitted: Vec<Admitted>,
    ) -> (Vec<FlushedBatch>, Vec<PendingRequest>) {
        let mut flushed = Vec::new();
        let mut absorbed = Vec::new();
        let mut arrived = false;

        for Admitted { key, request } in admitted {
            let id = request.descriptor.id();
            if state.pending.contains(id) {
                debug!(request = %id, "already pending, absorbing resubmission");
                absorbed.push(request);
                continue;
            }

            if state.pending.push(key, request) == Insertion::Coalesced {
                metrics::counter!("reqmux_requests_coalesced_total").increment(1);
            }
            arrived = true;

            if state.pending.key_count() >= self.batch_size {
                debug!(keys = state.pending.key_count(), "batch full");
                flushed.extend(state.take_batch());
                arrived = false;
            }
        }

        if arrived {
            match state.scheduler.on_arrival(Instant::now()) {
                TimerAction::FlushNow => {
                    debug!("max delay reached");
                    flushed.extend(state.take_batch());
                }
                TimerAction::Arm(delay) | TimerAction::Rearm(delay) => {
                    self.arm_timer(state, delay);
                }
            }
        }

        (flushed, absorbed)
    }

    fn arm_timer(self: &Arc<Self>, state: &mut SchedulerState, delay: Duration) {
        state.cancel_timer();
        let generation = state.timer_generation;
        let weak: Weak<Self> = Arc::downgrade(self);

        debug!(delay_ms = delay.as_millis() as u64, "timer armed");
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(generation).await;
            }
        }));
    }

    async fn on_timer(&self, generation: u64) {
        let batch = {
            let mut state = self.state.lock();
            if state.timer_generation != generation {
                return;
            }
            // this task is the timer; release the handle instead of aborting it
            state.timer = None;
            state.take_batch()
        };

        if let Some(batch) = batch {
            self.dispatch(batch).await;
        }
    }

    async fn dispatch(&self, batch: FlushedBatch) {
        let envelope = batch.envelope();
        let rank = batch.rank;
        debug!(
            rank,
            keys = envelope.requests.len(),
            requests = batch.request_count(),
            "flushing batch"
        );
        metrics::counter!("reqmux_batches_sent_total").increment(1);

        let result = self
            .transport
            .send(&envelope)
            .await
            .map_err(FetchError::from);

        if let Err(error) = &result {
            warn!(rank, %error, "batch send failed");
            metrics::counter!("reqmux_transport_failures_total").increment(1);
        }

        let plan = {
            let mut state = self.state.lock();
            ResponseRouter::route(batch, result, &mut state.ledger)
        };

        let stale = plan.stale_count();
        if stale > 0 {
            metrics::counter!("reqmux_stale_responses_total").increment(stale as u64);
        }

        for (key, payload) in plan.cache_writes {
            self.gateway.record(key, payload).await;
        }
        for delivery in plan.deliveries {
            delivery.deliver();
        }
    }
}

impl Drop for Inner {
    /// Resolves whatever is still pending so every `+1` gets its `-1`.
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.cancel_timer();

        let entries = state.pending.take();
        if entries.is_empty() {
            return;
        }

        let error = FetchError::TransportFailure {
            message: "multiplexer dropped before the batch was sent".to_string(),
        };
        warn!(keys = entries.len(), "dropping multiplexer with pending requests");
        for request in entries.into_iter().flat_map(|entry| entry.requests) {
            request.callbacks.on_error(&error);
            request.callbacks.on_loading_delta(-1);
        }
    }
}

impl SchedulerState {
    fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            pending: PendingBatch::default(),
            scheduler: BatchScheduler::new(min_delay, max_delay),
            timer: None,
            timer_generation: 0,
            last_rank: 0,
            ledger: RankLedger::default(),
        }
    }

    fn cancel_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Drains the pending batch under a fresh rank and returns to idle.
    fn take_batch(&mut self) -> Option<FlushedBatch> {
        self.cancel_timer();
        self.scheduler.disarm();

        if self.pending.is_empty() {
            return None;
        }

        self.last_rank += 1;
        let rank = self.last_rank;
        let entries = self.pending.take();
        for request in entries.iter().flat_map(|e| e.requests.iter()) {
            self.ledger.record(request.descriptor.id(), rank);
        }

        Some(FlushedBatch { rank, entries })
    }
}

/// Builds a [`Multiplexer`].
pub struct MultiplexerBuilder {
    endpoint: Option<String>,
    request_timeout: Duration,
    batch_size: usize,
    min_delay: Duration,
    max_delay: Duration,
    defaults: RequestDefaults,
    keyer: Option<Arc<dyn RequestKeyer>>,
    cache: Option<Arc<dyn Cache>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for MultiplexerBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout: Duration::from_secs(30),
            batch_size: DEFAULT_BATCH_SIZE,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            defaults: RequestDefaults::default(),
            keyer: None,
            cache: None,
            transport: None,
        }
    }
}

impl MultiplexerBuilder {
    /// Starts from loaded configuration. A memory cache is attached when
    /// `cache.enabled` is set.
    pub fn from_config(config: &MultiplexerConfig) -> Self {
        let mut builder = Self {
            endpoint: config.endpoint.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            batch_size: config.batch.size,
            min_delay: config.batch.min_delay(),
            max_delay: config.batch.max_delay(),
            ..Self::default()
        };
        builder.defaults.fetch_policy = config.default_fetch_policy;

        if config.cache.enabled {
            let cache_config = MemoryCacheConfig::default()
                .with_max_bytes(config.cache.max_bytes)
                .with_ttl(config.cache.ttl());
            builder.cache = Some(Arc::new(MemoryCache::new(cache_config)));
        }

        builder
    }

    /// Target of the default HTTP transport.
    ///
    /// Ignored when a custom [`Transport`] is attached with
    /// [`transport`](Self::transport).
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Absolute URL that accepts a POSTed batch envelope
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Per-send timeout for the HTTP transport. Must be non-zero.
    ///
    /// Defaults to 30 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Maximum distinct keys per batch. Must be greater than zero.
    ///
    /// Reaching it flushes immediately without waiting for the timer.
    /// Duplicates of a key already pending do not count.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Quiet period after the latest arrival before the batch is sent.
    ///
    /// Each arrival re-arms the timer, capped by [`max_delay`](Self::max_delay).
    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Longest the first request of a batch may wait. Must be at least
    /// [`min_delay`](Self::min_delay).
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Policy for requests that do not set one. Defaults to
    /// [`FetchPolicy::CacheFirst`].
    pub fn default_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.defaults.fetch_policy = policy;
        self
    }

    /// Replaces the SHA-256 dedup keyer.
    pub fn keyer(mut self, keyer: Arc<dyn RequestKeyer>) -> Self {
        self.keyer = Some(keyer);
        self
    }

    /// Attaches a cache. Without one every policy acts as `NetworkOnly`.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Detaches any cache, including one set by
    /// [`from_config`](Self::from_config).
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Uses a custom transport instead of HTTP to `endpoint`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the settings and creates the multiplexer.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::InvalidConfiguration`] when the batch size is
    /// zero, `min_delay` exceeds `max_delay`, neither an endpoint nor a
    /// transport is set, or the HTTP client cannot be built.
    pub fn build(self) -> MuxResult<Multiplexer> {
        if self.batch_size == 0 {
            return Err(MuxError::InvalidConfiguration {
                message: format!("batch_size must be > 0, got {}", self.batch_size),
            });
        }
        if self.min_delay > self.max_delay {
            return Err(MuxError::InvalidConfiguration {
                message: format!(
                    "min_delay ({:?}) must not exceed max_delay ({:?})",
                    self.min_delay, self.max_delay
                ),
            });
        }

        let transport: Arc<dyn Transport> = match (self.transport, self.endpoint) {
            (Some(transport), _) => transport,
            (None, Some(_)) if self.request_timeout.is_zero() => {
                return Err(MuxError::InvalidConfiguration {
                    message: "request_timeout must be > 0".to_string(),
                })
            }
            (None, Some(endpoint)) => Arc::new(HttpTransport::new(endpoint, self.request_timeout)?),
            (None, None) => {
                return Err(MuxError::InvalidConfiguration {
                    message: "either an endpoint or a transport is required".to_string(),
                })
            }
        };

        let inner = Inner {
            batch_size: self.batch_size,
            defaults: self.defaults,
            keyer: self.keyer.unwrap_or_else(|| Arc::new(Sha256Keyer)),
            gateway: CacheGateway::new(self.cache),
            transport,
            next_id: AtomicU64::new(0),
            state: Mutex::new(SchedulerState::new(self.min_delay, self.max_delay)),
        };

        Ok(Multiplexer {
            inner: Arc::new(inner),
        })
    }
}
