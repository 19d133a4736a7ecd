//! Fetch-policy evaluation against the shared cache.

use std::sync::Arc;

use reqmux_domain::{Cache, DedupKey, FetchPolicy, RequestDescriptor};
use serde_json::Value;

/// How a request is answered before batching.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Payload to deliver immediately from cache.
    pub served_from_cache: Option<Value>,
    /// Whether the request must also go to the network.
    pub should_also_fetch: bool,
}

impl Resolution {
    fn network() -> Self {
        Self {
            served_from_cache: None,
            should_also_fetch: true,
        }
    }

    /// Neither served nor fetched: a `CacheOnly` miss.
    pub fn is_cache_miss(&self) -> bool {
        self.served_from_cache.is_none() && !self.should_also_fetch
    }
}

/// Applies fetch policies against an optional cache.
///
/// Without a cache every policy behaves as `NetworkOnly`.
#[derive(Clone, Default)]
pub struct CacheGateway {
    cache: Option<Arc<dyn Cache>>,
}

impl std::fmt::Debug for CacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGateway")
            .field("enabled", &self.cache.is_some())
            .finish()
    }
}

impl CacheGateway {
    pub fn new(cache: Option<Arc<dyn Cache>>) -> Self {
        Self { cache }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// The policy actually applied: `skip_cache` or a missing cache force
    /// `NetworkOnly`.
    pub fn effective_policy(&self, descriptor: &RequestDescriptor) -> FetchPolicy {
        if self.cache.is_none() || descriptor.skip_cache() {
            FetchPolicy::NetworkOnly
        } else {
            descriptor.fetch_policy()
        }
    }

    pub async fn resolve(&self, key: &DedupKey, descriptor: &RequestDescriptor) -> Resolution {
        let policy = self.effective_policy(descriptor);
        let Some(cache) = &self.cache else {
            return Resolution::network();
        };

        match policy {
            FetchPolicy::NetworkOnly => Resolution::network(),
            FetchPolicy::CacheFirst => match cache.get(key).await {
                Some(payload) => Resolution {
                    served_from_cache: Some(payload),
                    should_also_fetch: false,
                },
                None => Resolution::network(),
            },
            FetchPolicy::CacheAndNetwork => Resolution {
                served_from_cache: cache.get(key).await,
                should_also_fetch: true,
            },
            FetchPolicy::CacheOnly => Resolution {
                served_from_cache: cache.get(key).await,
                should_also_fetch: false,
            },
        }
    }

    /// Stores a successful network result.
    pub async fn record(&self, key: DedupKey, payload: Value) {
        if let Some(cache) = &self.cache {
            cache.set(key, payload).await;
        }
    }

    pub async fn invalidate(&self, key: &DedupKey) {
        if let Some(cache) = &self.cache {
            cache.delete(key).await;
        }
    }

    pub async fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }
}
