//! Response caching.
//!
//! The multiplexer only depends on the [`Cache`] contract (`get`, `set`,
//! `delete`, `clear`). A miss is reported as `None`, never as an error.
//!
//! [`MemoryCache`] is the bundled implementation: a Moka async cache bounded
//! by an approximate byte weight of the stored JSON and expiring entries
//! after a TTL.
//!
//! # Example
//!
//! ```rust,ignore
//! use reqmux_domain::cache::{Cache, MemoryCache, MemoryCacheConfig};
//! use reqmux_domain::DedupKey;
//!
//! let cache = MemoryCache::new(MemoryCacheConfig::default());
//! let key = DedupKey::new("users");
//! cache.set(key.clone(), serde_json::json!([1, 2])).await;
//!
//! assert!(cache.get(&key).await.is_some());
//! ```

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use serde_json::Value;

use crate::keyer::DedupKey;

/// Key-value store shared by every request of a multiplexer.
///
/// Implementations own their concurrency discipline and eviction policy.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the stored value, or `None` on a miss.
    async fn get(&self, key: &DedupKey) -> Option<Value>;

    async fn set(&self, key: DedupKey, value: Value);

    async fn delete(&self, key: &DedupKey);

    async fn clear(&self);
}

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Upper bound on the summed approximate size of all entries, in bytes.
    pub max_bytes: u64,
    /// Time-to-live for each entry.
    pub ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 30 * 1024 * 1024,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl MemoryCacheConfig {
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Size-bounded, TTL-expiring in-memory cache.
pub struct MemoryCache {
    cache: MokaCache<DedupKey, Value>,
    config: MemoryCacheConfig,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_bytes)
            .time_to_live(config.ttl)
            .weigher(|key: &DedupKey, value: &Value| {
                let bytes = approximate_size(value) + key.as_str().len() as u64;
                u32::try_from(bytes).unwrap_or(u32::MAX)
            })
            .build();

        Self { cache, config }
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending eviction and expiry work. Mostly useful in tests.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &DedupKey) -> Option<Value> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            metrics::counter!("reqmux_cache_hits_total").increment(1);
        } else {
            metrics::counter!("reqmux_cache_misses_total").increment(1);
        }
        result
    }

    async fn set(&self, key: DedupKey, value: Value) {
        self.cache.insert(key, value).await;
    }

    async fn delete(&self, key: &DedupKey) {
        self.cache.invalidate(key).await;
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
    }
}

const ARRAY_SAMPLE: usize = 10;
const OBJECT_SAMPLE: usize = 50;

/// Rough in-memory footprint of a JSON value, in bytes.
///
/// Large arrays and objects are sampled: the first few elements are measured
/// and the average is scaled to the full length.
pub fn approximate_size(value: &Value) -> u64 {
    let mut stack = vec![value];
    let mut bytes = 0u64;

    while let Some(value) = stack.pop() {
        // type tag
        bytes += 2;
        match value {
            Value::Null | Value::Bool(_) => bytes += 4,
            Value::Number(_) => bytes += 8,
            Value::String(s) => bytes += string_size(s),
            Value::Array(items) => {
                bytes += 8;
                if items.len() <= ARRAY_SAMPLE {
                    stack.extend(items.iter());
                } else {
                    let sampled: u64 = items[..ARRAY_SAMPLE].iter().map(approximate_size).sum();
                    bytes += sampled / ARRAY_SAMPLE as u64 * items.len() as u64;
                }
            }
            Value::Object(map) => {
                bytes += 12;
                if map.len() <= OBJECT_SAMPLE {
                    for (key, item) in map {
                        bytes += 2 + string_size(key);
                        stack.push(item);
                    }
                } else {
                    let sampled: u64 = map
                        .iter()
                        .take(OBJECT_SAMPLE)
                        .map(|(key, item)| 2 + string_size(key) + approximate_size(item))
                        .sum();
                    bytes += sampled / OBJECT_SAMPLE as u64 * map.len() as u64;
                }
            }
        }
    }

    bytes
}

fn string_size(s: &str) -> u64 {
    8 + s.chars().count() as u64 * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_setters_reach_cache() {
        let cache = MemoryCache::new(
            MemoryCacheConfig::default()
                .with_max_bytes(1024)
                .with_ttl(Duration::from_secs(7)),
        );

        assert_eq!(cache.config().max_bytes, 1024);
        assert_eq!(cache.config().ttl, Duration::from_secs(7));
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_get_returns_none_on_miss() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        assert_eq!(cache.get(&DedupKey::new("missing")).await, None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let key = DedupKey::new("users");

        cache.set(key.clone(), json!([{"id": 4}])).await;

        assert_eq!(cache.get(&key).await, Some(json!([{"id": 4}])));
    }

    #[tokio::test]
    async fn test_delete_removes_single_entry() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        let kept = DedupKey::new("kept");
        let removed = DedupKey::new("removed");
        cache.set(kept.clone(), json!(1)).await;
        cache.set(removed.clone(), json!(2)).await;

        cache.delete(&removed).await;

        assert_eq!(cache.get(&removed).await, None);
        assert_eq!(cache.get(&kept).await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache = MemoryCache::new(MemoryCacheConfig::default());
        cache.set(DedupKey::new("a"), json!(1)).await;
        cache.set(DedupKey::new("b"), json!(2)).await;

        cache.clear().await;
        cache.run_pending_tasks().await;

        assert_eq!(cache.get(&DedupKey::new("a")).await, None);
        assert_eq!(cache.get(&DedupKey::new("b")).await, None);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::new(
            MemoryCacheConfig::default().with_ttl(Duration::from_millis(50)),
        );
        let key = DedupKey::new("short-lived");
        cache.set(key.clone(), json!("v")).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        cache.run_pending_tasks().await;

        assert_eq!(cache.get(&key).await, None);
    }

    #[test]
    fn test_approximate_size_scalars() {
        assert_eq!(approximate_size(&json!(null)), 6);
        assert_eq!(approximate_size(&json!(true)), 6);
        assert_eq!(approximate_size(&json!(1.5)), 10);
        // 2 + 8 + 2 * 3
        assert_eq!(approximate_size(&json!("abc")), 16);
    }

    #[test]
    fn test_approximate_size_grows_with_content() {
        let small = approximate_size(&json!({"id": 1}));
        let large = approximate_size(&json!({"id": 1, "name": "Sylvester", "tags": ["cat"]}));
        assert!(large > small);
    }

    #[test]
    fn test_approximate_size_samples_long_arrays() {
        let items: Vec<Value> = (0..1000).map(|i| json!(i)).collect();
        // each number weighs 10; 2 + 8 for the array itself
        assert_eq!(approximate_size(&Value::Array(items)), 10 + 10 * 1000);
    }
}
