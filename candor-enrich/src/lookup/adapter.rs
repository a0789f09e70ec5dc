//! Cache-first lookup adapter
//!
//! `fetch_or_cache` flow:
//! 1. Cache hit → return, no network call, no pacing
//! 2. Miss → politeness delay (if configured), then the fetcher under a timeout
//! 3. Connection reset → retry up to `max_retries` with a fixed delay
//! 4. Critical failure → `CriticalError` to the caller
//! 5. Non-critical failure → `T::default()` tagged with the reason, not cached
//! 6. Success → put into the cache, then return

use super::error::{CriticalError, ErrorKind, LookupError};
use crate::cache::{CacheKey, CacheStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry policy for the transient-network subclass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Per-collaborator adapter settings
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Collaborator name; also the cache namespace
    pub name: String,
    /// Timeout applied to each fetch attempt
    pub timeout: Duration,
    /// Fixed pause before every network call (never on a cache hit)
    pub politeness_delay: Option<Duration>,
    pub retry: RetryPolicy,
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            politeness_delay: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = Some(delay);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Where a returned payload came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
    /// Non-critical failure; payload is the empty shape
    Degraded { kind: ErrorKind, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub payload: T,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, Origin::Degraded { .. })
    }

    /// `(kind, reason)` when degraded
    pub fn degraded(&self) -> Option<(ErrorKind, &str)> {
        match &self.origin {
            Origin::Degraded { kind, reason } => Some((*kind, reason.as_str())),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            payload: f(self.payload),
            origin: self.origin,
        }
    }
}

/// Snapshot of adapter activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetcher invocations, including retries
    pub network_calls: u64,
    pub degraded: u64,
    pub critical: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    network_calls: AtomicU64,
    degraded: AtomicU64,
    critical: AtomicU64,
}

/// Cache-first adapter around one external collaborator
///
/// Cheap to clone; clones share the cache and counters.
#[derive(Clone)]
pub struct LookupAdapter {
    config: Arc<AdapterConfig>,
    cache: CacheStore,
    counters: Arc<Counters>,
}

impl LookupAdapter {
    pub fn new(config: AdapterConfig, cache: CacheStore) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Key for a free-text query in this adapter's namespace
    pub fn query_key(&self, query: &str) -> CacheKey {
        CacheKey::from_query(&self.config.name, query)
    }

    /// Key for an entity id in this adapter's namespace
    pub fn entity_key(&self, id: &str) -> CacheKey {
        CacheKey::from_entity(&self.config.name, id)
    }

    /// Key for named parameters in this adapter's namespace
    pub fn params_key(&self, params: &[(&str, &str)]) -> CacheKey {
        CacheKey::from_params(&self.config.name, params)
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            network_calls: self.counters.network_calls.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            critical: self.counters.critical.load(Ordering::Relaxed),
        }
    }

    /// Cache-first fetch
    ///
    /// Only critical failures are returned as errors; everything else
    /// resolves to a payload.
    pub async fn fetch_or_cache<T, F, Fut>(
        &self,
        key: &CacheKey,
        fetcher: F,
    ) -> Result<Fetched<T>, CriticalError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let name = self.config.name.as_str();

        if let Some(payload) = self.cache.get_as::<T>(key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(collaborator = name, key = %key, "Lookup served from cache");
            return Ok(Fetched {
                payload,
                origin: Origin::Cache,
            });
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let mut attempt: u32 = 0;
        let outcome = loop {
            if let Some(delay) = self.config.politeness_delay {
                tokio::time::sleep(delay).await;
            }

            self.counters.network_calls.fetch_add(1, Ordering::Relaxed);
            let result = match tokio::time::timeout(self.config.timeout, fetcher()).await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout(self.config.timeout)),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        collaborator = name,
                        key = %key,
                        attempt,
                        max_retries = self.config.retry.max_retries,
                        error = %e,
                        "Transient network failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry.delay).await;
                }
                other => break other,
            }
        };

        match outcome {
            Ok(payload) => {
                self.cache.put(key, &payload).await;
                debug!(collaborator = name, key = %key, "Lookup fetched from network");
                Ok(Fetched {
                    payload,
                    origin: Origin::Network,
                })
            }
            Err(e) if e.is_critical() => {
                self.counters.critical.fetch_add(1, Ordering::Relaxed);
                error!(
                    collaborator = name,
                    key = %key,
                    kind = %e.kind(),
                    error = %e,
                    "Critical lookup failure"
                );
                Err(CriticalError::new(name, e))
            }
            Err(e) => {
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                info!(
                    collaborator = name,
                    key = %key,
                    kind = %e.kind(),
                    reason = %e,
                    "Lookup degraded to empty payload"
                );
                Ok(Fetched {
                    payload: T::default(),
                    origin: Origin::Degraded {
                        kind: e.kind(),
                        reason: e.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tempfile::TempDir;

    fn adapter(dir: &TempDir, config: AdapterConfig) -> LookupAdapter {
        let cache = CacheStore::new(dir.path(), CachePolicy::default()).unwrap();
        LookupAdapter::new(config, cache)
    }

    fn fast_config() -> AdapterConfig {
        AdapterConfig::new("github", Duration::from_secs(5)).with_retry(RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(5),
        })
    }

    #[tokio::test]
    async fn test_hit_skips_fetcher() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("octocat");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LookupError>(vec!["repo".to_string()])
        };

        let first = adapter.fetch_or_cache(&key, fetch).await.unwrap();
        let second = adapter.fetch_or_cache(&key, fetch).await.unwrap();

        assert_eq!(first.origin, Origin::Network);
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(second.payload, vec!["repo".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = adapter.stats();
        assert_eq!((stats.hits, stats.misses, stats.network_calls), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_non_critical_yields_default_and_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("ghost");

        let fetched: Fetched<Vec<String>> = adapter
            .fetch_or_cache(&key, || async { Err(LookupError::NotFound("ghost".into())) })
            .await
            .unwrap();

        assert!(fetched.payload.is_empty());
        assert_eq!(fetched.degraded().map(|(k, _)| k), Some(ErrorKind::NotFound));
        assert_eq!(adapter.cache().get(&key).await, None);
    }

    #[tokio::test]
    async fn test_critical_is_propagated() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("octocat");

        let err = adapter
            .fetch_or_cache::<Vec<String>, _, _>(&key, || async {
                Err(LookupError::RateLimited { retry_after: None })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.collaborator, "github");
        assert_eq!(adapter.stats().critical, 1);
    }

    #[tokio::test]
    async fn test_connection_reset_retried_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("octocat");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let fetched = adapter
            .fetch_or_cache(&key, move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(LookupError::ConnectionReset("premature close".into()))
                } else {
                    Ok(42u32)
                }
            })
            .await
            .unwrap();

        assert_eq!(fetched.payload, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connection_reset_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("octocat");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let err = adapter
            .fetch_or_cache::<u32, _, _>(&key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LookupError::ConnectionReset("reset by peer".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, fast_config());
        let key = adapter.entity_key("octocat");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let _ = adapter
            .fetch_or_cache::<u32, _, _>(&key, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LookupError::ServiceUnavailable("503".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out_as_critical() {
        let dir = TempDir::new().unwrap();
        let config = AdapterConfig::new("textgen", Duration::from_millis(20));
        let adapter = adapter(&dir, config);
        let key = adapter.query_key("summarize");

        let err = adapter
            .fetch_or_cache::<u32, _, _>(&key, || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(1)
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_politeness_delay_only_on_miss() {
        let dir = TempDir::new().unwrap();
        let config = fast_config().with_politeness_delay(Duration::from_millis(150));
        let adapter = adapter(&dir, config);
        let key = adapter.query_key("ada lovelace");

        let start = Instant::now();
        adapter
            .fetch_or_cache(&key, || async { Ok::<_, LookupError>(1u32) })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));

        let start = Instant::now();
        let hit = adapter
            .fetch_or_cache(&key, || async { Ok::<_, LookupError>(2u32) })
            .await
            .unwrap();
        assert_eq!(hit.origin, Origin::Cache);
        assert!(start.elapsed() < Duration::from_millis(150));
    }
}
