//! In-memory response cache with per-entry TTL.

use crate::config::CacheConfig;
use crate::metrics_defs::{CACHE_COALESCED, CACHE_HITS, CACHE_MISSES};
use moka::Expiry;
use moka::future::Cache;
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

/// Entries live for the TTL they were stored with.
struct EntryTtl;

impl<K, V> Expiry<K, CacheEntry<V>> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// How a read was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lookup {
    /// Stored before this read started.
    Hit,
    /// This read ran the computation.
    Miss,
    /// Waited on a computation another read started.
    Coalesced,
}

/// TTL-bounded cache keyed by request identity.
///
/// Concurrent misses on one key share a single computation. Failed
/// computations are handed to every waiter and never stored.
#[derive(Clone)]
pub struct ResponseCache<V> {
    inner: Option<Cache<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(enabled: bool, ttl: Duration, max_capacity: u64) -> Self {
        let inner = enabled.then(|| {
            Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(EntryTtl)
                .build()
        });
        ResponseCache { inner, ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, config.ttl(), config.max_capacity)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Default TTL for entries stored through this cache.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        let (value, _) = self.lookup(key, ttl, compute).await?;
        Ok(value)
    }

    async fn lookup<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(V, Lookup), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        let Some(cache) = &self.inner else {
            return compute().await.map(|value| (value, Lookup::Miss));
        };

        let started = Instant::now();
        let computed = AtomicBool::new(false);
        let result = cache
            .try_get_with(key.to_string(), async {
                computed.store(true, Ordering::Relaxed);
                let value = compute().await?;
                Ok(CacheEntry {
                    value,
                    created_at: Instant::now(),
                    ttl,
                })
            })
            .await;

        let entry = result.map_err(Arc::unwrap_or_clone)?;

        let lookup = if computed.load(Ordering::Relaxed) {
            counter!(CACHE_MISSES).increment(1);
            tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache miss, stored fresh entry");
            Lookup::Miss
        } else if entry.created_at >= started {
            counter!(CACHE_COALESCED).increment(1);
            tracing::debug!(key, "Shared a concurrent fetch");
            Lookup::Coalesced
        } else {
            counter!(CACHE_HITS).increment(1);
            tracing::debug!(
                key,
                age_ms = entry.created_at.elapsed().as_millis() as u64,
                "Cache hit"
            );
            Lookup::Hit
        };

        Ok((entry.value, lookup))
    }
}
