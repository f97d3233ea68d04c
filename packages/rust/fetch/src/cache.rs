//! Time-boxed read cache in front of a [`Fetcher`].
//!
//! Entries are keyed by a SHA-256 signature of the normalized query and
//! expire after a fixed TTL. Expired entries are never served; a periodic
//! sweeper reclaims their memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use aulabot_shared::{CacheConfig, Fetcher, QuerySpec, Result, ResultSet};
use moka::future::Cache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub capacity: u64,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Wraps another [`Fetcher`] and memoizes successful results.
pub struct CachedFetcher {
    inner: Arc<dyn Fetcher>,
    cache: Cache<String, Arc<ResultSet>>,
    ttl: Duration,
    capacity: u64,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, config: &CacheConfig) -> Self {
        let ttl = config.ttl();
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            ttl,
            capacity: config.max_entries,
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        info!("result cache cleared");
    }

    /// Purge expired entries now.
    pub async fn sweep(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            entries: self.cache.entry_count(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Sweep on a fixed interval until the returned handle is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                cache.run_pending_tasks().await;
                debug!(entries = cache.entry_count(), "cache sweep");
            }
        })
    }
}

#[async_trait]
impl Fetcher for CachedFetcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet> {
        if !self.enabled {
            return self.inner.fetch(query).await;
        }

        let key = signature(query);
        if let Some(rows) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(query = %query.label(), "cache hit");
            return Ok(rows.as_ref().clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(query = %query.label(), "cache miss");

        // failures are never cached
        let rows = self.inner.fetch(query).await?;
        self.cache.insert(key, Arc::new(rows.clone())).await;
        Ok(rows)
    }
}

/// Stable key for a query: whitespace and case do not matter for SQL text;
/// REST parameters are already ordered.
pub fn signature(query: &QuerySpec) -> String {
    let mut hasher = Sha256::new();
    match query {
        QuerySpec::Sql(sql) => {
            hasher.update(b"sql\n");
            let text = sql.text.split_whitespace().collect::<Vec<_>>().join(" ");
            hasher.update(text.to_lowercase().as_bytes());
            for value in &sql.params {
                hasher.update(b"\n");
                hasher.update(serde_json::to_string(value).unwrap_or_default().as_bytes());
            }
        }
        QuerySpec::Rest(rest) => {
            hasher.update(b"rest\n");
            hasher.update(rest.action.as_bytes());
            for (key, value) in &rest.params {
                hasher.update(b"\n");
                hasher.update(key.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }
    }
    format!("{:x}", hasher.finalize())
}
