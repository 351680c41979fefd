//! Result-list cache: ordered primary-key lists keyed by a query fingerprint.
//!
//! Every list key a model populates is recorded in the model's invalidation
//! registry (a cache-service set). Writes flush the whole registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tessera_core::{fingerprint, ListRequest, ModelConfig, TesseraResult};
use tessera_storage::CacheClient;

/// Hex characters of the fingerprint kept in a list key.
const KEY_FINGERPRINT_LEN: usize = 16;

/// Name of the set holding every live list key of `model` (`db.table`).
pub fn registry_key_for(model: &str) -> String {
    format!("{model}:list-keys")
}

/// Derive the cache key of a list request.
///
/// Page and limit are left out: they only slice the cached window.
pub fn list_key(model: &str, request: &ListRequest) -> String {
    let identity = json!({
        "filter": Value::Object(request.filter.clone()),
        "sort": request.sort,
        "large_page": request.large_page.filter(|p| *p > 0).unwrap_or(1),
    });
    let digest = fingerprint(&identity);
    format!("list:{model}:{}", &digest[..KEY_FINGERPRINT_LEN])
}

// ============================================================================
// WINDOW ARITHMETIC
// ============================================================================

/// Resolved page coordinates of a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    /// 1-based page inside the window, after wrapping.
    pub page: u64,
    pub limit: u64,
    /// 1-based large-page window.
    pub large_page: u64,
    pub large_limit: u64,
}

impl PageWindow {
    /// Apply defaults, cap `limit` at `large_limit` and wrap `page` into the window.
    pub fn resolve(request: &ListRequest, config: &ModelConfig) -> Self {
        let large_limit = config.large_limit.max(1);
        let limit = request
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(config.default_page_size)
            .clamp(1, large_limit);
        let large_page = request.large_page.filter(|p| *p > 0).unwrap_or(1);
        let pages_per_window = large_limit.div_ceil(limit);
        let page = request.page.filter(|p| *p > 0).unwrap_or(1);
        Self {
            page: ((page - 1) % pages_per_window) + 1,
            limit,
            large_page,
            large_limit,
        }
    }

    /// Offset of the window's first id in the full result.
    pub fn window_offset(&self) -> u64 {
        (self.large_page - 1).saturating_mul(self.large_limit)
    }

    /// Range of the page inside the window.
    pub fn page_range(&self) -> Range<usize> {
        let start = (self.page - 1).saturating_mul(self.limit) as usize;
        start..start.saturating_add(self.limit as usize)
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Counters describing how a list cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub populates: u64,
    pub invalidations: u64,
}

impl ListCacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    populates: AtomicU64,
    invalidations: AtomicU64,
    /// Bumped on every flush, whether or not anything was registered.
    generation: AtomicU64,
}

// ============================================================================
// CACHE
// ============================================================================

/// Cached id lists of one model.
#[derive(Clone)]
pub struct ResultListCache {
    cache: Arc<dyn CacheClient>,
    model: String,
    registry_key: String,
    ttl: Duration,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for ResultListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultListCache")
            .field("model", &self.model)
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ResultListCache {
    pub fn new(cache: Arc<dyn CacheClient>, model: &str, config: &ModelConfig) -> Self {
        Self {
            cache,
            model: model.to_string(),
            registry_key: registry_key_for(model),
            ttl: config.list_key_ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn key_for(&self, request: &ListRequest) -> String {
        list_key(&self.model, request)
    }

    pub async fn exists(&self, key: &str) -> TesseraResult<bool> {
        let present = self.cache.exists_key(key).await?;
        let counter = if present {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(present)
    }

    pub async fn slice(&self, key: &str, range: Range<usize>) -> TesseraResult<Vec<String>> {
        self.cache.list_slice(key, range).await
    }

    pub async fn len(&self, key: &str) -> TesseraResult<u64> {
        self.cache.list_len(key).await
    }

    /// Store `ids` under `key`, start its ttl and register the key.
    ///
    /// An empty id list is not cached. When a step after the push fails the
    /// list is dropped again, so no list outlives its ttl or escapes the registry.
    pub async fn populate(&self, key: &str, ids: &[String]) -> TesseraResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.cache.delete_key(key).await?;
        self.cache.list_push(key, ids).await?;
        if let Err(e) = self.expire_and_register(key).await {
            self.discard(key).await;
            return Err(e);
        }
        self.counters.populates.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(model = %self.model, key = %key, ids = ids.len(), "list cached");
        Ok(())
    }

    async fn expire_and_register(&self, key: &str) -> TesseraResult<()> {
        self.cache.set_key_timeout(key, self.ttl).await?;
        self.cache.set_add(&self.registry_key, key).await?;
        Ok(())
    }

    /// Best-effort removal of one cached list.
    pub async fn discard(&self, key: &str) {
        if let Err(e) = self.cache.delete_key(key).await {
            tracing::warn!(model = %self.model, key = %key, error = %e, "failed to drop cached list");
        }
    }

    /// Number of flushes so far. A list discovered before a flush must not be cached after it.
    pub fn generation(&self) -> u64 {
        self.counters.generation.load(Ordering::Acquire)
    }

    /// Drop every registered list of the model. Returns how many keys were deleted.
    ///
    /// Failures are logged and skipped so they never mask the write that triggered them.
    pub async fn invalidate_all(&self) -> u64 {
        self.counters.generation.fetch_add(1, Ordering::AcqRel);
        let keys = match self.cache.set_members(&self.registry_key).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "failed to read list registry");
                return 0;
            }
        };
        let mut deleted = 0;
        for key in &keys {
            match self.cache.delete_key(key).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(model = %self.model, key = %key, error = %e, "failed to drop cached list");
                    continue;
                }
            }
            if let Err(e) = self.cache.set_remove(&self.registry_key, key).await {
                tracing::warn!(model = %self.model, key = %key, error = %e, "failed to unregister list key");
            }
        }
        if !keys.is_empty() {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(model = %self.model, keys = keys.len(), deleted, "list cache invalidated");
        }
        deleted
    }

    pub fn stats(&self) -> ListCacheStats {
        ListCacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            populates: self.counters.populates.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}
