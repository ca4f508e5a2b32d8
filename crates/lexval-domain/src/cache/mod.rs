//! Validation result caching with per-entry TTL.
//!
//! The cache maps a canonical key, derived from the sorted and type-tagged
//! identifier sets of a request, to a previously computed result. It is
//! backed by Moka's async cache, so reads never block on a concurrent write
//! to a different key.
//!
//! # Key Design
//!
//! Keys are built from the operation name followed by one segment per kind,
//! in canonical kind order:
//!
//! ```text
//! entities|M:2:m1,2:m2|D:|R:
//! relationships|DM:2:m1>2:d1|RD:
//! ```
//!
//! Each identifier is length-prefixed so ids containing separator
//! characters cannot produce colliding keys. Because the ids are sorted
//! before encoding, two requests with the same logical sets map to the same
//! key whatever order the caller listed them in.
//!
//! # Failure Semantics
//!
//! Cache calls are bounded by a short internal timeout. A call that does not
//! finish in time is logged and treated as a miss; cache trouble never fails
//! a validation.
//!
//! # Example
//!
//! ```rust,ignore
//! use lexval_domain::cache::{CacheKey, CachedValue, ValidationCache, ValidationCacheConfig};
//!
//! let cache = ValidationCache::new(ValidationCacheConfig::default());
//! let key = CacheKey::for_entities(&sets);
//! cache.insert(key.clone(), CachedValue::Entities(Arc::new(result))).await;
//!
//! assert!(cache.lookup(&key).await.is_some());
//! ```

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde::Serialize;
use tracing::warn;

use crate::ids::{EntityIdSets, EntityKind, RelationshipKind, RelationshipPairSets};
use crate::results::{EntityValidationResult, RelationshipValidationResult};

/// Upper bound on a single cache call before it is treated as a miss.
pub const CACHE_OPERATION_TIMEOUT: Duration = Duration::from_millis(250);

const PROBE_KEY: &str = "__lexval_cache_probe__";

/// Configuration for the validation cache.
#[derive(Debug, Clone)]
pub struct ValidationCacheConfig {
    /// When false, lookups always miss and inserts are dropped.
    pub enabled: bool,
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// TTL used by [`ValidationCache::insert`].
    pub default_ttl: Duration,
}

impl Default for ValidationCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl ValidationCacheConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Canonical cache key for one validation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an entity existence request.
    pub fn for_entities(sets: &EntityIdSets) -> Self {
        let mut key = String::from("entities");
        for kind in EntityKind::ALL {
            let _ = write!(key, "|{}:", kind.tag());
            if let Some(ids) = sets.get(&kind) {
                let encoded: Vec<String> = ids.sorted().into_iter().map(encode_part).collect();
                key.push_str(&encoded.join(","));
            }
        }
        Self(key)
    }

    /// Key for a relationship validation request.
    pub fn for_relationships(sets: &RelationshipPairSets) -> Self {
        let mut key = String::from("relationships");
        for kind in RelationshipKind::ALL {
            let _ = write!(key, "|{}:", kind.tag());
            if let Some(pairs) = sets.get(&kind) {
                let encoded: Vec<String> = pairs
                    .sorted()
                    .into_iter()
                    .map(|pair| {
                        format!(
                            "{}>{}",
                            encode_part(&pair.parent_id),
                            encode_part(&pair.child_id)
                        )
                    })
                    .collect();
                key.push_str(&encoded.join(","));
            }
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_part(id: &str) -> String {
    format!("{}:{}", id.len(), id)
}

/// A cached result. Results are immutable and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Entities(Arc<EntityValidationResult>),
    Relationships(Arc<RelationshipValidationResult>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: CachedValue, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            ttl,
            expires_at,
        }
    }

    fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Expires every entry after the TTL it was stored with.
struct EntryExpiry;

impl Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Hit/miss counters.
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Cache calls abandoned after [`CACHE_OPERATION_TIMEOUT`].
    pub failures: u64,
    pub entry_count: u64,
    pub hit_ratio: f64,
}

/// Validation result cache.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ValidationCache {
    cache: Cache<CacheKey, CacheEntry>,
    config: ValidationCacheConfig,
    stats: CacheStats,
}

impl std::fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl ValidationCache {
    pub fn new(config: ValidationCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            cache,
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &ValidationCacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Looks up a cached result.
    ///
    /// Returns `None` on a miss, when caching is disabled, or when the cache
    /// does not answer within [`CACHE_OPERATION_TIMEOUT`].
    ///
    /// # Metrics
    ///
    /// - `lexval_cache_hits_total`
    /// - `lexval_cache_misses_total`
    pub async fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        if !self.config.enabled {
            return None;
        }

        let entry = match tokio::time::timeout(CACHE_OPERATION_TIMEOUT, self.cache.get(key)).await
        {
            Ok(entry) => entry,
            Err(_) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "cache lookup timed out, treating as miss");
                None
            }
        };

        match entry.filter(CacheEntry::is_live) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("lexval_cache_hits_total").increment(1);
                Some(entry.value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("lexval_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Stores a result with the configured default TTL.
    pub async fn insert(&self, key: CacheKey, value: CachedValue) {
        self.insert_with_ttl(key, value, self.config.default_ttl).await;
    }

    /// Stores a result, replacing any existing entry for the same key.
    pub async fn insert_with_ttl(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        if !self.config.enabled || ttl.is_zero() {
            return;
        }

        let entry = CacheEntry::new(value, ttl);
        match tokio::time::timeout(CACHE_OPERATION_TIMEOUT, self.cache.insert(key, entry)).await {
            Ok(()) => {
                self.stats.inserts.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("cache insert timed out, result not cached");
            }
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }

    /// Removes every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance (evictions). Useful for testing TTL behavior.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Writes, reads back and removes a reserved entry.
    ///
    /// Returns false if any step misbehaves. Runs even when caching is
    /// disabled since it checks the backing cache, not the policy.
    pub async fn probe(&self) -> bool {
        let key = CacheKey(PROBE_KEY.to_string());
        let value = CachedValue::Entities(Arc::new(EntityValidationResult::empty()));

        let round_trip = async {
            self.cache
                .insert(key.clone(), CacheEntry::new(value.clone(), Duration::from_secs(5)))
                .await;
            let read_back = self.cache.get(&key).await;
            self.cache.invalidate(&key).await;
            read_back.map(|entry| entry.value) == Some(value)
        };

        match tokio::time::timeout(CACHE_OPERATION_TIMEOUT, round_trip).await {
            Ok(healthy) => healthy,
            Err(_) => {
                warn!("cache probe timed out");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStatsSnapshot {
            enabled: self.config.enabled,
            hits,
            misses,
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

/// Registers cache metric descriptions with the installed recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "lexval_cache_hits_total",
        "Total number of validation cache hits"
    );
    metrics::describe_counter!(
        "lexval_cache_misses_total",
        "Total number of validation cache misses"
    );
}
