//! # Result Cache
//!
//! Content-addressed cache of computed dashboard results, keyed by every
//! request input that affects the output.

use crate::error::CacheError;
use crate::filters::{FilterDimension, FilterSet, ViewType};
use crate::range::{DateRange, RangeName};
use crate::result::AggregateResult;
use crate::CACHE_SCHEMA_VERSION;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Fully qualified cache key.
///
/// Holds the canonical request string itself, so distinct requests can
/// never share a key; [`CacheKey::id`] gives a compact digest for logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(
        range_name: RangeName,
        custom_from: Option<&str>,
        custom_to: Option<&str>,
        resolved: &DateRange,
        view_type: ViewType,
        dimension: FilterDimension,
        filters: &FilterSet,
    ) -> Self {
        Self(format!(
            "v{}|{}|{}|{}|{}|{}|{}|{}",
            CACHE_SCHEMA_VERSION,
            range_name,
            custom_from.map(str::trim).unwrap_or_default(),
            custom_to.map(str::trim).unwrap_or_default(),
            resolved,
            view_type,
            dimension,
            filters.canonical(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short digest of the key
    pub fn id(&self) -> String {
        let mut hasher = SipHasher13::new_with_keys(0xDA7A_CAC4E, 0x0D0_4A7E);
        self.0.hash(&mut hasher);
        format!("da_v{}_{:016x}", CACHE_SCHEMA_VERSION, hasher.finish())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// What to invalidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateScope {
    All,
    Key(CacheKey),
}

/// Storage for computed results.
///
/// Callers treat every error as a miss and carry on uncached.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<AggregateResult>, CacheError>;

    /// Replace the value stored under `key`
    fn put(&self, key: CacheKey, value: AggregateResult, ttl: Duration) -> Result<(), CacheError>;

    fn invalidate(&self, scope: InvalidateScope) -> Result<(), CacheError>;

    /// Remove expired entries, returning how many were removed
    fn purge_expired(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: AggregateResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// In-process cache with per-entry TTL
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<AggregateResult>, CacheError> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|e| (e.is_expired(now), e.payload.clone()));
        match found {
            Some((false, payload)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Ok(Some(payload))
            }
            Some((true, _)) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache entry expired");
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    fn put(&self, key: CacheKey, value: AggregateResult, ttl: Duration) -> Result<(), CacheError> {
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Caching result");
        let entry = CacheEntry {
            payload: value,
            created_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key, entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn invalidate(&self, scope: InvalidateScope) -> Result<(), CacheError> {
        match scope {
            InvalidateScope::All => {
                let removed = self.entries.len();
                self.entries.clear();
                debug!(removed, "Cleared result cache");
            }
            InvalidateScope::Key(key) => {
                self.entries.remove(&key);
                debug!(key = %key, "Invalidated cache key");
            }
        }
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Cache that stores nothing; used when caching is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResultCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<AggregateResult>, CacheError> {
        Ok(None)
    }

    fn put(
        &self,
        _key: CacheKey,
        _value: AggregateResult,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    fn invalidate(&self, _scope: InvalidateScope) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterKey;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        DateRange::new(day, day + chrono::Duration::days(6)).unwrap()
    }

    fn key(filters: &FilterSet, view: ViewType) -> CacheKey {
        CacheKey::derive(
            RangeName::Last7Days,
            None,
            None,
            &range(),
            view,
            FilterDimension::Country,
            filters,
        )
    }

    #[test]
    fn test_key_covers_every_input() {
        let base = key(&FilterSet::new(), ViewType::Daily);
        let mail = FilterSet::new().with(FilterKey::Source, "mail");
        let email = FilterSet::new().with(FilterKey::Source, "email");
        assert_eq!(base, key(&FilterSet::new(), ViewType::Daily));
        assert_ne!(base, key(&FilterSet::new(), ViewType::Weekly));
        assert_ne!(base, key(&mail, ViewType::Daily));
        assert_ne!(key(&mail, ViewType::Daily), key(&email, ViewType::Daily));
        assert!(base.id().starts_with("da_v"));
        assert_eq!(base.id(), key(&FilterSet::new(), ViewType::Daily).id());
    }

    #[test]
    fn test_put_get_and_stats() {
        let cache = MemoryCache::new();
        let k = key(&FilterSet::new(), ViewType::Daily);
        assert_eq!(cache.get(&k).unwrap(), None);

        let value = AggregateResult {
            total_count: 3,
            ..AggregateResult::default()
        };
        cache
            .put(k.clone(), value.clone(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get(&k).unwrap(), Some(value));

        let stats = cache.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses, stats.writes), (1, 1, 1, 1));
    }

    #[test]
    fn test_expired_entries_miss_and_purge() {
        let cache = MemoryCache::new();
        let k = key(&FilterSet::new(), ViewType::Daily);
        let empty = AggregateResult::default();
        cache.put(k.clone(), empty.clone(), Duration::ZERO).unwrap();
        assert_eq!(cache.purge_expired(), 1);
        cache.put(k.clone(), empty, Duration::ZERO).unwrap();
        assert_eq!(cache.get(&k).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_all_is_idempotent() {
        let cache = MemoryCache::new();
        let k = key(&FilterSet::new(), ViewType::Daily);
        cache
            .put(k, AggregateResult::default(), Duration::from_secs(60))
            .unwrap();
        cache.invalidate(InvalidateScope::All).unwrap();
        cache.invalidate(InvalidateScope::All).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 2);
    }
}
