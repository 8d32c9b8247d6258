use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::Cache;
use crate::cache_entry::CacheEntry;
use crate::coordinator::CappedLocalCache;
use crate::stats::CacheStats;
use crate::utils::now_ms;

/// When an entry's TTL countdown restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtlMode {
    /// The expiry is fixed when the entry is written.
    #[default]
    ExpireAfterWrite,
    /// Every successful read pushes the expiry forward by the default TTL.
    ExpireAfterAccess,
}

/// The shared, type-erased state of one region.
///
/// Typed facades are cheap handles over this; two facades built for the same
/// region name share the same table and counters.
pub(crate) struct RegionInner {
    pub(crate) name: String,
    pub(crate) entries: DashMap<String, Arc<CacheEntry>>,
    /// Summed estimated size of the entries currently in the table.
    pub(crate) size_bytes: AtomicI64,
    pub(crate) stats: CacheStats,
    pub(crate) default_ttl: Duration,
    pub(crate) ttl_mode: TtlMode,
}

impl RegionInner {
    pub(crate) fn new(name: &str, default_ttl: Duration, ttl_mode: TtlMode) -> Self {
        Self {
            name: name.to_string(),
            entries: DashMap::new(),
            size_bytes: AtomicI64::new(0),
            stats: CacheStats::new(),
            default_ttl,
            ttl_mode,
        }
    }

    pub(crate) fn default_ttl_ms(&self) -> u64 {
        self.default_ttl.as_millis() as u64
    }
}

/// A named cache partition accounted against the global memory budget.
///
/// This is the in-process implementation of the [`Cache`] contract. Every
/// accounted mutation reports its size delta to the owning
/// [`CappedLocalCache`], which may synchronously evict elsewhere to
/// compensate and lazily starts the guard loop.
///
/// The facade is `Clone`; clones share the same underlying region.
pub struct CappedCacheRegion<V> {
    inner: Arc<RegionInner>,
    coordinator: Arc<CappedLocalCache>,
    default_value: Option<V>,
    size_of: Arc<dyn Fn(&str, &V) -> usize + Send + Sync>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for CappedCacheRegion<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            coordinator: Arc::clone(&self.coordinator),
            default_value: self.default_value.clone(),
            size_of: Arc::clone(&self.size_of),
            _marker: PhantomData,
        }
    }
}

impl<V> CappedCacheRegion<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        inner: Arc<RegionInner>,
        coordinator: Arc<CappedLocalCache>,
        default_value: Option<V>,
        size_of: Arc<dyn Fn(&str, &V) -> usize + Send + Sync>,
    ) -> Self {
        Self {
            inner,
            coordinator,
            default_value,
            size_of,
            _marker: PhantomData,
        }
    }

    /// The region name this facade is bound to.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The region's tracked estimated size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.inner.size_bytes.load(Ordering::Relaxed).max(0) as u64
    }

    /// Number of entries currently in the table, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn entry_size(&self, key: &str, value: &V) -> u64 {
        // Clamp to one byte so even a degenerate estimator keeps the entry
        // visible to the budget.
        let estimated = (self.size_of)(key, value).max(1) as u64;
        estimated + self.coordinator.entry_overhead_bytes()
    }

    /// Applies a size delta to the region counter and reports it upstream.
    fn account(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        self.inner.size_bytes.fetch_add(delta, Ordering::Relaxed);
        self.coordinator.on_size_delta(delta);
    }

    fn insert_entry(&self, key: &str, value: V, ttl: Duration) {
        let now = now_ms();
        let size = self.entry_size(key, &value);
        let entry = Arc::new(CacheEntry::new(
            &self.inner.name,
            key,
            Arc::new(value),
            size,
            now,
            ttl.as_millis() as u64,
        ));
        let old = self.inner.entries.insert(key.to_string(), entry);
        let old_size = old.map(|e| e.size_bytes()).unwrap_or(0);
        self.account(size as i64 - old_size as i64);
    }
}

impl<V> Cache<V> for CappedCacheRegion<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get_if_present(&self, key: &str) -> Option<V> {
        let now = now_ms();
        let entry = self
            .inner
            .entries
            .get(key)
            .map(|guard| Arc::clone(guard.value()));
        let live = match entry {
            Some(entry) if !entry.is_expired(now) => {
                entry.record_read();
                if self.inner.ttl_mode == TtlMode::ExpireAfterAccess {
                    entry.refresh(now, self.inner.default_ttl_ms());
                }
                entry.value_as::<V>()
            }
            // Expired entries just miss; the guard cycle purges them.
            _ => None,
        };
        if live.is_some() {
            self.inner.stats.record_hit();
        } else {
            self.inner.stats.record_miss();
        }
        live
    }

    fn get(&self, key: &str) -> Option<V> {
        self.get_if_present(key)
            .or_else(|| self.default_value.clone())
    }

    fn get_or_compute(&self, key: &str, fetcher: &dyn Fn(&str) -> Option<V>) -> Option<V> {
        if let Some(value) = self.get_if_present(key) {
            return Some(value);
        }
        match fetcher(key) {
            Some(value) => {
                self.put(key, value.clone());
                Some(value)
            }
            None => self.default_value.clone(),
        }
    }

    fn get_all(&self) -> Vec<V> {
        self.inner
            .entries
            .iter()
            .filter_map(|guard| guard.value().value_as::<V>())
            .collect()
    }

    fn put(&self, key: &str, value: V) {
        self.insert_entry(key, value, self.inner.default_ttl);
    }

    fn put_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        self.insert_entry(key, value, ttl);
    }

    fn put_if_absent(&self, key: &str, value: V) -> bool {
        let now = now_ms();
        let size = self.entry_size(key, &value);
        match self.inner.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let entry = Arc::new(CacheEntry::new(
                    &self.inner.name,
                    key,
                    Arc::new(value),
                    size,
                    now,
                    self.inner.default_ttl_ms(),
                ));
                slot.insert(entry);
                self.account(size as i64);
                true
            }
        }
    }

    fn invalidate(&self, key: &str) {
        if let Some((_, entry)) = self.inner.entries.remove(key) {
            self.account(-(entry.size_bytes() as i64));
        }
    }

    fn invalidate_all(&self) {
        let mut removed: i64 = 0;
        self.inner.entries.retain(|_, entry| {
            removed += entry.size_bytes() as i64;
            false
        });
        self.account(-removed);
    }
}
