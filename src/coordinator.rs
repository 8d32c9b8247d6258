use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::cache_entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::guard;
use crate::heap::{HeapMonitor, SystemHeapMonitor};
use crate::region::{RegionInner, TtlMode};
use crate::stats::CacheStatistics;
use crate::utils::now_ms;

/// Secondary eviction lists at or above this length are walked in arrival
/// order instead of being sorted, bounding the cost of a single `free` call
/// on huge candidate sets.
const SECONDARY_SORT_LIMIT: usize = 500;

/// Cap configuration for the whole capped cache.
///
/// `cap_percent` is the share of the maximum heap the aggregate cache may
/// use; the soft and hard caps are expressed relative to the resulting cap
/// size. Crossing the soft cap makes writes proactively trigger compensating
/// eviction; crossing the hard cap makes the guard loop evict regardless of
/// write activity.
#[derive(Clone, Copy, Debug)]
pub struct CapConfig {
    pub cap_percent: u8,
    pub soft_cap_percent: u8,
    pub hard_cap_percent: u8,
    /// Target period of the guard loop. The default of ten seconds suits
    /// production; tests shrink it to drive cycles quickly.
    pub guard_interval: Duration,
}

impl CapConfig {
    pub fn new(cap_percent: u8) -> Self {
        Self {
            cap_percent,
            soft_cap_percent: 60,
            hard_cap_percent: 80,
            guard_interval: Duration::from_secs(10),
        }
    }

    pub fn with_soft_cap_percent(mut self, percent: u8) -> Self {
        self.soft_cap_percent = percent;
        self
    }

    pub fn with_hard_cap_percent(mut self, percent: u8) -> Self {
        self.hard_cap_percent = percent;
        self
    }

    pub fn with_guard_interval(mut self, interval: Duration) -> Self {
        self.guard_interval = interval;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.cap_percent > 100 {
            return Err(CacheError::InvalidCapPercent(self.cap_percent));
        }
        if self.soft_cap_percent > 100 {
            return Err(CacheError::InvalidRelativeCapPercent {
                name: "soft",
                value: self.soft_cap_percent,
            });
        }
        if self.hard_cap_percent > 100 {
            return Err(CacheError::InvalidRelativeCapPercent {
                name: "hard",
                value: self.hard_cap_percent,
            });
        }
        if self.soft_cap_percent > self.hard_cap_percent {
            return Err(CacheError::InvalidCapOrdering {
                soft: self.soft_cap_percent,
                hard: self.hard_cap_percent,
            });
        }
        Ok(())
    }
}

/// The burden snapshot the guard cycle publishes: the current high-burden
/// threshold plus the candidate deque in approximate descending burden order.
///
/// The snapshot is replaced wholesale behind an atomic reference swap; it is
/// never rebuilt in place. The deque itself is popped concurrently by `free`
/// callers under its own mutex.
pub(crate) struct EvictionState {
    pub(crate) high_burden_threshold: f64,
    pub(crate) candidates: Mutex<VecDeque<Arc<CacheEntry>>>,
}

impl EvictionState {
    fn empty() -> Self {
        Self {
            high_burden_threshold: 0.0,
            candidates: Mutex::new(VecDeque::new()),
        }
    }
}

/// Owner of all cache regions and the global memory budget.
///
/// One coordinator is constructed at process start and passed explicitly to
/// every region build; there is no ambient global instance. It tracks the
/// aggregate estimated size, computes the soft and hard caps against the
/// maximum heap, runs the eviction algorithm, and publishes a point-in-time
/// [`CacheStatistics`] snapshot each guard cycle.
pub struct CappedLocalCache {
    regions: DashMap<String, Arc<RegionInner>>,
    total_size: AtomicI64,
    config: CapConfig,
    cap_size_bytes: u64,
    soft_cap_bytes: u64,
    hard_cap_bytes: u64,
    entry_overhead: u64,
    heap: Arc<dyn HeapMonitor>,
    eviction: RwLock<Arc<EvictionState>>,
    statistics: RwLock<Arc<CacheStatistics>>,
    guard_started: AtomicBool,
    weak_self: Weak<CappedLocalCache>,
}

impl CappedLocalCache {
    /// Builds a coordinator with caps sized against the given heap monitor.
    ///
    /// Fails fast on invalid cap configuration; this is a programmer error,
    /// not a runtime condition.
    pub fn new(config: CapConfig, heap: Arc<dyn HeapMonitor>) -> Result<Arc<Self>> {
        config.validate()?;
        let max_heap = heap.max_heap_bytes();
        let cap_size_bytes = percent_of(max_heap, config.cap_percent);
        let soft_cap_bytes = percent_of(cap_size_bytes, config.soft_cap_percent);
        let hard_cap_bytes = percent_of(cap_size_bytes, config.hard_cap_percent);
        let initial_stats = CacheStatistics {
            cap_percent: config.cap_percent,
            soft_cap_percent: config.soft_cap_percent,
            hard_cap_percent: config.hard_cap_percent,
            ..Default::default()
        };
        debug!(
            cap_size_bytes,
            soft_cap_bytes, hard_cap_bytes, "capped cache coordinator created"
        );
        Ok(Arc::new_cyclic(|weak| Self {
            regions: DashMap::new(),
            total_size: AtomicI64::new(0),
            config,
            cap_size_bytes,
            soft_cap_bytes,
            hard_cap_bytes,
            // The fixed cost of an entry shell, measured once so every
            // estimate does not have to re-measure shared overhead.
            entry_overhead: std::mem::size_of::<CacheEntry>() as u64,
            heap,
            eviction: RwLock::new(Arc::new(EvictionState::empty())),
            statistics: RwLock::new(Arc::new(initial_stats)),
            guard_started: AtomicBool::new(false),
            weak_self: weak.clone(),
        }))
    }

    /// Convenience constructor probing the operating system for heap limits.
    pub fn with_system_heap(config: CapConfig) -> Result<Arc<Self>> {
        Self::new(config, Arc::new(SystemHeapMonitor::new()))
    }

    /// Returns the region for `name`, creating it on first use. A second
    /// request for the same name binds to the same region; the original
    /// region's TTL policy wins.
    pub(crate) fn region_inner(
        &self,
        name: &str,
        default_ttl: Duration,
        ttl_mode: TtlMode,
    ) -> Arc<RegionInner> {
        Arc::clone(
            &self
                .regions
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RegionInner::new(name, default_ttl, ttl_mode))),
        )
    }

    pub(crate) fn regions_snapshot(&self) -> Vec<Arc<RegionInner>> {
        self.regions
            .iter()
            .map(|guard| Arc::clone(guard.value()))
            .collect()
    }

    /// Aggregate estimated size of all live entries, in bytes. May
    /// transiently include expired entries awaiting purge.
    pub fn total_size_bytes(&self) -> i64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn cap_size_bytes(&self) -> u64 {
        self.cap_size_bytes
    }

    pub fn soft_cap_bytes(&self) -> u64 {
        self.soft_cap_bytes
    }

    pub fn hard_cap_bytes(&self) -> u64 {
        self.hard_cap_bytes
    }

    pub(crate) fn entry_overhead_bytes(&self) -> u64 {
        self.entry_overhead
    }

    pub(crate) fn cap_config(&self) -> &CapConfig {
        &self.config
    }

    pub(crate) fn heap(&self) -> &dyn HeapMonitor {
        self.heap.as_ref()
    }

    /// The latest statistics snapshot published by the guard cycle. Before
    /// the first cycle this carries the configured caps and empty totals.
    pub fn statistics(&self) -> Arc<CacheStatistics> {
        Arc::clone(&self.statistics.read())
    }

    /// Accounting hook called by regions for every accounted mutation.
    ///
    /// A positive delta that pushes the total over the soft cap triggers an
    /// immediate compensating [`CappedLocalCache::free`] of the same amount.
    pub(crate) fn on_size_delta(&self, delta: i64) {
        let total = self.total_size.fetch_add(delta, Ordering::SeqCst) + delta;
        if delta > 0 && self.soft_cap_bytes > 0 && total.max(0) as u64 > self.soft_cap_bytes {
            self.free(delta);
        }
        if total > 0 && self.config.cap_percent > 0 {
            self.ensure_guard_running();
        }
    }

    /// Tries to evict `target_bytes` worth of entries; returns the bytes
    /// actually freed.
    ///
    /// Bytes are freed only by invalidating whole entries. A shortfall is
    /// expected under load and is logged at info level, never raised as an
    /// error; the next guard cycle or real memory pressure picks up the
    /// remainder.
    pub fn free(&self, target_bytes: i64) -> i64 {
        if target_bytes <= 0 {
            return 0;
        }
        let state = Arc::clone(&self.eviction.read());
        // Both passes filter by the threshold captured here; a burst of
        // evictions within one call never adapts the threshold mid-call.
        let threshold = state.high_burden_threshold;
        let now = now_ms();
        let mut remaining = target_bytes;
        let mut passed_over: Vec<(f64, Arc<CacheEntry>)> = Vec::new();

        {
            let mut candidates = state.candidates.lock();
            while remaining > 0 {
                let Some(entry) = candidates.pop_front() else {
                    break;
                };
                let burden = entry.burden(now);
                if burden > threshold {
                    if self.evict_entry(&entry) {
                        remaining -= entry.size_bytes() as i64;
                    }
                } else {
                    passed_over.push((burden, entry));
                }
            }
        }

        if remaining > 0 && !passed_over.is_empty() {
            if passed_over.len() < SECONDARY_SORT_LIMIT {
                passed_over.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            }
            for (burden, entry) in &passed_over {
                if remaining <= 0 {
                    break;
                }
                if *burden > threshold && self.evict_entry(entry) {
                    remaining -= entry.size_bytes() as i64;
                }
            }
        }

        let freed = target_bytes - remaining;
        if remaining > 0 {
            info!(
                target_bytes,
                freed,
                shortfall = remaining,
                "eviction fell short of the requested bytes"
            );
        }
        freed
    }

    /// Removes `entry` from its region iff the table still holds this exact
    /// entry, and settles the accounting on success.
    ///
    /// The pointer-identity check prevents double-accounting when another
    /// thread has already evicted or replaced the key.
    pub(crate) fn evict_entry(&self, entry: &Arc<CacheEntry>) -> bool {
        let Some(region) = self
            .regions
            .get(entry.region())
            .map(|guard| Arc::clone(guard.value()))
        else {
            return false;
        };
        let removed = region
            .entries
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry))
            .is_some();
        if removed {
            let size = entry.size_bytes() as i64;
            region.size_bytes.fetch_sub(size, Ordering::Relaxed);
            self.on_size_delta(-size);
        }
        removed
    }

    pub(crate) fn publish(
        &self,
        high_burden_threshold: f64,
        candidates: VecDeque<Arc<CacheEntry>>,
        statistics: CacheStatistics,
    ) {
        *self.eviction.write() = Arc::new(EvictionState {
            high_burden_threshold,
            candidates: Mutex::new(candidates),
        });
        *self.statistics.write() = Arc::new(statistics);
    }

    /// Starts the guard loop if it is not running. Called from the
    /// accounting hook, so the loop comes up lazily with the first byte of
    /// cached data.
    fn ensure_guard_running(&self) {
        if self
            .guard_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let Some(coordinator) = self.weak_self.upgrade() else {
                self.guard_started.store(false, Ordering::SeqCst);
                return;
            };
            if let Err(err) = guard::spawn(coordinator) {
                self.guard_started.store(false, Ordering::SeqCst);
                error!(%err, "failed to spawn the cache guard thread");
            }
        }
    }

    /// Releases the started flag when the guard loop exits. Returns `true`
    /// if the loop should keep running because data arrived in the window
    /// between the emptiness check and the release.
    pub(crate) fn release_guard(&self) -> bool {
        self.guard_started.store(false, Ordering::SeqCst);
        if self.total_size_bytes() > 0 {
            // Re-acquire instead of exiting so a write racing the shutdown
            // is not left without a guard.
            return self
                .guard_started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn guard_is_running(&self) -> bool {
        self.guard_started.load(Ordering::SeqCst)
    }
}

fn percent_of(base: u64, percent: u8) -> u64 {
    (base as u128 * percent as u128 / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::FixedHeapMonitor;

    fn coordinator_with_heap(max_heap: u64, cap_percent: u8) -> Arc<CappedLocalCache> {
        CappedLocalCache::new(
            CapConfig::new(cap_percent),
            Arc::new(FixedHeapMonitor::new(max_heap)),
        )
        .unwrap()
    }

    #[test]
    fn test_cap_derivation() {
        let coordinator = coordinator_with_heap(100_000, 50);
        assert_eq!(coordinator.cap_size_bytes(), 50_000);
        assert_eq!(coordinator.soft_cap_bytes(), 30_000);
        assert_eq!(coordinator.hard_cap_bytes(), 40_000);
        assert!(coordinator.soft_cap_bytes() <= coordinator.hard_cap_bytes());
        assert!(coordinator.hard_cap_bytes() <= coordinator.cap_size_bytes());
    }

    #[test]
    fn test_invalid_configs_fail_fast() {
        let heap: Arc<dyn HeapMonitor> = Arc::new(FixedHeapMonitor::new(1_000));
        assert_eq!(
            CappedLocalCache::new(CapConfig::new(101), Arc::clone(&heap)).err(),
            Some(CacheError::InvalidCapPercent(101))
        );
        assert_eq!(
            CappedLocalCache::new(
                CapConfig::new(50).with_soft_cap_percent(90).with_hard_cap_percent(80),
                Arc::clone(&heap),
            )
            .err(),
            Some(CacheError::InvalidCapOrdering { soft: 90, hard: 80 })
        );
        assert_eq!(
            CappedLocalCache::new(
                CapConfig::new(50).with_hard_cap_percent(110),
                heap,
            )
            .err(),
            Some(CacheError::InvalidRelativeCapPercent {
                name: "hard",
                value: 110
            })
        );
    }

    #[test]
    fn test_region_registry_returns_same_instance() {
        let coordinator = coordinator_with_heap(1 << 20, 50);
        let a = coordinator.region_inner("r", Duration::from_secs(1), TtlMode::ExpireAfterWrite);
        let b = coordinator.region_inner("r", Duration::from_secs(9), TtlMode::ExpireAfterAccess);
        assert!(Arc::ptr_eq(&a, &b));
        // The original region's policy wins.
        assert_eq!(b.default_ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_free_with_no_candidates_reports_shortfall() {
        let coordinator = coordinator_with_heap(1 << 20, 50);
        assert_eq!(coordinator.free(10_000), 0);
        assert_eq!(coordinator.free(0), 0);
        assert_eq!(coordinator.free(-5), 0);
    }

    #[test]
    fn test_guard_starts_with_the_first_accounted_byte() {
        let coordinator = coordinator_with_heap(1 << 20, 50);
        assert!(!coordinator.guard_is_running());
        coordinator.on_size_delta(128);
        assert!(coordinator.guard_is_running());
        coordinator.on_size_delta(-128);
    }

    #[test]
    fn test_zero_cap_percent_never_starts_the_guard() {
        let coordinator = coordinator_with_heap(1 << 20, 0);
        assert_eq!(coordinator.cap_size_bytes(), 0);
        coordinator.on_size_delta(128);
        assert!(!coordinator.guard_is_running());
        coordinator.on_size_delta(-128);
    }

    #[test]
    fn test_initial_statistics_echo_caps() {
        let coordinator = coordinator_with_heap(1 << 20, 25);
        let stats = coordinator.statistics();
        assert_eq!(stats.cap_percent, 25);
        assert_eq!(stats.soft_cap_percent, 60);
        assert_eq!(stats.hard_cap_percent, 80);
        assert!(stats.regions.is_empty());
    }
}
