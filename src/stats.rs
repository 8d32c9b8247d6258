use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic hit/miss counters for one region.
///
/// All operations use atomic adds with `Relaxed` ordering; the counters are
/// monitoring data, not synchronization points.
///
/// # Examples
///
/// ```
/// use capcache::CacheStats;
///
/// let stats = CacheStats::new();
/// stats.record_hit();
/// stats.record_miss();
/// assert_eq!(stats.hits(), 1);
/// assert_eq!(stats.misses(), 1);
/// assert_eq!(stats.hit_rate(), 0.5);
/// ```
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total lookups, hits plus misses.
    #[inline]
    pub fn total_accesses(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups served from the cache, 0.0 when untouched.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Point-in-time view of one region, as published by the guard cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStatistics {
    pub name: String,
    /// Live (non-expired at scan time) entry count.
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    /// Summed estimated size of live entries.
    pub size_bytes: u64,
    /// Average burden per stored byte, rounded to two decimals.
    pub burden_per_byte: f64,
}

/// Aggregate view of the entries currently flagged as high-burden.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighBurdenStatistics {
    pub entries: u64,
    pub size_bytes: u64,
    pub average_burden: f64,
}

/// Read-only snapshot of the whole capped cache, replaced wholesale each
/// guard cycle. Readers always observe one consistent cycle's numbers.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub cap_percent: u8,
    pub soft_cap_percent: u8,
    pub hard_cap_percent: u8,
    pub regions: Vec<RegionStatistics>,
    pub total_entries: u64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_size_bytes: u64,
    /// Average burden per live entry across all regions.
    pub average_burden: f64,
    pub high_burden: HighBurdenStatistics,
}

impl CacheStatistics {
    /// Looks up the snapshot row for a region by name.
    pub fn region(&self, name: &str) -> Option<&RegionStatistics> {
        self.regions.iter().find(|r| r.name == name)
    }
}
