use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::utils::relative_ratio;

/// Smallest non-zero time-left ratio representable after two-decimal
/// rounding; substituted when the rounded ratio is exactly zero so the burden
/// division stays finite.
const MIN_TIME_LEFT_RATIO: f64 = 0.01;

/// A single cached record.
///
/// Everything is fixed at insertion time except the read counter, which
/// increments on every successful lookup, and the expiry timestamp, which is
/// atomic only so the refreshed-after-access TTL mode can bump it. The size
/// estimate is taken once when the entry is created; a replaced key gets a
/// fresh entry with a fresh estimate.
///
/// Entries are shared as `Arc<CacheEntry>` between the region table and the
/// eviction candidate list; pointer identity is what makes the
/// "remove iff still the same entry" eviction commit race-safe.
pub struct CacheEntry {
    region: String,
    key: String,
    value: Arc<dyn Any + Send + Sync>,
    created_at_ms: u64,
    expires_at_ms: AtomicU64,
    size_bytes: u64,
    reads: AtomicU64,
}

impl CacheEntry {
    pub(crate) fn new(
        region: &str,
        key: &str,
        value: Arc<dyn Any + Send + Sync>,
        size_bytes: u64,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Self {
        Self {
            region: region.to_string(),
            key: key.to_string(),
            value,
            created_at_ms: now_ms,
            expires_at_ms: AtomicU64::new(now_ms.saturating_add(ttl_ms)),
            size_bytes,
            reads: AtomicU64::new(0),
        }
    }

    /// Name of the region this entry belongs to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Key this entry is stored under within its region.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Estimated footprint in bytes, fixed at insertion.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Number of successful reads served from this entry.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Pushes the expiry forward to `now + ttl`. Used by the
    /// refreshed-after-access TTL mode.
    pub(crate) fn refresh(&self, now_ms: u64, ttl_ms: u64) {
        self.expires_at_ms
            .store(now_ms.saturating_add(ttl_ms), Ordering::Relaxed);
    }

    /// An entry is expired iff `now >= expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms.load(Ordering::Relaxed)
    }

    /// Downcasts the type-erased value back to `V`, cloning it out.
    ///
    /// Returns `None` if the stored value is of a different type, which can
    /// only happen when two differently-typed facades were bound to the same
    /// region name.
    pub(crate) fn value_as<V: Clone + 'static>(&self) -> Option<V> {
        self.value.downcast_ref::<V>().cloned()
    }

    /// How wasteful it is to keep this entry, at time `now`.
    ///
    /// Large, rarely-read entries close to their own expiry score highest;
    /// small, frequently read, or freshly created entries are protected. An
    /// expired entry scores the maximum representable value so it is always a
    /// top eviction candidate.
    ///
    /// ```text
    /// avg_access_interval = (now - created_at) / max(1, reads)     # in ms
    /// avg_reads_per_second = 1000 / avg_access_interval
    /// time_left_ratio = relative_ratio(expires_at - now, expires_at - created_at)
    /// burden = size_bytes / avg_reads_per_second / time_left_ratio
    /// ```
    pub fn burden(&self, now_ms: u64) -> f64 {
        let expires_at_ms = self.expires_at_ms.load(Ordering::Relaxed);
        if now_ms >= expires_at_ms {
            return f64::MAX;
        }
        let age_ms = now_ms.saturating_sub(self.created_at_ms);
        let avg_access_interval_ms = age_ms as f64 / self.reads().max(1) as f64;
        // A zero interval (brand-new entry) yields infinite reads-per-second
        // and therefore a zero burden, which is the intended protection.
        let avg_reads_per_second = 1000.0 / avg_access_interval_ms;
        let time_left_ratio = relative_ratio(
            (expires_at_ms - now_ms) as f64,
            (expires_at_ms - self.created_at_ms) as f64,
        );
        let time_left_ratio = if time_left_ratio == 0.0 {
            MIN_TIME_LEFT_RATIO
        } else {
            time_left_ratio
        };
        self.size_bytes as f64 / avg_reads_per_second / time_left_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u64, now: u64, ttl: u64) -> CacheEntry {
        CacheEntry::new("r", "k", Arc::new(0u8), size, now, ttl)
    }

    #[test]
    fn test_expiry_boundary() {
        let e = entry(10, 1_000, 500);
        assert!(!e.is_expired(1_000));
        assert!(!e.is_expired(1_499));
        assert!(e.is_expired(1_500));
        assert!(e.is_expired(2_000));
    }

    #[test]
    fn test_expired_entry_has_maximum_burden() {
        let e = entry(10, 1_000, 500);
        assert_eq!(e.burden(1_500), f64::MAX);
    }

    #[test]
    fn test_fresh_entry_has_zero_burden() {
        let e = entry(1_000_000, 1_000, 10_000);
        assert_eq!(e.burden(1_000), 0.0);
    }

    #[test]
    fn test_sooner_expiry_is_at_least_as_burdensome() {
        // Equal size, equal reads; A expires much sooner than B.
        let a = entry(1_000, 0, 1_000);
        let b = entry(1_000, 0, 100_000);
        let now = 900;
        assert!(a.burden(now) >= b.burden(now));
        assert!(a.burden(now) > b.burden(now) * 10.0);
    }

    #[test]
    fn test_reads_lower_the_burden() {
        let cold = entry(1_000, 0, 10_000);
        let hot = entry(1_000, 0, 10_000);
        for _ in 0..100 {
            hot.record_read();
        }
        let now = 5_000;
        assert!(hot.burden(now) < cold.burden(now));
    }

    #[test]
    fn test_larger_entries_are_more_burdensome() {
        let small = entry(100, 0, 10_000);
        let large = entry(100_000, 0, 10_000);
        let now = 5_000;
        assert!(large.burden(now) > small.burden(now));
    }

    #[test]
    fn test_refresh_pushes_expiry_forward() {
        let e = entry(10, 1_000, 500);
        assert!(e.is_expired(1_500));
        e.refresh(1_400, 500);
        assert!(!e.is_expired(1_500));
        assert!(e.is_expired(1_900));
    }

    #[test]
    fn test_downcast_returns_typed_value() {
        let e = CacheEntry::new("r", "k", Arc::new(String::from("payload")), 32, 0, 1_000);
        assert_eq!(e.value_as::<String>(), Some("payload".to_string()));
        assert_eq!(e.value_as::<i32>(), None);
    }

    #[test]
    fn test_read_counter() {
        let e = entry(10, 0, 1_000);
        assert_eq!(e.reads(), 0);
        e.record_read();
        e.record_read();
        assert_eq!(e.reads(), 2);
    }
}
