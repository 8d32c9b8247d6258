use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, NoOpCache};
use crate::coordinator::CappedLocalCache;
use crate::error::{CacheError, Result};
use crate::region::{CappedCacheRegion, TtlMode};
use crate::size_estimator::SizeEstimator;

/// Configuration front-end for one named cache use case.
///
/// The builder decides which backend to materialize: a region configured
/// with `max_entries == 0` gets a [`NoOpCache`] that stores nothing,
/// everything else gets an in-process [`CappedCacheRegion`] accounted
/// against the coordinator's global budget.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use capcache::{Cache, CacheBuilder, CapConfig, CappedLocalCache, FixedHeapMonitor};
///
/// let coordinator = CappedLocalCache::new(
///     CapConfig::new(25),
///     Arc::new(FixedHeapMonitor::new(1 << 30)),
/// )
/// .unwrap();
///
/// let cache = CacheBuilder::<String>::region("user-settings")
///     .ttl(Duration::from_secs(300))
///     .default_value("anonymous".to_string())
///     .build(&coordinator)
///     .unwrap();
///
/// cache.put("alice", "compact".to_string());
/// assert_eq!(cache.get("alice"), Some("compact".to_string()));
/// assert_eq!(cache.get("bob"), Some("anonymous".to_string()));
/// ```
pub struct CacheBuilder<V> {
    region: String,
    max_entries: u64,
    ttl: Duration,
    ttl_mode: TtlMode,
    default_value: Option<V>,
    size_of: Option<Arc<dyn Fn(&str, &V) -> usize + Send + Sync>>,
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + SizeEstimator + 'static,
{
    /// Starts a builder for the named region. Names identify a logical use
    /// case and must be unique per use case; building twice against the same
    /// name binds to the same storage.
    pub fn region(name: impl Into<String>) -> Self {
        Self {
            region: name.into(),
            max_entries: u64::MAX,
            ttl: Duration::from_secs(600),
            ttl_mode: TtlMode::default(),
            default_value: None,
            size_of: None,
        }
    }

    /// Maximum entry count for the use case. Zero disables caching entirely
    /// and yields a [`NoOpCache`]. Entry-count limits beyond the disable
    /// switch are a regional concern layered atop the global byte budget and
    /// are not enforced by the coordinator.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Default TTL for entries written without an explicit one.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether the TTL countdown restarts on access.
    pub fn ttl_mode(mut self, mode: TtlMode) -> Self {
        self.ttl_mode = mode;
        self
    }

    /// Value substituted on `get` misses. Never stored.
    pub fn default_value(mut self, value: V) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Replaces the [`SizeEstimator`]-based default with a custom estimate
    /// for key plus value. This is also the hook for resolving lazy proxies
    /// before measuring.
    pub fn size_estimator(
        mut self,
        estimate: impl Fn(&str, &V) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.size_of = Some(Arc::new(estimate));
        self
    }

    /// Builds the backend for this use case against the given coordinator.
    pub fn build(self, coordinator: &Arc<CappedLocalCache>) -> Result<Box<dyn Cache<V>>> {
        if self.max_entries == 0 {
            self.validate_common()?;
            return Ok(Box::new(NoOpCache::new(self.default_value)));
        }
        Ok(Box::new(self.build_region(coordinator)?))
    }

    /// Like [`CacheBuilder::build`] but returns the concrete capped region,
    /// for callers that need region-level accessors.
    pub fn build_region(self, coordinator: &Arc<CappedLocalCache>) -> Result<CappedCacheRegion<V>> {
        self.validate_common()?;
        let size_of = self.size_of.unwrap_or_else(|| {
            Arc::new(|key: &str, value: &V| key.estimate_size() + value.estimate_size())
        });
        let inner = coordinator.region_inner(&self.region, self.ttl, self.ttl_mode);
        Ok(CappedCacheRegion::new(
            inner,
            Arc::clone(coordinator),
            self.default_value,
            size_of,
        ))
    }

    fn validate_common(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(CacheError::EmptyRegionName);
        }
        if self.ttl.is_zero() {
            return Err(CacheError::ZeroTtl(self.region.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CapConfig;
    use crate::heap::FixedHeapMonitor;

    fn coordinator() -> Arc<CappedLocalCache> {
        CappedLocalCache::new(
            CapConfig::new(50),
            Arc::new(FixedHeapMonitor::new(1 << 30)),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let coordinator = coordinator();
        let err = CacheBuilder::<String>::region("  ")
            .build(&coordinator)
            .err();
        assert_eq!(err, Some(CacheError::EmptyRegionName));
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let coordinator = coordinator();
        let err = CacheBuilder::<String>::region("r")
            .ttl(Duration::ZERO)
            .build(&coordinator)
            .err();
        assert_eq!(err, Some(CacheError::ZeroTtl("r".to_string())));
    }

    #[test]
    fn test_zero_max_entries_disables_caching() {
        let coordinator = coordinator();
        let cache = CacheBuilder::<String>::region("disabled")
            .max_entries(0)
            .default_value("fallback".to_string())
            .build(&coordinator)
            .unwrap();
        cache.put("k", "v".to_string());
        assert_eq!(cache.get_if_present("k"), None);
        assert_eq!(cache.get("k"), Some("fallback".to_string()));
        assert_eq!(coordinator.total_size_bytes(), 0);
    }

    #[test]
    fn test_custom_estimator_is_used() {
        let coordinator = coordinator();
        let cache = CacheBuilder::<String>::region("custom-estimator")
            .ttl(Duration::from_secs(60))
            .size_estimator(|_key, _value| 5_000)
            .build_region(&coordinator)
            .unwrap();
        cache.put("k", "tiny".to_string());
        assert!(cache.size_bytes() >= 5_000);
    }
}
