use std::time::Duration;

/// The key/value contract every cache backend satisfies.
///
/// Domain callers program against this trait only, so the memory-budgeted
/// in-process implementation, the storing-nothing [`NoOpCache`], and any
/// out-of-process backend are interchangeable.
///
/// Values are inserted by value and returned by clone; `V` is expected to be
/// cheap to clone (typically an `Arc` around the real payload). There is no
/// way to insert an absent value: use [`Cache::invalidate`] instead of
/// putting a sentinel.
pub trait Cache<V>: Send + Sync {
    /// Returns the live, non-expired value or `None`; never substitutes the
    /// default value. Records a hit or miss.
    fn get_if_present(&self, key: &str) -> Option<V>;

    /// Like [`Cache::get_if_present`] but substitutes the region's configured
    /// default value on a miss. The default is never stored.
    fn get(&self, key: &str) -> Option<V>;

    /// Returns the cached live value if present, otherwise invokes `fetcher`
    /// and caches a non-`None` result under the region's default TTL before
    /// returning it. Falls back to the default value when both the cache and
    /// the fetcher come up empty.
    ///
    /// There is no single-flight guarantee: concurrent misses on the same key
    /// may each invoke `fetcher`, so it must be side-effect-safe to call more
    /// than once.
    fn get_or_compute(&self, key: &str, fetcher: &dyn Fn(&str) -> Option<V>) -> Option<V>;

    /// Finite snapshot of the currently stored values. Logically expired
    /// entries may still appear until the next purge.
    fn get_all(&self) -> Vec<V>;

    /// Stores `value` under `key` with the region's default TTL, replacing
    /// any prior entry.
    fn put(&self, key: &str, value: V);

    /// Stores `value` under `key` with an explicit TTL.
    fn put_with_ttl(&self, key: &str, value: V, ttl: Duration);

    /// Stores `value` only if `key` has no entry; returns whether the
    /// insertion happened.
    fn put_if_absent(&self, key: &str, value: V) -> bool;

    /// Removes the entry for `key`, if any.
    fn invalidate(&self, key: &str);

    /// Removes every entry in the region.
    fn invalidate_all(&self);
}

/// A cache that stores nothing.
///
/// Selected by the builder when a region is configured with
/// `max_entries == 0`. Reads always miss (modulo the default value) and the
/// fetcher result of [`Cache::get_or_compute`] is passed through without
/// being retained.
pub struct NoOpCache<V> {
    default_value: Option<V>,
}

impl<V> NoOpCache<V> {
    pub fn new(default_value: Option<V>) -> Self {
        Self { default_value }
    }
}

impl<V: Clone + Send + Sync> Cache<V> for NoOpCache<V> {
    fn get_if_present(&self, _key: &str) -> Option<V> {
        None
    }

    fn get(&self, _key: &str) -> Option<V> {
        self.default_value.clone()
    }

    fn get_or_compute(&self, key: &str, fetcher: &dyn Fn(&str) -> Option<V>) -> Option<V> {
        fetcher(key).or_else(|| self.default_value.clone())
    }

    fn get_all(&self) -> Vec<V> {
        Vec::new()
    }

    fn put(&self, _key: &str, _value: V) {}

    fn put_with_ttl(&self, _key: &str, _value: V, _ttl: Duration) {}

    fn put_if_absent(&self, _key: &str, _value: V) -> bool {
        false
    }

    fn invalidate(&self, _key: &str) {}

    fn invalidate_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_never_stores() {
        let cache: NoOpCache<i32> = NoOpCache::new(None);
        cache.put("k", 1);
        assert_eq!(cache.get_if_present("k"), None);
        assert!(cache.get_all().is_empty());
        assert!(!cache.put_if_absent("k", 2));
    }

    #[test]
    fn test_noop_serves_default() {
        let cache = NoOpCache::new(Some(7));
        assert_eq!(cache.get("anything"), Some(7));
        assert_eq!(cache.get_if_present("anything"), None);
    }

    #[test]
    fn test_noop_get_or_compute_passes_through() {
        let cache: NoOpCache<String> = NoOpCache::new(Some("default".to_string()));
        let computed = cache.get_or_compute("k", &|key| Some(format!("fetched:{key}")));
        assert_eq!(computed, Some("fetched:k".to_string()));
        // Nothing was retained.
        assert_eq!(cache.get_if_present("k"), None);
        // Fetcher returning nothing falls back to the default.
        let fallback = cache.get_or_compute("k", &|_| None);
        assert_eq!(fallback, Some("default".to_string()));
    }
}
