//! Behavioral tests for the region-level cache contract: TTL handling,
//! default values, computed reads, and conditional insertion.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use capcache::{
    Cache, CacheBuilder, CapConfig, CappedLocalCache, FixedHeapMonitor, TtlMode,
};

fn coordinator() -> Arc<CappedLocalCache> {
    CappedLocalCache::new(
        CapConfig::new(50),
        Arc::new(FixedHeapMonitor::new(1 << 30)),
    )
    .expect("valid config")
}

#[test]
fn test_entries_expire_after_their_ttl() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("ttl-expiry")
        .ttl(Duration::from_millis(50))
        .build(&coordinator)
        .expect("valid region");

    cache.put("k", "v".to_string());
    assert_eq!(cache.get_if_present("k"), Some("v".to_string()));

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(cache.get_if_present("k"), None);
}

#[test]
fn test_explicit_ttl_overrides_the_default() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("ttl-override")
        .ttl(Duration::from_millis(50))
        .build(&coordinator)
        .expect("valid region");

    cache.put_with_ttl("long", "v".to_string(), Duration::from_secs(60));
    cache.put("short", "v".to_string());

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(cache.get_if_present("long"), Some("v".to_string()));
    assert_eq!(cache.get_if_present("short"), None);
}

#[test]
fn test_access_refreshes_ttl_in_expire_after_access_mode() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("ttl-sliding")
        .ttl(Duration::from_millis(100))
        .ttl_mode(TtlMode::ExpireAfterAccess)
        .build(&coordinator)
        .expect("valid region");

    cache.put("k", "v".to_string());
    // Keep touching the entry past its original deadline.
    for _ in 0..4 {
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(
            cache.get_if_present("k"),
            Some("v".to_string()),
            "each access must push the expiry forward"
        );
    }
    // Stop touching it and let it lapse.
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(cache.get_if_present("k"), None);
}

#[test]
fn test_default_value_is_served_but_never_stored() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("defaults")
        .ttl(Duration::from_secs(60))
        .default_value("fallback".to_string())
        .build(&coordinator)
        .expect("valid region");

    assert_eq!(cache.get("missing"), Some("fallback".to_string()));
    assert_eq!(cache.get_if_present("missing"), None);
    assert!(cache.get_all().is_empty());
    assert_eq!(coordinator.total_size_bytes(), 0);
}

#[test]
fn test_get_or_compute_fetches_once_per_expiry() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("computed")
        .ttl(Duration::from_secs(60))
        .build(&coordinator)
        .expect("valid region");

    let fetches = AtomicU32::new(0);
    let fetcher = |key: &str| {
        fetches.fetch_add(1, Ordering::SeqCst);
        Some(format!("fetched:{key}"))
    };

    assert_eq!(
        cache.get_or_compute("k", &fetcher),
        Some("fetched:k".to_string())
    );
    assert_eq!(
        cache.get_or_compute("k", &fetcher),
        Some("fetched:k".to_string())
    );
    assert_eq!(fetches.load(Ordering::SeqCst), 1, "second read must be a hit");
}

#[test]
fn test_get_or_compute_falls_back_to_the_default() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<String>::region("computed-default")
        .ttl(Duration::from_secs(60))
        .default_value("fallback".to_string())
        .build(&coordinator)
        .expect("valid region");

    let empty = |_key: &str| None;
    assert_eq!(cache.get_or_compute("k", &empty), Some("fallback".to_string()));
    // The fallback itself was not cached.
    assert_eq!(cache.get_if_present("k"), None);
}

#[test]
fn test_put_if_absent_respects_existing_entries() {
    let coordinator = coordinator();
    let cache = CacheBuilder::<u64>::region("absent")
        .ttl(Duration::from_secs(60))
        .build(&coordinator)
        .expect("valid region");

    assert!(cache.put_if_absent("k", 1));
    assert!(!cache.put_if_absent("k", 2));
    assert_eq!(cache.get_if_present("k"), Some(1));

    cache.invalidate("k");
    assert!(cache.put_if_absent("k", 3));
    assert_eq!(cache.get_if_present("k"), Some(3));
}

#[test]
fn test_regions_with_different_value_types_coexist() {
    let coordinator = coordinator();
    let names = CacheBuilder::<String>::region("names")
        .ttl(Duration::from_secs(60))
        .build(&coordinator)
        .expect("valid region");
    let counters = CacheBuilder::<u64>::region("counters")
        .ttl(Duration::from_secs(60))
        .build(&coordinator)
        .expect("valid region");

    names.put("a", "alice".to_string());
    counters.put("a", 42);

    assert_eq!(names.get_if_present("a"), Some("alice".to_string()));
    assert_eq!(counters.get_if_present("a"), Some(42));
}
