//! # capcache
//!
//! A process-local, multi-region cache that enforces a single global memory
//! budget across all regions.
//!
//! Domain code builds named cache regions through [`CacheBuilder`] and
//! programs against the [`Cache`] trait. All regions report their estimated
//! byte sizes to one [`CappedLocalCache`] coordinator, which derives a cap
//! from the process heap, evicts the least useful entries when writes push
//! the aggregate over the soft cap, and runs a lazily-started guard loop that
//! purges expired entries, ranks the survivors by *burden* (bytes held per
//! unit of usefulness), and enforces the hard cap.
//!
//! # Features
//!
//! - Named regions with per-region TTL, TTL mode, default values, and size
//!   estimators, all accounted against one global byte budget.
//! - Burden-based eviction: big, cold, soon-to-expire entries go first.
//! - A background guard loop that starts with the first cached byte and
//!   exits when the cache drains.
//! - A memory-pressure fallback that evicts when the runtime's free memory
//!   is genuinely low, regardless of what the size estimates claim.
//! - A [`NoOpCache`] backend so a use case can be switched off without
//!   touching its call sites.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use capcache::{Cache, CacheBuilder, CapConfig, CappedLocalCache, FixedHeapMonitor};
//!
//! // One coordinator per process; 25% of the heap for all caches combined.
//! let coordinator = CappedLocalCache::new(
//!     CapConfig::new(25),
//!     Arc::new(FixedHeapMonitor::new(1 << 30)),
//! )
//! .unwrap();
//!
//! let sessions = CacheBuilder::<String>::region("sessions")
//!     .ttl(Duration::from_secs(600))
//!     .build(&coordinator)
//!     .unwrap();
//!
//! sessions.put("s1", "alice".to_string());
//! assert_eq!(sessions.get_if_present("s1"), Some("alice".to_string()));
//!
//! let loaded = sessions.get_or_compute("s2", &|_key| Some("bob".to_string()));
//! assert_eq!(loaded, Some("bob".to_string()));
//! ```

mod builder;
mod cache;
mod cache_entry;
mod coordinator;
mod error;
mod guard;
mod heap;
mod region;
mod size_estimator;
mod stats;
pub mod utils;

pub use builder::CacheBuilder;
pub use cache::{Cache, NoOpCache};
pub use cache_entry::CacheEntry;
pub use coordinator::{CapConfig, CappedLocalCache};
pub use error::{CacheError, Result};
pub use heap::{FixedHeapMonitor, HeapMonitor, SystemHeapMonitor};
pub use region::{CappedCacheRegion, TtlMode};
pub use size_estimator::SizeEstimator;
pub use stats::{CacheStatistics, CacheStats, HighBurdenStatistics, RegionStatistics};
