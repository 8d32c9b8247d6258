//! The guard loop: a lazily-started background thread that periodically
//! purges expired entries, recomputes burden statistics, rebuilds the
//! eviction candidate list, and protects the process from memory exhaustion.

use std::collections::VecDeque;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::cache_entry::CacheEntry;
use crate::coordinator::CappedLocalCache;
use crate::region::RegionInner;
use crate::stats::{CacheStatistics, HighBurdenStatistics, RegionStatistics};
use crate::utils::{now_ms, relative_ratio};

/// The share of the average burden above which an entry counts as high
/// burden. Heuristic: roughly the upper third of entries by burden.
const HIGH_BURDEN_FRACTION: f64 = 2.0 / 3.0;

pub(crate) fn spawn(coordinator: Arc<CappedLocalCache>) -> io::Result<()> {
    thread::Builder::new()
        .name("capcache-guard".to_string())
        .spawn(move || run(coordinator))
        .map(|_| ())
}

/// The loop body. Exits only when the global size has returned to zero; a
/// failing cycle is logged and the loop carries on.
fn run(coordinator: Arc<CappedLocalCache>) {
    info!("cache guard loop started");
    loop {
        let cycle_started = Instant::now();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| coordinator.guard_cycle())) {
            let reason = panic
                .downcast_ref::<&str>()
                .copied()
                .map(str::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%reason, "cache guard cycle failed, continuing with the next cycle");
        }
        if coordinator.total_size_bytes() <= 0 {
            if !coordinator.release_guard() {
                info!("cache guard loop exiting, cache is empty");
                return;
            }
        }
        // Subtract the cycle's own work so the loop period does not inflate.
        let elapsed = cycle_started.elapsed();
        let interval = coordinator.cap_config().guard_interval;
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

/// Per-region working data for one cycle.
struct RegionScan {
    region: Arc<RegionInner>,
    /// Live entries paired with the burden computed during the sweep.
    entries: Vec<(f64, Arc<CacheEntry>)>,
    burden_sum: f64,
    size_sum: u64,
    burden_per_byte: f64,
}

impl CappedLocalCache {
    /// One guard cycle: purge and measure, update the threshold, rebuild the
    /// candidate deque, publish, then protect the runtime.
    pub(crate) fn guard_cycle(&self) {
        let now = now_ms();
        let mut scans: Vec<RegionScan> = Vec::new();
        let mut total_burden = 0.0;
        let mut total_entries: u64 = 0;

        for region in self.regions_snapshot() {
            let snapshot: Vec<Arc<CacheEntry>> = region
                .entries
                .iter()
                .map(|guard| Arc::clone(guard.value()))
                .collect();
            let mut scan = RegionScan {
                region,
                entries: Vec::with_capacity(snapshot.len()),
                burden_sum: 0.0,
                size_sum: 0,
                burden_per_byte: 0.0,
            };
            for entry in snapshot {
                if entry.is_expired(now) {
                    self.evict_entry(&entry);
                    continue;
                }
                let burden = entry.burden(now);
                scan.burden_sum += burden;
                scan.size_sum += entry.size_bytes();
                scan.entries.push((burden, entry));
            }
            scan.burden_per_byte = relative_ratio(scan.burden_sum, scan.size_sum as f64);
            total_burden += scan.burden_sum;
            total_entries += scan.entries.len() as u64;
            scans.push(scan);
        }

        let average_burden = if total_entries > 0 {
            total_burden / total_entries as f64
        } else {
            0.0
        };
        let threshold = average_burden * HIGH_BURDEN_FRACTION;

        // Regions with the most burden per stored byte contribute their
        // candidates first.
        scans.sort_by(|a, b| {
            b.burden_per_byte
                .partial_cmp(&a.burden_per_byte)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Cheap, non-stable approximate descending order: candidates at or
        // above the current front go to the front, everything else to the
        // back. No full sort.
        let mut candidates: VecDeque<Arc<CacheEntry>> = VecDeque::new();
        let mut front_burden = 0.0;
        let mut high_burden = HighBurdenStatistics::default();
        let mut high_burden_sum = 0.0;
        for scan in &scans {
            for (burden, entry) in &scan.entries {
                if *burden > threshold {
                    if candidates.is_empty() || *burden >= front_burden {
                        candidates.push_front(Arc::clone(entry));
                        front_burden = *burden;
                    } else {
                        candidates.push_back(Arc::clone(entry));
                    }
                    high_burden.entries += 1;
                    high_burden.size_bytes += entry.size_bytes();
                    high_burden_sum += *burden;
                }
            }
        }
        if high_burden.entries > 0 {
            high_burden.average_burden = high_burden_sum / high_burden.entries as f64;
        }

        let config = self.cap_config();
        let mut statistics = CacheStatistics {
            cap_percent: config.cap_percent,
            soft_cap_percent: config.soft_cap_percent,
            hard_cap_percent: config.hard_cap_percent,
            regions: Vec::with_capacity(scans.len()),
            total_entries,
            total_hits: 0,
            total_misses: 0,
            total_size_bytes: 0,
            average_burden,
            high_burden,
        };
        for scan in &scans {
            let hits = scan.region.stats.hits();
            let misses = scan.region.stats.misses();
            statistics.total_hits += hits;
            statistics.total_misses += misses;
            statistics.total_size_bytes += scan.size_sum;
            statistics.regions.push(RegionStatistics {
                name: scan.region.name.clone(),
                entries: scan.entries.len() as u64,
                hits,
                misses,
                size_bytes: scan.size_sum,
                burden_per_byte: scan.burden_per_byte,
            });
        }

        debug!(
            entries = total_entries,
            size_bytes = statistics.total_size_bytes,
            high_burden_entries = statistics.high_burden.entries,
            threshold,
            "guard cycle published a new burden snapshot"
        );
        self.publish(threshold, candidates, statistics);
        self.protect_runtime();
    }

    /// Forced eviction beyond what writes compensate for: the hard cap, and
    /// a ground-truth check against actually-low free memory (the size
    /// estimator is approximate, real pressure is authoritative).
    fn protect_runtime(&self) {
        let total = self.total_size_bytes();
        let hard_cap = self.hard_cap_bytes();
        if hard_cap > 0 && total.max(0) as u64 > hard_cap {
            let overshoot = total - hard_cap as i64;
            warn!(total, hard_cap, overshoot, "cache exceeds the hard cap, forcing eviction");
            self.free(overshoot);
        }

        let max_heap = self.heap().max_heap_bytes();
        let pressure_floor = max_heap / 10;
        let free_heap = self.heap().free_heap_bytes();
        let total = self.total_size_bytes();
        if pressure_floor > 0 && free_heap < pressure_floor && total.max(0) as u64 > pressure_floor
        {
            warn!(
                free_heap,
                pressure_floor, "runtime memory is low, forcing additional eviction"
            );
            self.free(pressure_floor as i64);
        }
    }
}
