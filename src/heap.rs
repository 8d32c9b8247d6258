//! Runtime memory probing.
//!
//! The coordinator sizes its caps against the maximum heap and, as a ground
//! truth fallback for the approximate size estimator, reacts to actually-low
//! free memory reported here.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// Fallback when the platform cannot report physical memory.
const DEFAULT_MAX_HEAP_BYTES: u64 = 1024 * 1024 * 1024;

/// Source of heap limits and current free memory.
pub trait HeapMonitor: Send + Sync {
    /// Upper bound of memory the process may use; caps are percentages of
    /// this figure.
    fn max_heap_bytes(&self) -> u64;

    /// Currently free memory. May be probed on every call.
    fn free_heap_bytes(&self) -> u64;
}

/// Heap monitor with explicitly configured numbers.
///
/// Used by embedders that want the budget sized against something other than
/// physical RAM, and by tests that need deterministic caps.
pub struct FixedHeapMonitor {
    max: u64,
    free: AtomicU64,
}

impl FixedHeapMonitor {
    pub fn new(max_heap_bytes: u64) -> Self {
        Self {
            max: max_heap_bytes,
            free: AtomicU64::new(max_heap_bytes),
        }
    }

    /// Overrides the reported free memory, e.g. to simulate pressure.
    pub fn set_free_heap_bytes(&self, bytes: u64) {
        self.free.store(bytes, Ordering::Relaxed);
    }
}

impl HeapMonitor for FixedHeapMonitor {
    fn max_heap_bytes(&self) -> u64 {
        self.max
    }

    fn free_heap_bytes(&self) -> u64 {
        self.free.load(Ordering::Relaxed)
    }
}

/// Heap monitor backed by the operating system.
///
/// Total physical memory is probed once at construction; free memory is
/// probed on every call. On platforms where free memory cannot be measured
/// the monitor reports the maximum, which disables the pressure fallback but
/// keeps cap sizing working.
pub struct SystemHeapMonitor {
    max: u64,
}

impl SystemHeapMonitor {
    pub fn new() -> Self {
        let max = physical_ram_bytes().unwrap_or_else(|| {
            warn!(
                fallback = DEFAULT_MAX_HEAP_BYTES,
                "could not probe physical memory, using fallback heap size"
            );
            DEFAULT_MAX_HEAP_BYTES
        });
        Self { max }
    }
}

impl Default for SystemHeapMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapMonitor for SystemHeapMonitor {
    fn max_heap_bytes(&self) -> u64 {
        self.max
    }

    fn free_heap_bytes(&self) -> u64 {
        free_ram_bytes().unwrap_or(self.max)
    }
}

#[cfg(target_os = "linux")]
fn physical_ram_bytes() -> Option<u64> {
    let mut info = std::mem::MaybeUninit::<libc::sysinfo>::uninit();
    let rc = unsafe { libc::sysinfo(info.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    Some((info.totalram as u64).saturating_mul(info.mem_unit as u64))
}

#[cfg(target_os = "linux")]
fn free_ram_bytes() -> Option<u64> {
    let mut info = std::mem::MaybeUninit::<libc::sysinfo>::uninit();
    let rc = unsafe { libc::sysinfo(info.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    Some((info.freeram as u64).saturating_mul(info.mem_unit as u64))
}

#[cfg(target_os = "macos")]
fn physical_ram_bytes() -> Option<u64> {
    use std::ffi::CString;
    use std::mem::size_of;
    use std::ptr;

    let key = CString::new("hw.memsize").ok()?;
    let mut value: u64 = 0;
    let mut len = size_of::<u64>();
    let rc = unsafe {
        libc::sysctlbyname(
            key.as_ptr(),
            &mut value as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc == 0 && len == size_of::<u64>() {
        Some(value)
    } else {
        None
    }
}

#[cfg(target_os = "macos")]
fn free_ram_bytes() -> Option<u64> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn physical_ram_bytes() -> Option<u64> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn free_ram_bytes() -> Option<u64> {
    None
}
