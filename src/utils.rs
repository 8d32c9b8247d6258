//! Shared arithmetic and clock helpers.

use once_cell::sync::Lazy;
use std::time::Instant;

/// Anchor for the crate-internal millisecond clock. All entry timestamps are
/// measured against this single process epoch so they stay monotonic and
/// comparable across threads.
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed since the process epoch.
pub(crate) fn now_ms() -> u64 {
    PROCESS_EPOCH.elapsed().as_millis() as u64
}

/// Ratio of `numerator` to `denominator`, rounded to two decimal places.
///
/// A zero denominator yields `0.0` rather than an error or infinity. Used
/// both for the time-left fraction in burden scoring and for the
/// burden-per-byte averages in regional statistics.
///
/// # Examples
///
/// ```
/// use capcache::utils::relative_ratio;
///
/// assert_eq!(relative_ratio(1.0, 3.0), 0.33);
/// assert_eq!(relative_ratio(5.0, 0.0), 0.0);
/// ```
pub fn relative_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        (numerator / denominator * 100.0).round() / 100.0
    }
}
