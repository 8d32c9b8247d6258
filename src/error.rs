//! Error types for cache configuration.
//!
//! Runtime cache operations (get/put/invalidate) are infallible; the only
//! failures this crate reports are programmer errors detected while building
//! a region or a coordinator, and those fail fast with a descriptive variant.

use thiserror::Error;

/// Unified error type for cache construction.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// Region names identify a cache partition and must be non-empty.
    #[error("cache region name must not be empty")]
    EmptyRegionName,

    /// The region default TTL must be a positive duration.
    #[error("region '{0}' has a zero default ttl")]
    ZeroTtl(String),

    /// `cap_percent` is a share of the maximum heap and must be 0..=100.
    #[error("cap percent {0} must be between 0 and 100")]
    InvalidCapPercent(u8),

    /// Soft and hard caps are expressed relative to the cap size and must
    /// each be 0..=100.
    #[error("{name} cap percent {value} must be between 0 and 100")]
    InvalidRelativeCapPercent { name: &'static str, value: u8 },

    /// The soft cap triggers before the hard cap, so it may not exceed it.
    #[error("soft cap {soft}% must not exceed hard cap {hard}%")]
    InvalidCapOrdering { soft: u8, hard: u8 },
}

/// Convenience Result alias for cache construction.
pub type Result<T> = std::result::Result<T, CacheError>;
