use std::sync::Arc;

/// Trait for estimating the in-memory footprint of cached keys and values.
///
/// The global memory budget is enforced against *estimated* sizes, so the
/// accuracy of this trait determines how close the tracked total stays to the
/// real heap usage. Implementations should return the total footprint
/// including heap allocations.
///
/// Estimation must never fail: for a value whose size genuinely cannot be
/// measured, return a conservative non-zero figure rather than panic; the
/// cache clamps zero estimates up to one byte before accounting.
///
/// Values wrapped in lazily-initialized proxies must be resolved before
/// measuring, otherwise the estimate undercounts. A per-region estimator
/// override (see `CacheBuilder::size_estimator`) is the place to do that
/// resolution.
///
/// # Default Implementation
///
/// The default implementation uses `std::mem::size_of_val()`, which only
/// accounts for stack-allocated data. Types with heap allocations (`String`,
/// `Vec`, ...) should provide a custom implementation.
///
/// # Examples
///
/// ```
/// use capcache::SizeEstimator;
///
/// #[derive(Clone)]
/// struct Row {
///     name: String,
///     cells: Vec<u64>,
/// }
///
/// impl SizeEstimator for Row {
///     fn estimate_size(&self) -> usize {
///         std::mem::size_of::<Self>() + self.name.capacity() + self.cells.capacity() * 8
///     }
/// }
/// ```
pub trait SizeEstimator {
    /// Estimated total memory footprint of this value in bytes.
    fn estimate_size(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

impl SizeEstimator for i8 {}
impl SizeEstimator for i16 {}
impl SizeEstimator for i32 {}
impl SizeEstimator for i64 {}
impl SizeEstimator for i128 {}
impl SizeEstimator for isize {}

impl SizeEstimator for u8 {}
impl SizeEstimator for u16 {}
impl SizeEstimator for u32 {}
impl SizeEstimator for u64 {}
impl SizeEstimator for u128 {}
impl SizeEstimator for usize {}

impl SizeEstimator for f32 {}
impl SizeEstimator for f64 {}

impl SizeEstimator for bool {}
impl SizeEstimator for char {}

impl SizeEstimator for () {}

impl SizeEstimator for str {
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<String>() + self.len()
    }
}

impl SizeEstimator for String {
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.capacity()
    }
}

impl<T> SizeEstimator for Vec<T>
where
    T: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        let base = std::mem::size_of::<Self>();
        let elements: usize = self.iter().map(|item| item.estimate_size()).sum();
        base + elements
    }
}

impl<T> SizeEstimator for Option<T>
where
    T: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Some(val) => val.estimate_size(),
                None => 0,
            }
    }
}

impl<T, E> SizeEstimator for Result<T, E>
where
    T: SizeEstimator,
    E: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Ok(val) => val.estimate_size(),
                Err(err) => err.estimate_size(),
            }
    }
}

impl<T1, T2> SizeEstimator for (T1, T2)
where
    T1: SizeEstimator,
    T2: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.0.estimate_size() + self.1.estimate_size()
    }
}

impl<T1, T2, T3> SizeEstimator for (T1, T2, T3)
where
    T1: SizeEstimator,
    T2: SizeEstimator,
    T3: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.0.estimate_size()
            + self.1.estimate_size()
            + self.2.estimate_size()
    }
}

impl<T> SizeEstimator for Box<T>
where
    T: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + (**self).estimate_size()
    }
}

impl<T> SizeEstimator for Arc<T>
where
    T: SizeEstimator,
{
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + (**self).estimate_size()
    }
}
