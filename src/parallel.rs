//! Fork-join plumbing shared by the parallel kernels.
//!
//! Every primitive is its own fork-join region: it partitions its index
//! space into balanced ranges, runs one task per range, and returns only
//! once all tasks have completed. There is no worker-pool abstraction
//! beyond the global thread pool.

use std::ops::Range;

/// Number of worker threads a fork-join region will use.
#[inline]
pub fn num_threads() -> usize {
    #[cfg(feature = "rayon")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "rayon"))]
    {
        1
    }
}

/// Split `0..len` into at most `parts` balanced contiguous ranges. Earlier
/// ranges are one element longer when `len` does not divide evenly; empty
/// ranges are never produced.
pub fn partition(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1).min(len.max(1));
    let base = len / parts;
    let extra = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for p in 0..parts {
        let size = base + usize::from(p < extra);
        if size == 0 {
            break;
        }
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Run `body` over each range of `0..len`, in parallel when the `rayon`
/// feature is enabled, collecting one `R` per range in range order.
pub fn map_ranges<R, F>(len: usize, body: F) -> Vec<R>
where
    R: Send,
    F: Fn(Range<usize>) -> R + Send + Sync,
{
    let ranges = partition(len, num_threads());
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        ranges.into_par_iter().map(body).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        ranges.into_iter().map(body).collect()
    }
}

/// Run `body` over `(item, payload)` pairs in parallel. Used where each
/// task owns a disjoint mutable payload (update buffers, output slices).
pub fn for_each_zip<A, B, F>(items: Vec<A>, payloads: Vec<B>, body: F)
where
    A: Send,
    B: Send,
    F: Fn(A, B) + Send + Sync,
{
    debug_assert_eq!(items.len(), payloads.len());
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        items
            .into_par_iter()
            .zip(payloads.into_par_iter())
            .for_each(|(a, b)| body(a, b));
    }
    #[cfg(not(feature = "rayon"))]
    {
        items
            .into_iter()
            .zip(payloads)
            .for_each(|(a, b)| body(a, b));
    }
}

/// Shared mutable pointer for kernels whose tasks write disjoint indices.
///
/// # Safety
/// The creator must guarantee that no two tasks write the same index and
/// that the pointee outlives the fork-join region. This mirrors how the
/// raw-pointer CPU kernels hand buffers to their inner loops.
#[derive(Copy, Clone)]
pub struct SendPtr<T>(pub *mut T);

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    /// Wrap a mutable slice for disjoint-index sharing.
    #[inline]
    pub fn from_mut_slice(s: &mut [T]) -> Self {
        SendPtr(s.as_mut_ptr())
    }

    /// Write `value` at `i`.
    ///
    /// # Safety
    /// `i` must be in bounds and not concurrently written by another task.
    #[inline]
    pub unsafe fn write(&self, i: usize, value: T) {
        unsafe { *self.0.add(i) = value };
    }

    /// Read the value at `i`.
    ///
    /// # Safety
    /// `i` must be in bounds and not concurrently written.
    #[inline]
    pub unsafe fn read(&self, i: usize) -> T
    where
        T: Copy,
    {
        unsafe { *self.0.add(i) }
    }

    /// Mutable reference to the element at `i`.
    ///
    /// # Safety
    /// `i` must be in bounds and the reference must not alias another
    /// live reference to the same element.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get_mut(&self, i: usize) -> &mut T {
        unsafe { &mut *self.0.add(i) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_balances() {
        let r = partition(10, 3);
        assert_eq!(r, vec![0..4, 4..7, 7..10]);
        assert_eq!(partition(2, 8).len(), 2);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn map_ranges_covers_all() {
        let sums = map_ranges(100, |r| r.sum::<usize>());
        assert_eq!(sums.iter().sum::<usize>(), (0..100).sum::<usize>());
    }
}
