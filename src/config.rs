//! Tuning constants and architecture helpers shared by the kernels.

/// Default capacity, in staged indices, of the combined per-call update
/// buffer area. Each fork-join task receives a slice of roughly this size
/// divided by the task count; buffers grow on demand beyond it.
pub const UPDATE_BUFFER_SIZE: usize = 4096;

/// Nonzeroes accumulated per thread before the matrix `ewise_lambda`
/// reconstruction flushes a chunk into the row-major storage. Sized so a
/// chunk of (row, col, value) triples stays within L1.
pub const EWISE_LAMBDA_CHUNK: usize = 1024;

/// How many nonzeroes ahead the gather inner kernel issues prefetches.
pub const PREFETCH_DISTANCE: usize = 4;

/// Issue a best-effort prefetch for `slice[i]`, where `i` may point up to
/// [`PREFETCH_DISTANCE`] elements past the populated region. No-op off
/// x86_64.
#[inline(always)]
pub fn prefetch_read<T>(slice: &[T], i: usize) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        if i < slice.len() {
            // prefetch never faults
            unsafe {
                _mm_prefetch::<_MM_HINT_T0>(slice.as_ptr().add(i) as *const i8);
            }
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = (slice, i);
    }
}
