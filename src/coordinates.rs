//! Sparsity structure of a vector: which indices hold a nonzero.
//!
//! A [`Coordinates`] instance over dimension `N` is either *dense* (every
//! index assigned, no per-index bookkeeping consulted) or *sparse* (an
//! `assigned` bitmap plus a stack of assigned indices in insertion order).
//! Parallel kernels stage new indices into per-task [`Update`] buffers
//! without touching the stack, and a single collective [`join_update`]
//! merges all buffers through a prefix-sum protocol.
//!
//! Some primitives deliberately leave an instance *invalid* — the bitmap is
//! current but the stack and count are stale. Only
//! [`nonzeroes`](Coordinates::nonzeroes), [`clear`](Coordinates::clear),
//! [`clear_range`](Coordinates::clear_range),
//! [`rebuild`](Coordinates::rebuild) and
//! [`rebuild_from_stack`](Coordinates::rebuild_from_stack) are legal on an
//! invalid instance; debug builds assert on any other access.
//!
//! [`join_update`]: Coordinates::join_update

use crate::config;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::parallel::{self, SendPtr};
use std::marker::PhantomData;

/// Per-task staging buffer for [`Coordinates::assign_async`].
///
/// Capacity defaults to the configured buffer size divided by the task
/// count; the buffer grows on demand, so unlike a fixed-capacity design no
/// mid-loop flush is ever forced.
#[derive(Debug, Default)]
pub struct Update {
    staged: Vec<usize>,
}

impl Update {
    /// An empty update buffer with the given capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        Update {
            staged: Vec::with_capacity(capacity),
        }
    }

    /// Number of staged indices.
    #[inline]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing has been staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

/// Shared handle to a coordinate set, for use inside one fork-join region.
///
/// Obtained from [`Coordinates::view`]. Lets tasks test membership and
/// stage assignments concurrently; the borrow prevents any structural
/// mutation of the owner until the region ends.
#[derive(Copy, Clone)]
pub struct CoordView<'a> {
    assigned: SendPtr<bool>,
    dim: usize,
    dense: bool,
    _owner: PhantomData<&'a Coordinates>,
}

unsafe impl Send for CoordView<'_> {}
unsafe impl Sync for CoordView<'_> {}

impl CoordView<'_> {
    /// Whether index `i` is assigned.
    #[inline]
    pub fn assigned(&self, i: usize) -> bool {
        debug_assert!(i < self.dim);
        // safe: concurrent tasks only flip slots they exclusively own
        self.dense || unsafe { self.assigned.read(i) }
    }

    /// Stage the assignment of `i` into `update`. Returns `true` iff `i`
    /// was already assigned.
    ///
    /// # Safety
    /// No two tasks of the enclosing fork-join region may pass the same
    /// `i`; exactly one [`Coordinates::join_update`] must follow before
    /// the stack is read again.
    #[inline]
    pub unsafe fn assign_async(&self, i: usize, update: &mut Update) -> bool {
        debug_assert!(i < self.dim);
        if self.assigned(i) {
            return true;
        }
        unsafe { self.assigned.write(i, true) };
        update.staged.push(i);
        false
    }

    /// Best-effort prefetch of the `assigned` slot for `i`.
    #[inline]
    pub fn prefetch(&self, i: usize) {
        if !self.dense && i < self.dim {
            config::prefetch_read(
                unsafe { std::slice::from_raw_parts(self.assigned.0, self.dim) },
                i,
            );
        }
    }
}

/// The sparsity structure of one vector of dimension `dim`.
#[derive(Debug, Clone)]
pub struct Coordinates {
    /// Membership bitmap; authoritative in sparse representation.
    assigned: Box<[bool]>,
    /// Assigned indices in insertion order; first `n` entries meaningful.
    stack: Box<[usize]>,
    /// Number of assigned indices.
    n: usize,
    /// Dimension of the underlying vector.
    dim: usize,
    /// Dense representation: all `dim` indices assigned, `index(k) == k`.
    dense: bool,
    /// False after a non-local mutation left `stack`/`n` stale.
    valid: bool,
}

impl Coordinates {
    /// An empty (all-unassigned) coordinate set.
    pub fn new(dim: usize) -> Self {
        Coordinates {
            assigned: vec![false; dim].into_boxed_slice(),
            stack: vec![0usize; dim].into_boxed_slice(),
            n: 0,
            dim,
            dense: false,
            valid: true,
        }
    }

    /// A fully-assigned coordinate set.
    pub fn new_dense(dim: usize) -> Self {
        Coordinates {
            assigned: vec![true; dim].into_boxed_slice(),
            stack: vec![0usize; dim].into_boxed_slice(),
            n: dim,
            dim,
            dense: true,
            valid: true,
        }
    }

    /// Dimension of the underlying vector.
    #[inline]
    pub fn size(&self) -> usize {
        self.dim
    }

    /// Number of assigned indices. Legal on an invalid instance, where it
    /// reports the stale pre-mutation count.
    #[inline]
    pub fn nonzeroes(&self) -> usize {
        self.n
    }

    /// Whether the set is in the dense representation.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    /// Whether the stack and count are current.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether index `i` is assigned.
    #[inline]
    pub fn assigned(&self, i: usize) -> bool {
        debug_assert!(self.valid);
        debug_assert!(i < self.dim);
        self.dense || self.assigned[i]
    }

    /// The `k`-th assigned index, in insertion order.
    #[inline]
    pub fn index(&self, k: usize) -> usize {
        debug_assert!(self.valid);
        debug_assert!(k < self.n);
        if self.dense {
            k
        } else {
            self.stack[k]
        }
    }

    /// The assigned indices in insertion order.
    #[inline]
    pub fn stack(&self) -> &[usize] {
        debug_assert!(self.valid);
        debug_assert!(!self.dense);
        &self.stack[..self.n]
    }

    /// Best-effort prefetch of the `assigned` slot for `i`.
    #[inline]
    pub fn prefetch_assigned(&self, i: usize) {
        if !self.dense {
            config::prefetch_read(&self.assigned, i);
        }
    }

    /// Insert `i`. Returns `true` iff `i` was already assigned.
    /// Not thread-safe; use [`Coordinates::assign_async`] staging from
    /// parallel kernels.
    pub fn assign(&mut self, i: usize) -> bool {
        debug_assert!(self.valid);
        assert!(i < self.dim);
        if self.dense || self.assigned[i] {
            return true;
        }
        self.assigned[i] = true;
        self.stack[self.n] = i;
        self.n += 1;
        false
    }

    /// Make the set dense.
    pub fn assign_all(&mut self) {
        debug_assert!(self.valid);
        if !self.dense {
            self.assigned.fill(true);
            self.n = self.dim;
            self.dense = true;
        }
    }

    /// Empty the set: O(nonzeroes) if sparse, O(dim) if dense. Restores
    /// validity.
    pub fn clear(&mut self) {
        if self.dense || !self.valid {
            self.assigned.fill(false);
        } else {
            for k in 0..self.n {
                self.assigned[self.stack[k]] = false;
            }
        }
        self.n = 0;
        self.dense = false;
        self.valid = true;
    }

    /// Clear indices in `[start, end)` and leave the instance in the
    /// invalid state; call [`Coordinates::rebuild`] before reading.
    pub fn clear_range(&mut self, start: usize, end: usize) {
        assert!(start <= end && end <= self.dim);
        if self.dense {
            // the bitmap is authoritative from here on
            self.dense = false;
        }
        self.assigned[start..end].fill(false);
        self.valid = false;
    }

    /// One empty update buffer per fork-join task, each with the
    /// configured per-task capacity hint.
    pub fn make_updates(&self, tasks: usize) -> Vec<Update> {
        let tasks = tasks.max(1);
        let cap = config::UPDATE_BUFFER_SIZE / tasks;
        (0..tasks).map(|_| Update::with_capacity(cap)).collect()
    }

    /// Shared handle for membership tests and staged assignment inside a
    /// fork-join region.
    pub fn view(&mut self) -> CoordView<'_> {
        debug_assert!(self.valid);
        CoordView {
            assigned: SendPtr(self.assigned.as_mut_ptr()),
            dim: self.dim,
            dense: self.dense,
            _owner: PhantomData,
        }
    }

    /// Stage the assignment of `i` into `update` without touching the
    /// stack. Convenience for sequential callers; parallel kernels go
    /// through [`Coordinates::view`].
    pub fn assign_async(&mut self, i: usize, update: &mut Update) -> bool {
        debug_assert!(self.valid);
        assert!(i < self.dim);
        if self.dense || self.assigned[i] {
            return true;
        }
        self.assigned[i] = true;
        update.staged.push(i);
        false
    }

    /// Merge every staged update buffer into the stack and update the
    /// count. Returns `true` iff the combined update was empty.
    ///
    /// Protocol: per-buffer counts, exclusive prefix sum, cooperative copy
    /// of each buffer into its disjoint stack segment, single count update,
    /// buffers emptied. The `&mut self` receiver makes re-entry before
    /// completion unrepresentable.
    pub fn join_update(&mut self, updates: &mut [Update]) -> bool {
        debug_assert!(self.valid);
        let total: usize = updates.iter().map(|u| u.staged.len()).sum();
        if total == 0 {
            return true;
        }
        debug_assert!(!self.dense, "dense coordinates admit no new indices");
        assert!(self.n + total <= self.dim);

        // exclusive prefix sum over the buffer lengths fixes where each
        // staged index lands in the stack
        let mut offsets = Vec::with_capacity(updates.len() + 1);
        let mut acc = 0;
        offsets.push(0);
        for u in updates.iter() {
            acc += u.staged.len();
            offsets.push(acc);
        }

        // cooperative copy: tasks split the combined total evenly, so one
        // oversized buffer cannot serialise the merge
        let ranges = parallel::partition(total, parallel::num_threads());
        let mut tail = &mut self.stack[self.n..self.n + total];
        let mut segments: Vec<(usize, &mut [usize])> = Vec::with_capacity(ranges.len());
        for r in &ranges {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
            segments.push((r.start, seg));
            tail = rest;
        }
        let staged: Vec<&[usize]> = updates.iter().map(|u| u.staged.as_slice()).collect();
        let units: Vec<()> = vec![(); segments.len()];
        parallel::for_each_zip(segments, units, |(start, dst), ()| {
            let mut b = offsets.partition_point(|&o| o <= start) - 1;
            let mut pos = start;
            let mut written = 0;
            while written < dst.len() {
                let within = pos - offsets[b];
                let take = (staged[b].len() - within).min(dst.len() - written);
                if take == 0 {
                    b += 1;
                    continue;
                }
                dst[written..written + take]
                    .copy_from_slice(&staged[b][within..within + take]);
                written += take;
                pos += take;
            }
        });

        self.n += total;
        for u in updates.iter_mut() {
            u.staged.clear();
        }
        false
    }

    /// Recompute the stack and count from the bitmap by a parallel
    /// prefix-sum, restoring validity. `density_hint` signals that the
    /// caller expects a (nearly) full bitmap; it only steers the
    /// representation choice, never correctness.
    pub fn rebuild(&mut self, density_hint: bool) {
        let dim = self.dim;
        let ranges = parallel::partition(dim, parallel::num_threads());
        let counts: Vec<usize> = {
            let assigned = &self.assigned;
            parallel::map_ranges(dim, |r| assigned[r].iter().filter(|&&a| a).count())
        };
        let total: usize = counts.iter().sum();

        if total == dim {
            // fully populated; index(k) == k needs no stack
            self.n = dim;
            self.dense = true;
            self.valid = true;
            return;
        }
        self.dense = false;

        // exclusive prefix over per-range counts, then disjoint writes
        let mut segments: Vec<&mut [usize]> = Vec::with_capacity(counts.len());
        let mut tail = &mut self.stack[..total];
        for &c in &counts {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(c);
            segments.push(seg);
            tail = rest;
        }
        let assigned = &self.assigned;
        parallel::for_each_zip(ranges, segments, |range, seg| {
            let mut k = 0;
            for i in range {
                if assigned[i] {
                    seg[k] = i;
                    k += 1;
                }
            }
            debug_assert_eq!(k, seg.len());
        });

        self.n = total;
        self.valid = true;
        let _ = density_hint;
    }

    /// Treat the first `new_nz` stack entries (written by the caller via
    /// [`Coordinates::stack_for_rebuild`]) as authoritative: raise their
    /// bitmap slots and, when `values_in` is given, scatter
    /// `values_in[k]` to `values_out[stack[k]]`. Restores validity.
    ///
    /// Returns [`Error::Panic`] when invoked on a dense instance.
    pub fn rebuild_from_stack<T: Element>(
        &mut self,
        values_out: &mut [T],
        values_in: Option<&[T]>,
        new_nz: usize,
    ) -> Result<()> {
        if self.dense {
            return Err(Error::Panic(
                "rebuild_from_stack called on a dense coordinate set",
            ));
        }
        assert!(new_nz <= self.dim);
        assert_eq!(values_out.len(), self.dim);
        if let Some(vin) = values_in {
            assert!(new_nz <= vin.len());
        }

        let stack = &self.stack[..new_nz];
        let bitmap = SendPtr(self.assigned.as_mut_ptr());
        let out = SendPtr::from_mut_slice(values_out);
        let ranges = parallel::partition(new_nz, parallel::num_threads());
        let units: Vec<()> = vec![(); ranges.len()];
        parallel::for_each_zip(ranges, units, |range, ()| {
            for k in range {
                let i = stack[k];
                // stack entries are unique by caller contract
                unsafe {
                    bitmap.write(i, true);
                    if let Some(vin) = values_in {
                        out.write(i, vin[k]);
                    }
                }
            }
        });

        self.n = new_nz;
        self.valid = true;
        Ok(())
    }

    /// The writable stack area, for callers preparing a
    /// [`Coordinates::rebuild_from_stack`].
    pub fn stack_for_rebuild(&mut self) -> &mut [usize] {
        &mut self.stack
    }

    /// Write the current stack, shifted by `offset`, into `stack_out`, and
    /// gather `array_in` at the assigned indices into `packed_out`. A dense
    /// instance enumerates `[0, dim)`.
    pub fn pack_values<T: Element>(
        &self,
        stack_out: &mut [usize],
        offset: usize,
        packed_out: &mut [T],
        array_in: &[T],
    ) {
        debug_assert!(self.valid);
        assert!(stack_out.len() >= self.n && packed_out.len() >= self.n);
        assert_eq!(array_in.len(), self.dim);
        for k in 0..self.n {
            let i = if self.dense { k } else { self.stack[k] };
            stack_out[k] = i + offset;
            packed_out[k] = array_in[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_and_query() {
        let mut c = Coordinates::new(8);
        assert!(!c.assign(3));
        assert!(!c.assign(5));
        assert!(c.assign(3));
        assert_eq!(c.nonzeroes(), 2);
        assert!(c.assigned(3) && c.assigned(5) && !c.assigned(0));
        assert_eq!(c.index(0), 3);
        assert_eq!(c.index(1), 5);
    }

    #[test]
    fn staged_join_roundtrip() {
        let mut c = Coordinates::new(32);
        c.assign(0);
        let mut updates = c.make_updates(4);
        {
            let view = c.view();
            for (t, u) in updates.iter_mut().enumerate() {
                for i in [t + 1, t + 9, t + 17] {
                    assert!(!unsafe { view.assign_async(i, u) });
                }
            }
        }
        assert!(!c.join_update(&mut updates));
        assert_eq!(c.nonzeroes(), 13);
        for t in 0..4 {
            assert!(c.assigned(t + 1) && c.assigned(t + 9) && c.assigned(t + 17));
        }
        assert!(updates.iter().all(|u| u.is_empty()));
        // a second join with empty buffers reports the empty update
        assert!(c.join_update(&mut updates));
    }

    #[test]
    fn join_handles_uneven_buffers() {
        // one oversized buffer, one empty, two small: the cooperative
        // copy must still land every staged index once, in buffer order
        let mut c = Coordinates::new(64);
        let mut updates = c.make_updates(4);
        let bulk: Vec<usize> = (20..40).collect();
        let per_buffer: [&[usize]; 4] = [&[10], &[], &bulk, &[50, 51]];
        {
            let view = c.view();
            for (u, staged) in updates.iter_mut().zip(per_buffer) {
                for &i in staged {
                    assert!(!unsafe { view.assign_async(i, u) });
                }
            }
        }
        assert!(!c.join_update(&mut updates));
        assert_eq!(c.nonzeroes(), 23);
        let expected: Vec<usize> = per_buffer.iter().flat_map(|s| s.iter().copied()).collect();
        assert_eq!(c.stack(), &expected[..]);
    }

    #[test]
    fn dense_transitions() {
        let mut c = Coordinates::new(4);
        c.assign_all();
        assert!(c.is_dense());
        assert_eq!(c.nonzeroes(), 4);
        assert_eq!(c.index(2), 2);
        c.clear();
        assert!(!c.is_dense());
        assert_eq!(c.nonzeroes(), 0);
        assert!(!c.assigned(2));
    }

    #[test]
    fn clear_range_then_rebuild() {
        let mut c = Coordinates::new(10);
        for i in [1, 3, 5, 7, 9] {
            c.assign(i);
        }
        c.clear_range(4, 8);
        assert!(!c.is_valid());
        c.rebuild(false);
        assert!(c.is_valid());
        assert_eq!(c.nonzeroes(), 3);
        assert!(c.assigned(1) && c.assigned(3) && c.assigned(9));
        assert!(!c.assigned(5) && !c.assigned(7));
    }

    #[test]
    fn rebuild_to_dense() {
        let mut c = Coordinates::new(6);
        for i in 0..6 {
            c.assign(i);
        }
        c.clear_range(0, 0); // no-op clear, but invalidates
        c.rebuild(true);
        assert!(c.is_dense());
        assert_eq!(c.nonzeroes(), 6);
    }

    #[test]
    fn rebuild_from_stack_scatters() {
        let mut c = Coordinates::new(6);
        c.stack_for_rebuild()[..3].copy_from_slice(&[4, 0, 2]);
        let mut out = vec![0.0f64; 6];
        c.rebuild_from_stack(&mut out, Some(&[40.0, 10.0, 20.0]), 3)
            .unwrap();
        assert_eq!(c.nonzeroes(), 3);
        assert!(c.assigned(0) && c.assigned(2) && c.assigned(4));
        assert_eq!(out[4], 40.0);
        assert_eq!(out[0], 10.0);
        assert_eq!(out[2], 20.0);
    }

    #[test]
    fn rebuild_from_stack_rejects_dense() {
        let mut c = Coordinates::new(4);
        c.assign_all();
        let mut out = vec![0.0f64; 4];
        assert!(matches!(
            c.rebuild_from_stack::<f64>(&mut out, None, 0),
            Err(Error::Panic(_))
        ));
    }

    #[test]
    fn pack_values_gathers() {
        let mut c = Coordinates::new(5);
        c.assign(4);
        c.assign(1);
        let array = [0.0f64, 10.0, 20.0, 30.0, 40.0];
        let mut stack_out = [0usize; 2];
        let mut packed = [0.0f64; 2];
        c.pack_values(&mut stack_out, 100, &mut packed, &array);
        assert_eq!(stack_out, [104, 101]);
        assert_eq!(packed, [40.0, 10.0]);
    }
}
