//! Sparse vectors: a dense value buffer paired with a coordinate set.

use crate::coordinates::{CoordView, Coordinates};
use crate::descriptor::Descriptor;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::parallel::SendPtr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide registry of container identifiers, used by primitives to
/// detect aliasing between their operands. Vectors and matrices draw from
/// the same pool, so an identifier names at most one live container.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A sparse vector of dimension `size()`.
///
/// `values[i]` is meaningful iff `coordinates().assigned(i)`; unassigned
/// slots stay zero-initialised but carry no meaning. Every vector owns a
/// stable process-wide identifier; moving preserves it, while [`Clone`]
/// performs a full `set`-style copy under a fresh identifier.
#[derive(Debug)]
pub struct Vector<T: Element> {
    values: Box<[T]>,
    coordinates: Coordinates,
    id: u64,
}

impl<T: Element> Vector<T> {
    /// An empty sparse vector of dimension `n`.
    pub fn new(n: usize) -> Self {
        Vector {
            values: vec![T::zero(); n].into_boxed_slice(),
            coordinates: Coordinates::new(n),
            id: fresh_id(),
        }
    }

    /// A dense vector with every entry set to `value`.
    pub fn dense(n: usize, value: T) -> Self {
        Vector {
            values: vec![value; n].into_boxed_slice(),
            coordinates: Coordinates::new_dense(n),
            id: fresh_id(),
        }
    }

    /// A dense vector copied from a slice.
    pub fn from_slice(values: &[T]) -> Self {
        Vector {
            values: values.to_vec().into_boxed_slice(),
            coordinates: Coordinates::new_dense(values.len()),
            id: fresh_id(),
        }
    }

    /// A sparse vector built from `(index, value)` pairs. Duplicate
    /// indices are [`Error::Illegal`]; out-of-range indices are
    /// [`Error::Mismatch`].
    pub fn build(n: usize, entries: &[(usize, T)]) -> Result<Self> {
        let mut v = Vector::new(n);
        for &(i, value) in entries {
            if i >= n {
                return Err(Error::Mismatch {
                    expected: n,
                    got: i,
                });
            }
            if v.coordinates.assign(i) {
                return Err(Error::Illegal("duplicate index in vector build"));
            }
            v.values[i] = value;
        }
        Ok(v)
    }

    /// Dimension of the vector.
    #[inline]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.coordinates.nonzeroes()
    }

    /// Storage capacity; the reference backend always allocates full
    /// dimension.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// The process-wide identifier of this container.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The sparsity structure.
    #[inline]
    pub fn coordinates(&self) -> &Coordinates {
        &self.coordinates
    }

    /// Mutable access to the sparsity structure.
    #[inline]
    pub fn coordinates_mut(&mut self) -> &mut Coordinates {
        &mut self.coordinates
    }

    /// The raw value buffer. Slots without an assigned coordinate carry no
    /// meaning.
    #[inline]
    pub fn raw_values(&self) -> &[T] {
        &self.values
    }

    /// Mutable raw value buffer.
    #[inline]
    pub fn raw_values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Value buffer and coordinates, borrowed together.
    #[inline]
    pub fn parts_mut(&mut self) -> (&mut [T], &mut Coordinates) {
        (&mut self.values, &mut self.coordinates)
    }

    /// The stored value at `i`.
    ///
    /// Debug builds assert that `i` is assigned; release builds return the
    /// zero-initialised slot.
    #[inline]
    pub fn value(&self, i: usize) -> T {
        debug_assert!(self.coordinates.assigned(i), "read of unassigned index");
        self.values[i]
    }

    /// The stored value at `i`, or `None` when unassigned.
    #[inline]
    pub fn get(&self, i: usize) -> Option<T> {
        if self.coordinates.assigned(i) {
            Some(self.values[i])
        } else {
            None
        }
    }

    /// Store `value` at index `i`.
    pub fn set_element(&mut self, value: T, i: usize) -> Result<()> {
        if i >= self.size() {
            return Err(Error::Mismatch {
                expected: self.size(),
                got: i,
            });
        }
        self.coordinates.assign(i);
        self.values[i] = value;
        Ok(())
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.coordinates.clear();
    }

    /// Iterate over stored `(index, value)` pairs in insertion order
    /// (ascending when dense).
    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        (0..self.nnz()).map(move |k| {
            let i = self.coordinates.index(k);
            (i, self.values[i])
        })
    }

    /// Shared raw view for one fork-join region: disjoint-index value
    /// writes plus staged coordinate assignment.
    pub(crate) fn raw_view(&mut self) -> VectorView<'_, T> {
        let values = SendPtr(self.values.as_mut_ptr());
        VectorView {
            values,
            coordinates: self.coordinates.view(),
        }
    }

    /// Whether mask position `i` passes under `desc`'s mask semantics.
    #[inline]
    pub(crate) fn mask_passes(&self, i: usize, desc: Descriptor) -> bool {
        let present = self.coordinates.assigned(i);
        let nonzero = present && self.values[i].is_nonzero();
        desc.mask_passes(present, nonzero)
    }
}

impl<T: Element> Clone for Vector<T> {
    /// Deep copy through the `set` semantics: same pattern and values,
    /// fresh identifier.
    fn clone(&self) -> Self {
        Vector {
            values: self.values.clone(),
            coordinates: self.coordinates.clone(),
            id: fresh_id(),
        }
    }
}

/// Raw handle to a vector's storage for use inside one fork-join region.
///
/// Copyable so each task can hold it; the underlying borrow keeps the
/// vector alive and un-mutated elsewhere for the region's duration.
#[derive(Copy, Clone)]
pub(crate) struct VectorView<'a, T> {
    pub values: SendPtr<T>,
    pub coordinates: CoordView<'a>,
}

unsafe impl<T> Send for VectorView<'_, T> {}
unsafe impl<T> Sync for VectorView<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_iterate() {
        let v = Vector::build(6, &[(4, 2.0f64), (1, 5.0)]).unwrap();
        assert_eq!(v.size(), 6);
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.get(4), Some(2.0));
        assert_eq!(v.value(4), 2.0);
        assert_eq!(v.get(0), None);
        let pairs: Vec<_> = v.iter().collect();
        assert_eq!(pairs, vec![(4, 2.0), (1, 5.0)]);
    }

    #[test]
    fn build_rejects_duplicates_and_range() {
        assert!(matches!(
            Vector::build(4, &[(1, 1.0f64), (1, 2.0)]),
            Err(Error::Illegal(_))
        ));
        assert!(matches!(
            Vector::build(4, &[(7, 1.0f64)]),
            Err(Error::Mismatch { .. })
        ));
    }

    #[test]
    fn clone_gets_fresh_id() {
        let v = Vector::from_slice(&[1.0f64, 2.0]);
        let w = v.clone();
        assert_ne!(v.id(), w.id());
        assert_eq!(w.get(1), Some(2.0));
    }

    #[test]
    fn mask_interpretation() {
        let m = Vector::build(4, &[(0, 1.0f64), (1, 0.0)]).unwrap();
        let plain = Descriptor::default();
        assert!(m.mask_passes(0, plain));
        assert!(!m.mask_passes(1, plain)); // explicit zero
        assert!(!m.mask_passes(2, plain)); // absent
        assert!(m.mask_passes(1, Descriptor::STRUCTURAL));
        assert!(m.mask_passes(2, Descriptor::INVERT_MASK));
    }
}
