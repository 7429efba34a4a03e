//! Compressed sparse matrices stored in both row- and column-indexed
//! layouts.
//!
//! A [`Matrix`] keeps the same multiset of `(i, j, v)` triples twice: once
//! grouped by row (RCS) and once by column (CCS). SpMV reads whichever
//! layout the dispatcher picks; `ewise_lambda` mutates the CCS in place
//! while reconstructing the RCS concurrently.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::vector::fresh_id;

/// One compressed layout: `start[g]..start[g+1]` delimits group `g`'s
/// nonzeroes in `index`/`values`. For the row-indexed facet a group is a
/// row and `index` holds column indices; the column-indexed facet is
/// symmetric.
#[derive(Debug, Clone)]
pub struct CompressedStorage<T> {
    pub(crate) start: Box<[usize]>,
    pub(crate) index: Box<[usize]>,
    pub(crate) values: Box<[T]>,
}

impl<T: Element> CompressedStorage<T> {
    /// The `(index, value)` pairs of group `g`.
    #[inline]
    pub fn group(&self, g: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        (self.start[g]..self.start[g + 1]).map(move |k| (self.index[k], self.values[k]))
    }

    /// Group offsets; length is the group count plus one.
    #[inline]
    pub fn start(&self) -> &[usize] {
        &self.start
    }

    /// Per-nonzero minor indices.
    #[inline]
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Per-nonzero values.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }
}

/// An `m × n` sparse matrix with dual compressed storage.
#[derive(Debug, Clone)]
pub struct Matrix<T: Element> {
    m: usize,
    n: usize,
    nnz: usize,
    rcs: CompressedStorage<T>,
    ccs: CompressedStorage<T>,
    id: u64,
}

impl<T: Element> Matrix<T> {
    /// Build from `(row, col, value)` triples by counting sort into both
    /// layouts. Triples must be in range; duplicates are kept as distinct
    /// stored nonzeroes (order within a row or column is unspecified).
    pub fn from_triples(m: usize, n: usize, triples: &[(usize, usize, T)]) -> Result<Self> {
        for &(i, j, _) in triples {
            if i >= m {
                return Err(Error::Mismatch { expected: m, got: i });
            }
            if j >= n {
                return Err(Error::Mismatch { expected: n, got: j });
            }
        }
        let nnz = triples.len();

        let rcs = Self::compress(m, triples.iter().map(|&(i, j, v)| (i, j, v)));
        let ccs = Self::compress(n, triples.iter().map(|&(i, j, v)| (j, i, v)));

        Ok(Matrix {
            m,
            n,
            nnz,
            rcs,
            ccs,
            id: fresh_id(),
        })
    }

    /// Counting sort of `(group, minor, value)` triples into one layout.
    fn compress(
        groups: usize,
        triples: impl Iterator<Item = (usize, usize, T)> + Clone,
    ) -> CompressedStorage<T> {
        let mut start = vec![0usize; groups + 1];
        for (g, _, _) in triples.clone() {
            start[g + 1] += 1;
        }
        for g in 0..groups {
            start[g + 1] += start[g];
        }
        let nnz = start[groups];
        let mut index = vec![0usize; nnz];
        let mut values = vec![T::zero(); nnz];
        let mut cursor = start.clone();
        for (g, minor, v) in triples {
            let k = cursor[g];
            cursor[g] += 1;
            index[k] = minor;
            values[k] = v;
        }
        CompressedStorage {
            start: start.into_boxed_slice(),
            index: index.into_boxed_slice(),
            values: values.into_boxed_slice(),
        }
    }

    /// The `n × n` identity matrix over the given one-value. Both facets
    /// are the same diagonal layout.
    pub fn identity(n: usize, one: T) -> Self {
        let diagonal = CompressedStorage {
            start: (0..=n).collect(),
            index: (0..n).collect(),
            values: vec![one; n].into_boxed_slice(),
        };
        Matrix {
            m: n,
            n,
            nnz: n,
            rcs: diagonal.clone(),
            ccs: diagonal,
            id: fresh_id(),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.m
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.n
    }

    /// Number of stored nonzeroes.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// The process-wide identifier of this container.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Row-indexed facet.
    #[inline]
    pub fn rcs(&self) -> &CompressedStorage<T> {
        &self.rcs
    }

    /// Column-indexed facet.
    #[inline]
    pub fn ccs(&self) -> &CompressedStorage<T> {
        &self.ccs
    }

    /// Both facets, mutably; reserved for the `ewise_lambda`
    /// reconstruction protocol.
    #[inline]
    pub(crate) fn facets_mut(&mut self) -> (&mut CompressedStorage<T>, &mut CompressedStorage<T>) {
        (&mut self.rcs, &mut self.ccs)
    }

    /// Enumerate all stored triples through the row-indexed facet.
    pub fn triples(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.m).flat_map(move |i| self.rcs.group(i).map(move |(j, v)| (i, j, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_layouts_agree() {
        // [ .  1  2 ]
        // [ 3  .  . ]
        // [ .  4  5 ]
        let a = Matrix::from_triples(
            3,
            3,
            &[(0, 1, 1.0f64), (0, 2, 2.0), (1, 0, 3.0), (2, 1, 4.0), (2, 2, 5.0)],
        )
        .unwrap();
        assert_eq!(a.nnz(), 5);
        assert_eq!(a.rcs().start(), &[0, 2, 3, 5]);
        assert_eq!(a.ccs().start(), &[0, 1, 3, 5]);

        let mut from_rows: Vec<_> = a.triples().collect();
        let mut from_cols: Vec<_> = (0..3)
            .flat_map(|j| a.ccs().group(j).map(move |(i, v)| (i, j, v)))
            .collect();
        from_rows.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        from_cols.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        assert_eq!(from_rows, from_cols);
    }

    #[test]
    fn identity_shape() {
        let eye = Matrix::identity(4, 1.0f64);
        assert_eq!(eye.nnz(), 4);
        for (i, j, v) in eye.triples() {
            assert_eq!(i, j);
            assert_eq!(v, 1.0);
        }
    }

    #[test]
    fn ids_unique_across_container_kinds() {
        // matrices and vectors share one registry, so an id never names
        // both a matrix and a vector
        let mut ids = Vec::new();
        for _ in 0..8 {
            ids.push(crate::vector::Vector::<f64>::new(1).id());
            ids.push(Matrix::<f64>::from_triples(1, 1, &[]).unwrap().id());
        }
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn range_checked() {
        assert!(matches!(
            Matrix::from_triples(2, 2, &[(2, 0, 1.0f64)]),
            Err(Error::Mismatch { .. })
        ));
    }
}
