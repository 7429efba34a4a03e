//! Level-2 primitives: sparse matrix-vector multiplication and the
//! per-nonzero matrix lambda.
//!
//! All `mxv`/`vxm` entry points funnel into one generic routine that picks
//! between two kernels over the matrix's two storage facets:
//!
//! - **gather** (output-driven): each task owns a slice of output indices
//!   and reduces the matching storage group into a private accumulator, so
//!   it parallelises without write conflicts;
//! - **scatter** (input-driven): walks the nonzeroes of the input vector
//!   and pushes contributions at arbitrary output indices, so it runs on a
//!   single thread.
//!
//! The choice is a loop-count estimate: the gather side costs one pass over
//! the output domain (shortened by a non-inverted output mask), the scatter
//! side costs a pass over the input domain multiplied by the thread count
//! it forfeits. `FORCE_ROW_MAJOR` overrides the estimate and pins the
//! kernel that traverses row-major storage.

use crate::algebra::{BinaryOperator, Monoid, Semiring};
use crate::config::{EWISE_LAMBDA_CHUNK, PREFETCH_DISTANCE};
use crate::descriptor::{Descriptor, Phase};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::matrix::{CompressedStorage, Matrix};
use crate::parallel::{self, SendPtr};
use crate::vector::Vector;
use std::sync::Mutex;

/// Which side of the matrix the vector operand multiplies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Direction {
    /// `u = v A`: output ranges over columns, products are `v[i] ⊗ A[i][j]`.
    Vxm,
    /// `u = A v`: output ranges over rows, products are `A[i][j] ⊗ v[j]`.
    Mxv,
}

/// Reject an output that shares its identity with an input, unless the
/// caller vouched for the overlap.
pub(crate) fn check_overlap(output: u64, inputs: &[u64], desc: Descriptor) -> Result<()> {
    if desc.contains(Descriptor::SAFE_OVERLAP) {
        return Ok(());
    }
    if inputs.contains(&output) {
        return Err(Error::Overlap);
    }
    Ok(())
}

#[inline]
fn check_size(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::Mismatch { expected, got });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// public entry points
// ---------------------------------------------------------------------------

/// `u ⊕= v A` under a semiring.
pub fn vxm<T, AddOp, MulOp>(
    u: &mut Vector<T>,
    v: &Vector<T>,
    a: &Matrix<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, u8, u8, AddOp, MulOp>(
        u,
        None,
        v,
        None,
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Vxm,
        desc,
        phase,
    )
}

/// [`vxm`] with an output mask.
pub fn vxm_masked<T, M, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: &Vector<M>,
    v: &Vector<T>,
    a: &Matrix<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    M: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, M, u8, AddOp, MulOp>(
        u,
        Some(u_mask),
        v,
        None,
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Vxm,
        desc,
        phase,
    )
}

/// [`vxm`] with both an output mask and an input mask.
pub fn vxm_both_masked<T, M1, M2, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: &Vector<M1>,
    v: &Vector<T>,
    v_mask: &Vector<M2>,
    a: &Matrix<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    M1: Element,
    M2: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic(
        u,
        Some(u_mask),
        v,
        Some(v_mask),
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Vxm,
        desc,
        phase,
    )
}

/// `u ⊕= v A` under an explicit additive monoid and multiplicative
/// operator, for pairings that do not form a semiring.
pub fn vxm_monoid<T, AddOp, MulOp>(
    u: &mut Vector<T>,
    v: &Vector<T>,
    a: &Matrix<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, u8, u8, AddOp, MulOp>(
        u,
        None,
        v,
        None,
        a,
        add,
        mul,
        Direction::Vxm,
        desc,
        phase,
    )
}

/// `u ⊕= A v` under a semiring.
pub fn mxv<T, AddOp, MulOp>(
    u: &mut Vector<T>,
    a: &Matrix<T>,
    v: &Vector<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, u8, u8, AddOp, MulOp>(
        u,
        None,
        v,
        None,
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Mxv,
        desc,
        phase,
    )
}

/// [`mxv`] with an output mask.
pub fn mxv_masked<T, M, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: &Vector<M>,
    a: &Matrix<T>,
    v: &Vector<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    M: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, M, u8, AddOp, MulOp>(
        u,
        Some(u_mask),
        v,
        None,
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Mxv,
        desc,
        phase,
    )
}

/// [`mxv`] with both an output mask and an input mask.
pub fn mxv_both_masked<T, M1, M2, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: &Vector<M1>,
    a: &Matrix<T>,
    v: &Vector<T>,
    v_mask: &Vector<M2>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    M1: Element,
    M2: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic(
        u,
        Some(u_mask),
        v,
        Some(v_mask),
        a,
        &ring.additive(),
        ring.multiplicative().op(),
        Direction::Mxv,
        desc,
        phase,
    )
}

/// `u ⊕= A v` under an explicit additive monoid and multiplicative
/// operator.
pub fn mxv_monoid<T, AddOp, MulOp>(
    u: &mut Vector<T>,
    a: &Matrix<T>,
    v: &Vector<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    vxm_generic::<T, u8, u8, AddOp, MulOp>(
        u,
        None,
        v,
        None,
        a,
        add,
        mul,
        Direction::Mxv,
        desc,
        phase,
    )
}

// ---------------------------------------------------------------------------
// generic core
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn vxm_generic<T, M1, M2, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: Option<&Vector<M1>>,
    v: &Vector<T>,
    v_mask: Option<&Vector<M2>>,
    a: &Matrix<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    direction: Direction,
    desc: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    M1: Element,
    M2: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    // facet selection; a transposed operand swaps the roles of the two
    // storage layouts and of the two dimensions
    let transposed = desc.contains(Descriptor::TRANSPOSE_MATRIX);
    let row_output = match direction {
        Direction::Vxm => transposed,
        Direction::Mxv => !transposed,
    };
    let (gather, scatter, out_dim, in_dim) = if row_output {
        (a.rcs(), a.ccs(), a.nrows(), a.ncols())
    } else {
        (a.ccs(), a.rcs(), a.ncols(), a.nrows())
    };

    check_size(out_dim, u.size())?;
    check_size(in_dim, v.size())?;
    if let Some(m) = u_mask {
        check_size(out_dim, m.size())?;
    }
    if let Some(m) = v_mask {
        check_size(in_dim, m.size())?;
    }

    let mut input_ids = vec![v.id(), a.id()];
    if let Some(m) = u_mask {
        input_ids.push(m.id());
    }
    if let Some(m) = v_mask {
        input_ids.push(m.id());
    }
    check_overlap(u.id(), &input_ids, desc)?;

    if phase == Phase::Resize {
        return Ok(());
    }

    if desc.contains(Descriptor::DENSE) {
        let mut all_dense = u.nnz() == u.size() && v.nnz() == v.size();
        if let Some(m) = u_mask {
            all_dense = all_dense && m.nnz() == m.size();
        }
        if let Some(m) = v_mask {
            all_dense = all_dense && m.nnz() == m.size();
        }
        if !all_dense {
            return Err(Error::Illegal("dense descriptor on a sparse operand"));
        }
    }

    // trivial exit: no products to form (an empty matrix still contributes
    // its folded-in identity diagonal)
    if v.nnz() == 0 || (a.nnz() == 0 && !desc.contains(Descriptor::ADD_IDENTITY)) {
        if desc.contains(Descriptor::EXPLICIT_ZERO) {
            let identity = add.identity();
            let (uvals, ucoords) = u.parts_mut();
            for j in 0..out_dim {
                if let Some(m) = u_mask {
                    if !m.mask_passes(j, desc) {
                        continue;
                    }
                }
                if !ucoords.assign(j) {
                    uvals[j] = identity;
                }
            }
        }
        return Ok(());
    }

    // loop-count estimates; the scatter side forfeits all parallelism, so
    // it is charged the thread count it leaves idle
    let threads = parallel::num_threads();
    let inverted = desc.contains(Descriptor::INVERT_MASK);
    let gather_cost = match u_mask {
        Some(m) if !inverted => out_dim.min(2 * m.nnz()),
        _ => out_dim,
    };
    let input_count = if desc.contains(Descriptor::DENSE) {
        in_dim
    } else {
        match v_mask {
            Some(m) if !inverted => in_dim.min(2 * m.nnz().min(v.nnz())),
            _ => in_dim.min(2 * v.nnz()),
        }
    };
    let scatter_cost = threads.saturating_mul(input_count);

    let use_gather = if desc.contains(Descriptor::FORCE_ROW_MAJOR) {
        row_output
    } else {
        gather_cost <= scatter_cost
    };

    if use_gather {
        gather_kernel(
            u, u_mask, v, v_mask, gather, add, mul, direction, desc, out_dim, in_dim,
        );
    } else {
        scatter_kernel(
            u, u_mask, v, v_mask, scatter, add, mul, direction, desc, out_dim, in_dim,
        );
    }
    Ok(())
}

/// Output-driven kernel: every task reduces a disjoint slice of output
/// indices against the output-major storage facet.
#[allow(clippy::too_many_arguments)]
fn gather_kernel<T, M1, M2, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: Option<&Vector<M1>>,
    v: &Vector<T>,
    v_mask: Option<&Vector<M2>>,
    storage: &CompressedStorage<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    direction: Direction,
    desc: Descriptor,
    out_dim: usize,
    in_dim: usize,
) where
    T: Element,
    M1: Element,
    M2: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    let inverted = desc.contains(Descriptor::INVERT_MASK);
    // a sparse non-inverted output mask shrinks the domain to its stack
    let mask_stack: Option<&[usize]> = match u_mask {
        Some(m) if !inverted && !m.coordinates().is_dense() && 2 * m.nnz() < out_dim => {
            Some(m.coordinates().stack())
        }
        _ => None,
    };
    let domain_len = mask_stack.map_or(out_dim, <[usize]>::len);
    if domain_len == 0 {
        return;
    }

    let starts = storage.start();
    let indices = storage.index();
    let mat_values = storage.values();
    let v_values = v.raw_values();
    let use_index = desc.contains(Descriptor::USE_INDEX);
    let add_identity = desc.contains(Descriptor::ADD_IDENTITY);
    let explicit_zero = desc.contains(Descriptor::EXPLICIT_ZERO);
    let add = *add;

    let ranges = parallel::partition(domain_len, parallel::num_threads());
    let mut updates = u.coordinates().make_updates(ranges.len());
    let view = u.raw_view();
    let update_refs: Vec<&mut crate::coordinates::Update> = updates.iter_mut().collect();

    parallel::for_each_zip(ranges, update_refs, |range, upd| {
        for r in range {
            let j = mask_stack.map_or(r, |s| s[r]);
            if let Some(m) = u_mask {
                if !m.mask_passes(j, desc) {
                    continue;
                }
            }
            let mut local = add.identity();
            let mut touched = false;

            // with the identity folded in, the matrix acts as A + I
            if add_identity && j < in_dim && v.coordinates().assigned(j) {
                let passes = v_mask.is_none_or(|m| m.mask_passes(j, desc));
                if passes {
                    let vv = if use_index {
                        T::from_f64(j as f64)
                    } else {
                        v_values[j]
                    };
                    add.foldl(&mut local, &vv);
                    touched = true;
                }
            }

            let lo = starts[j];
            let hi = starts[j + 1];
            for k in lo..hi {
                if k + PREFETCH_DISTANCE < hi {
                    v.coordinates().prefetch_assigned(indices[k + PREFETCH_DISTANCE]);
                }
                let i = indices[k];
                if !v.coordinates().assigned(i) {
                    continue;
                }
                if let Some(m) = v_mask {
                    if !m.mask_passes(i, desc) {
                        continue;
                    }
                }
                let vv = if use_index {
                    T::from_f64(i as f64)
                } else {
                    v_values[i]
                };
                let product = match direction {
                    Direction::Vxm => mul.apply(&vv, &mat_values[k]),
                    Direction::Mxv => mul.apply(&mat_values[k], &vv),
                };
                add.foldl(&mut local, &product);
                touched = true;
            }

            // an untouched slot still receives the additive identity when
            // explicit zeroes are requested
            if touched || explicit_zero {
                // this task is the only writer of output slot j
                unsafe {
                    if view.coordinates.assigned(j) {
                        add.foldl(view.values.get_mut(j), &local);
                    } else {
                        view.values.write(j, local);
                        view.coordinates.assign_async(j, upd);
                    }
                }
            }
        }
    });

    u.coordinates_mut().join_update(&mut updates);
}

/// Input-driven kernel: walks the input nonzeroes against the input-major
/// storage facet. Contributions land at arbitrary output indices, so the
/// whole loop runs on the calling thread.
#[allow(clippy::too_many_arguments)]
fn scatter_kernel<T, M1, M2, AddOp, MulOp>(
    u: &mut Vector<T>,
    u_mask: Option<&Vector<M1>>,
    v: &Vector<T>,
    v_mask: Option<&Vector<M2>>,
    storage: &CompressedStorage<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    direction: Direction,
    desc: Descriptor,
    out_dim: usize,
    in_dim: usize,
) where
    T: Element,
    M1: Element,
    M2: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    let inverted = desc.contains(Descriptor::INVERT_MASK);
    let use_index = desc.contains(Descriptor::USE_INDEX);
    let add_identity = desc.contains(Descriptor::ADD_IDENTITY);

    // drive over the smaller of the input pattern and a non-inverted
    // input mask, probing the other
    let domain: Vec<usize> = match v_mask {
        Some(m) if !inverted && !m.coordinates().is_dense() && m.nnz() < v.nnz() => {
            m.coordinates().stack().to_vec()
        }
        _ => {
            if v.coordinates().is_dense() {
                (0..in_dim).collect()
            } else {
                v.coordinates().stack().to_vec()
            }
        }
    };

    let starts = storage.start();
    let indices = storage.index();
    let mat_values = storage.values();
    let v_values = v.raw_values();
    let v_coords = v.coordinates();
    let (u_values, u_coords) = u.parts_mut();

    let mut merge = |j: usize, value: T| {
        if u_coords.assign(j) {
            add.foldl(&mut u_values[j], &value);
        } else {
            u_values[j] = value;
        }
    };

    for &i in &domain {
        if !v_coords.assigned(i) {
            continue;
        }
        if let Some(m) = v_mask {
            if !m.mask_passes(i, desc) {
                continue;
            }
        }
        let vv = if use_index {
            T::from_f64(i as f64)
        } else {
            v_values[i]
        };

        if add_identity && i < out_dim {
            let passes = u_mask.is_none_or(|m| m.mask_passes(i, desc));
            if passes {
                merge(i, vv);
            }
        }

        for k in starts[i]..starts[i + 1] {
            let j = indices[k];
            if let Some(m) = u_mask {
                if !m.mask_passes(j, desc) {
                    continue;
                }
            }
            let product = match direction {
                Direction::Vxm => mul.apply(&vv, &mat_values[k]),
                Direction::Mxv => mul.apply(&mat_values[k], &vv),
            };
            merge(j, product);
        }
    }

    if desc.contains(Descriptor::EXPLICIT_ZERO) {
        let identity = add.identity();
        for j in 0..out_dim {
            if let Some(m) = u_mask {
                if !m.mask_passes(j, desc) {
                    continue;
                }
            }
            if !u_coords.assign(j) {
                u_values[j] = identity;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ewise_lambda
// ---------------------------------------------------------------------------

/// Apply `f(row, col, &mut value)` to every stored nonzero of `a` exactly
/// once.
///
/// The traversal runs over the column-major facet in parallel; the
/// row-major facet is rebuilt on the fly so that both layouts agree on the
/// new values afterwards. Each task batches its visited nonzeroes into a
/// row-sorted chunk and inserts a chunk at a time under a lock, using the
/// end-offset/decrement protocol: `start` is first shifted so slot `i`
/// holds the end of row `i`, and every insert into row `i` claims position
/// `start[i] - 1`. Once all nonzeroes are inserted the offsets are back to
/// their original values. Entries within a row may end up reordered.
pub fn ewise_lambda_matrix<T, F>(f: F, a: &mut Matrix<T>) -> Result<()>
where
    T: Element,
    F: Fn(usize, usize, &mut T) + Sync,
{
    let m = a.nrows();
    let nnz = a.nnz();
    if nnz == 0 {
        return Ok(());
    }
    let (rcs, ccs) = a.facets_mut();

    // shift to end offsets; start[m] already equals nnz
    for i in 0..m {
        rcs.start[i] = rcs.start[i + 1];
    }

    let ccs_start: &[usize] = &ccs.start;
    let ccs_index: &[usize] = &ccs.index;
    let ccs_values = SendPtr::from_mut_slice(&mut ccs.values);
    let rebuild = Mutex::new((
        &mut rcs.start[..],
        &mut rcs.index[..],
        &mut rcs.values[..],
    ));

    let flush = |chunk: &mut Vec<(usize, usize, T)>| {
        if chunk.is_empty() {
            return;
        }
        chunk.sort_unstable_by_key(|&(i, _, _)| i);
        let mut guard = rebuild.lock().expect("row rebuild lock poisoned");
        let (starts, cols, vals) = &mut *guard;
        for &(i, j, value) in chunk.iter() {
            starts[i] -= 1;
            let slot = starts[i];
            cols[slot] = j;
            vals[slot] = value;
        }
        chunk.clear();
    };

    let ranges = parallel::partition(nnz, parallel::num_threads());
    let units: Vec<()> = vec![(); ranges.len()];
    parallel::for_each_zip(ranges, units, |range, ()| {
        // locate the column holding the first nonzero of this slice
        let mut col = ccs_start.partition_point(|&s| s <= range.start) - 1;
        let mut chunk: Vec<(usize, usize, T)> = Vec::with_capacity(EWISE_LAMBDA_CHUNK);
        for k in range {
            while ccs_start[col + 1] <= k {
                col += 1;
            }
            let row = ccs_index[k];
            // tasks own disjoint nonzero ranges of the column-major values
            let value = unsafe { ccs_values.get_mut(k) };
            f(row, col, value);
            chunk.push((row, col, *value));
            if chunk.len() == EWISE_LAMBDA_CHUNK {
                flush(&mut chunk);
            }
        }
        flush(&mut chunk);
    });

    drop(rebuild);
    debug_assert_eq!(rcs.start[0], 0);
    Ok(())
}

/// [`ewise_lambda_matrix`] for callbacks that capture vectors.
///
/// A captured vector is indexed by the row or the column argument inside
/// `f`, so its size must equal the matching matrix dimension. The caller
/// passes the sizes of every captured vector; each is validated against
/// both dimensions before the callback runs.
pub fn ewise_lambda_matrix_with<T, F>(
    f: F,
    a: &mut Matrix<T>,
    vector_sizes: &[usize],
) -> Result<()>
where
    T: Element,
    F: Fn(usize, usize, &mut T) + Sync,
{
    for &n in vector_sizes {
        if n != a.nrows() && n != a.ncols() {
            return Err(Error::Mismatch {
                expected: a.nrows(),
                got: n,
            });
        }
    }
    ewise_lambda_matrix(f, a)
}
