//! Level-1 primitives: `set`, folds, element-wise application, `dot`.
//!
//! Every primitive reduces to one of four internal kernels, picked by a
//! data-movement estimate expressed in bytes:
//!
//! - **dense**: contiguous loop over `[0, n)`, no coordinate bookkeeping;
//! - **vector-driven**: loop over the nonzeroes of the sparser operand,
//!   probing the other operand's `assigned` bitmap;
//! - **mask-driven**: loop over the nonzeroes of a non-inverted mask;
//! - **full-loop**: guarded loop over `[0, n)`, forced by an inverted mask.
//!
//! Output vectors are written through staged coordinate updates: each
//! fork-join task owns an [`Update`](crate::coordinates::Update) buffer and
//! a disjoint slice of the iteration domain, and a single `join_update`
//! merges the new sparsity pattern afterwards.
//!
//! In-place aliasing (`z` also an input) is expressed through the dedicated
//! fold entry points ([`fold_vector`], [`foldl`], [`foldr`]) rather than by
//! id comparison at runtime: Rust's borrow rules already reject passing one
//! vector as both output and input of the same call.

use crate::algebra::{BinaryOperator, Monoid, Semiring};
use crate::descriptor::{Descriptor, Phase};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::parallel;
use crate::vector::Vector;

/// Iteration domain of a sparse kernel.
enum Domain<'a> {
    /// Dense loop over `[0, n)`.
    Full(usize),
    /// Loop over an explicit index stack.
    Stack(&'a [usize]),
}

impl Domain<'_> {
    fn len(&self) -> usize {
        match self {
            Domain::Full(n) => *n,
            Domain::Stack(s) => s.len(),
        }
    }

    #[inline]
    fn get(&self, k: usize) -> usize {
        match self {
            Domain::Full(_) => k,
            Domain::Stack(s) => s[k],
        }
    }
}

/// Check two operand sizes, reporting the first as the expectation.
#[inline]
fn check_size(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::Mismatch { expected, got });
    }
    Ok(())
}

/// Whether every entry of `x` is populated.
#[inline]
fn is_effectively_dense<T: Element>(x: &Vector<T>) -> bool {
    x.nnz() == x.size()
}

/// Enforce the `DENSE` descriptor assertion on one operand.
#[inline]
fn check_dense_claim<T: Element>(x: &Vector<T>, desc: Descriptor) -> Result<()> {
    if desc.contains(Descriptor::DENSE) && !is_effectively_dense(x) {
        return Err(Error::Illegal("dense descriptor on a sparse operand"));
    }
    Ok(())
}

/// Run `compute` over every index of `domain`, writing `Some` results into
/// the (pre-cleared) output vector and staging the new coordinates.
///
/// Domain indices must be unique: each output slot is written by at most
/// one task.
fn scatter_compute<D3, F>(z: &mut Vector<D3>, domain: Domain<'_>, compute: F)
where
    D3: Element,
    F: Fn(usize) -> Option<D3> + Sync,
{
    debug_assert_eq!(z.nnz(), 0);
    let len = domain.len();
    if len == 0 {
        return;
    }
    let ranges = parallel::partition(len, parallel::num_threads());
    let mut updates = z.coordinates().make_updates(ranges.len());
    let view = z.raw_view();
    let update_refs: Vec<&mut crate::coordinates::Update> = updates.iter_mut().collect();
    parallel::for_each_zip(ranges, update_refs, |range, upd| {
        for k in range {
            let i = domain.get(k);
            if let Some(value) = compute(i) {
                // domain indices are unique, so these writes are disjoint
                unsafe {
                    view.values.write(i, value);
                    view.coordinates.assign_async(i, upd);
                }
            }
        }
    });
    z.coordinates_mut().join_update(&mut updates);
}

/// Dense kernel: `z[i] = compute(i)` for all `i`, making `z` dense.
fn dense_compute<D3, F>(z: &mut Vector<D3>, compute: F)
where
    D3: Element,
    F: Fn(usize) -> D3 + Sync,
{
    let n = z.size();
    let ranges = parallel::partition(n, parallel::num_threads());
    let mut segments: Vec<&mut [D3]> = Vec::with_capacity(ranges.len());
    let mut tail = z.raw_values_mut();
    let mut consumed = 0;
    for r in &ranges {
        let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
        segments.push(seg);
        tail = rest;
        consumed += r.len();
    }
    debug_assert_eq!(consumed, n);
    parallel::for_each_zip(ranges, segments, |range, seg| {
        for (o, i) in seg.iter_mut().zip(range) {
            *o = compute(i);
        }
    });
    z.coordinates_mut().assign_all();
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

/// `x[i] = value` for all `i`; `x` becomes dense.
pub fn set<T: Element>(x: &mut Vector<T>, value: T) -> Result<()> {
    dense_compute(x, |_| value);
    Ok(())
}

/// Copy `src` into `dst`: same pattern, same values.
pub fn set_vector<T: Element>(dst: &mut Vector<T>, src: &Vector<T>) -> Result<()> {
    check_size(dst.size(), src.size())?;
    dst.clear();
    if is_effectively_dense(src) {
        let values = src.raw_values();
        dense_compute(dst, |i| values[i]);
    } else {
        let values = src.raw_values();
        let stack = src.coordinates().stack();
        scatter_compute(dst, Domain::Stack(stack), |i| Some(values[i]));
    }
    Ok(())
}

/// `dst[i] = value` wherever the mask passes; other entries of `dst` are
/// removed.
pub fn set_masked<T: Element, M: Element>(
    dst: &mut Vector<T>,
    mask: &Vector<M>,
    value: T,
    desc: Descriptor,
) -> Result<()> {
    check_size(dst.size(), mask.size())?;
    dst.clear();
    let inverted = desc.contains(Descriptor::INVERT_MASK);
    if !inverted && mask.nnz() == 0 {
        return Ok(());
    }
    let domain = if inverted || mask.coordinates().is_dense() {
        Domain::Full(dst.size())
    } else {
        Domain::Stack(mask.coordinates().stack())
    };
    scatter_compute(dst, domain, |i| {
        if mask.mask_passes(i, desc) {
            Some(value)
        } else {
            None
        }
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// folds
// ---------------------------------------------------------------------------

/// Left fold of a scalar into a vector: `x[i] = op(x[i], beta)` over every
/// stored entry.
pub fn foldl<T, Op>(x: &mut Vector<T>, beta: T, op: Op) -> Result<()>
where
    T: Element,
    Op: BinaryOperator<T, T, T>,
{
    fold_scalar_into_vector(x, beta, move |a, b| op.apply(a, b));
    Ok(())
}

/// Right fold of a scalar into a vector: `x[i] = op(beta, x[i])`.
pub fn foldr<T, Op>(beta: T, x: &mut Vector<T>, op: Op) -> Result<()>
where
    T: Element,
    Op: BinaryOperator<T, T, T>,
{
    fold_scalar_into_vector(x, beta, move |a, b| op.apply(b, a));
    Ok(())
}

fn fold_scalar_into_vector<T, F>(x: &mut Vector<T>, beta: T, apply: F)
where
    T: Element,
    F: Fn(&T, &T) -> T + Sync,
{
    if is_effectively_dense(x) {
        let n = x.size();
        let ranges = parallel::partition(n, parallel::num_threads());
        let mut segments: Vec<&mut [T]> = Vec::with_capacity(ranges.len());
        let mut tail = x.raw_values_mut();
        for r in &ranges {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
            segments.push(seg);
            tail = rest;
        }
        let units: Vec<()> = vec![(); segments.len()];
        parallel::for_each_zip(segments, units, |seg, ()| {
            for v in seg.iter_mut() {
                *v = apply(v, &beta);
            }
        });
    } else {
        let (values, coords) = x.parts_mut();
        for k in 0..coords.nonzeroes() {
            let i = coords.index(k);
            values[i] = apply(&values[i], &beta);
        }
    }
}

/// Element-wise fold of `y` into `x` at their intersection:
/// `x[i] = op(x[i], y[i])`. This is the in-place rendering of an
/// `ewise_apply` whose output aliases its first input.
pub fn fold_vector<T, Op>(x: &mut Vector<T>, y: &Vector<T>, op: Op) -> Result<()>
where
    T: Element,
    Op: BinaryOperator<T, T, T>,
{
    check_size(x.size(), y.size())?;
    if is_effectively_dense(x) && is_effectively_dense(y) {
        let y_values = y.raw_values();
        let n = x.size();
        let ranges = parallel::partition(n, parallel::num_threads());
        let mut segments: Vec<(usize, &mut [T])> = Vec::with_capacity(ranges.len());
        let mut tail = x.raw_values_mut();
        for r in &ranges {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
            segments.push((r.start, seg));
            tail = rest;
        }
        let units: Vec<()> = vec![(); segments.len()];
        parallel::for_each_zip(segments, units, |(start, seg), ()| {
            op.ewise_foldl_slice(seg, &y_values[start..start + seg.len()]);
        });
    } else {
        // drive over the sparser pattern, probing the other
        let (values, coords) = x.parts_mut();
        if coords.nonzeroes() <= y.nnz() {
            for k in 0..coords.nonzeroes() {
                let i = coords.index(k);
                if let Some(yv) = y.get(i) {
                    values[i] = op.apply(&values[i], &yv);
                }
            }
        } else {
            for (i, yv) in y.iter() {
                if coords.assigned(i) {
                    values[i] = op.apply(&values[i], &yv);
                }
            }
        }
    }
    Ok(())
}

/// Reduce a vector into a scalar under a monoid:
/// `acc = op(acc, fold(x))`. Per-task partials start from the monoid
/// identity and are merged into the caller's accumulator at the end.
pub fn foldl_scalar<T, Op>(
    acc: &mut T,
    x: &Vector<T>,
    monoid: &Monoid<Op, T>,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    Op: BinaryOperator<T, T, T>,
{
    if phase == Phase::Resize {
        return Ok(());
    }
    let values = x.raw_values();
    let partials: Vec<T> = if is_effectively_dense(x) {
        parallel::map_ranges(x.size(), |range| {
            let mut local = monoid.identity();
            for i in range {
                monoid.foldl(&mut local, &values[i]);
            }
            local
        })
    } else {
        let stack = x.coordinates().stack();
        parallel::map_ranges(stack.len(), |range| {
            let mut local = monoid.identity();
            for k in range {
                monoid.foldl(&mut local, &values[stack[k]]);
            }
            local
        })
    };
    for p in partials {
        monoid.foldl(acc, &p);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// element-wise application
// ---------------------------------------------------------------------------

/// Byte-cost estimates for the four kernels. `usize::MAX` marks a kernel
/// inapplicable to the requested call.
struct KernelCosts {
    dense: usize,
    vector_driven: usize,
    mask_driven: usize,
    full_loop: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum KernelChoice {
    Dense,
    VectorDriven,
    MaskDriven,
    FullLoop,
}

impl KernelCosts {
    fn choose(&self) -> KernelChoice {
        let mut best = (self.full_loop, KernelChoice::FullLoop);
        for (cost, kind) in [
            (self.mask_driven, KernelChoice::MaskDriven),
            (self.vector_driven, KernelChoice::VectorDriven),
            (self.dense, KernelChoice::Dense),
        ] {
            if cost < best.0 {
                best = (cost, kind);
            }
        }
        best.1
    }
}

/// Estimate the movement cost of a two-input element-wise call.
fn ewise_costs<D1: Element, D2: Element, D3: Element, M: Element>(
    x: &Vector<D1>,
    y: &Vector<D2>,
    mask: Option<&Vector<M>>,
    desc: Descriptor,
) -> KernelCosts {
    let n = x.size();
    let elem = size_of::<D1>() + size_of::<D2>() + size_of::<D3>();
    let probe = size_of::<bool>();
    let inverted = desc.contains(Descriptor::INVERT_MASK);

    // the dense kernel writes every slot unconditionally, so it cannot
    // honour mask values; a mask disqualifies it even when all operands
    // are dense
    let both_dense = is_effectively_dense(x) && is_effectively_dense(y);
    let dense = if both_dense && mask.is_none() {
        n * elem
    } else {
        usize::MAX
    };

    let sparser = x.nnz().min(y.nnz());
    let vector_driven = if inverted && mask.is_some() {
        usize::MAX
    } else {
        let mask_probe = if mask.is_some() {
            probe + size_of::<M>()
        } else {
            0
        };
        sparser * (elem + probe + mask_probe)
    };

    let mask_driven = match mask {
        Some(m) if !inverted => m.nnz() * (elem + 2 * probe + size_of::<M>()),
        _ => usize::MAX,
    };

    let full_loop = n * (2 * probe + size_of::<M>()) + sparser * elem;

    KernelCosts {
        dense,
        vector_driven,
        mask_driven,
        full_loop,
    }
}

/// `z = op(x, y)` at the intersection of the patterns of `x` and `y`;
/// entries of `z` outside the intersection are removed.
pub fn ewise_apply<D1, D2, D3, Op>(
    z: &mut Vector<D3>,
    x: &Vector<D1>,
    y: &Vector<D2>,
    op: Op,
    desc: Descriptor,
) -> Result<()>
where
    D1: Element,
    D2: Element,
    D3: Element,
    Op: BinaryOperator<D1, D2, D3>,
{
    ewise_apply_masked_opt::<D1, D2, D3, u8, Op>(z, None, x, y, op, desc)
}

/// Masked [`ewise_apply`]: output entries are produced only where the mask
/// passes.
pub fn ewise_apply_masked<D1, D2, D3, M, Op>(
    z: &mut Vector<D3>,
    mask: &Vector<M>,
    x: &Vector<D1>,
    y: &Vector<D2>,
    op: Op,
    desc: Descriptor,
) -> Result<()>
where
    D1: Element,
    D2: Element,
    D3: Element,
    M: Element,
    Op: BinaryOperator<D1, D2, D3>,
{
    ewise_apply_masked_opt(z, Some(mask), x, y, op, desc)
}

fn ewise_apply_masked_opt<D1, D2, D3, M, Op>(
    z: &mut Vector<D3>,
    mask: Option<&Vector<M>>,
    x: &Vector<D1>,
    y: &Vector<D2>,
    op: Op,
    desc: Descriptor,
) -> Result<()>
where
    D1: Element,
    D2: Element,
    D3: Element,
    M: Element,
    Op: BinaryOperator<D1, D2, D3>,
{
    check_size(z.size(), x.size())?;
    check_size(z.size(), y.size())?;
    if let Some(m) = mask {
        check_size(z.size(), m.size())?;
    }
    check_dense_claim(x, desc)?;
    check_dense_claim(y, desc)?;

    let costs = ewise_costs::<D1, D2, D3, M>(x, y, mask, desc);
    let choice = costs.choose();

    z.clear();
    let xv = x.raw_values();
    let yv = y.raw_values();

    match (choice, mask) {
        (KernelChoice::Dense, m) => {
            debug_assert!(m.is_none());
            dense_compute(z, |i| op.apply(&xv[i], &yv[i]));
        }
        (KernelChoice::VectorDriven, _) => {
            let driver = if x.nnz() <= y.nnz() { x.coordinates() } else { y.coordinates() };
            let domain = if driver.is_dense() {
                Domain::Full(z.size())
            } else {
                Domain::Stack(driver.stack())
            };
            scatter_compute(z, domain, |i| {
                if let Some(m) = mask {
                    if !m.mask_passes(i, desc) {
                        return None;
                    }
                }
                (x.coordinates().assigned(i) && y.coordinates().assigned(i))
                    .then(|| op.apply(&xv[i], &yv[i]))
            });
        }
        (KernelChoice::MaskDriven, Some(m)) => {
            let domain = if m.coordinates().is_dense() {
                Domain::Full(z.size())
            } else {
                Domain::Stack(m.coordinates().stack())
            };
            scatter_compute(z, domain, |i| {
                if !m.mask_passes(i, desc) {
                    return None;
                }
                (x.coordinates().assigned(i) && y.coordinates().assigned(i))
                    .then(|| op.apply(&xv[i], &yv[i]))
            });
        }
        // unmasked calls cost the mask-driven kernel at usize::MAX
        (KernelChoice::MaskDriven, None) | (KernelChoice::FullLoop, _) => {
            scatter_compute(z, Domain::Full(x.size()), |i| {
                if let Some(m) = mask {
                    if !m.mask_passes(i, desc) {
                        return None;
                    }
                }
                (x.coordinates().assigned(i) && y.coordinates().assigned(i))
                    .then(|| op.apply(&xv[i], &yv[i]))
            });
        }
    }
    Ok(())
}

/// `z = op(alpha, y)` at the pattern of `y`.
pub fn ewise_apply_left_scalar<D1, D2, D3, Op>(
    z: &mut Vector<D3>,
    alpha: D1,
    y: &Vector<D2>,
    op: Op,
    desc: Descriptor,
) -> Result<()>
where
    D1: Element,
    D2: Element,
    D3: Element,
    Op: BinaryOperator<D1, D2, D3>,
{
    check_size(z.size(), y.size())?;
    check_dense_claim(y, desc)?;
    z.clear();
    let yv = y.raw_values();
    if is_effectively_dense(y) {
        dense_compute(z, |i| op.apply(&alpha, &yv[i]));
    } else {
        let stack = y.coordinates().stack();
        scatter_compute(z, Domain::Stack(stack), |i| Some(op.apply(&alpha, &yv[i])));
    }
    Ok(())
}

/// `z = op(x, beta)` at the pattern of `x`.
pub fn ewise_apply_right_scalar<D1, D2, D3, Op>(
    z: &mut Vector<D3>,
    x: &Vector<D1>,
    beta: D2,
    op: Op,
    desc: Descriptor,
) -> Result<()>
where
    D1: Element,
    D2: Element,
    D3: Element,
    Op: BinaryOperator<D1, D2, D3>,
{
    check_size(z.size(), x.size())?;
    check_dense_claim(x, desc)?;
    z.clear();
    let xv = x.raw_values();
    if is_effectively_dense(x) {
        dense_compute(z, |i| op.apply(&xv[i], &beta));
    } else {
        let stack = x.coordinates().stack();
        scatter_compute(z, Domain::Stack(stack), |i| Some(op.apply(&xv[i], &beta)));
    }
    Ok(())
}

/// `z[i] ⊕= x[i] ⊗ y[i]` at the intersection of `x` and `y`: the product
/// is folded into an existing `z` entry under the semiring's additive
/// operator, or inserted where `z` had none.
pub fn ewise_mul<T, AddOp, MulOp>(
    z: &mut Vector<T>,
    x: &Vector<T>,
    y: &Vector<T>,
    ring: &Semiring<AddOp, MulOp, T>,
    desc: Descriptor,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    check_size(z.size(), x.size())?;
    check_size(z.size(), y.size())?;
    check_dense_claim(x, desc)?;
    check_dense_claim(y, desc)?;

    let add = ring.additive();
    let mul = ring.multiplicative().op();

    if is_effectively_dense(x) && is_effectively_dense(y) && is_effectively_dense(z) {
        let xv = x.raw_values();
        let yv = y.raw_values();
        let n = z.size();
        let ranges = parallel::partition(n, parallel::num_threads());
        let mut segments: Vec<(usize, &mut [T])> = Vec::with_capacity(ranges.len());
        let mut tail = z.raw_values_mut();
        for r in &ranges {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
            segments.push((r.start, seg));
            tail = rest;
        }
        let units: Vec<()> = vec![(); segments.len()];
        parallel::for_each_zip(segments, units, |(start, seg), ()| {
            for (o, i) in seg.iter_mut().zip(start..) {
                let product = mul.apply(&xv[i], &yv[i]);
                add.foldl(o, &product);
            }
        });
        return Ok(());
    }

    // sparse path: drive over the sparser input pattern; serial because
    // insertion into z may also have to probe and update existing entries
    let driver = if x.nnz() <= y.nnz() { x } else { y };
    let domain: Vec<usize> = if driver.coordinates().is_dense() {
        (0..driver.size()).collect()
    } else {
        driver.coordinates().stack().to_vec()
    };
    let xv = x.raw_values();
    let yv = y.raw_values();
    let (zv, zc) = z.parts_mut();
    for &i in &domain {
        if !(x.coordinates().assigned(i) && y.coordinates().assigned(i)) {
            continue;
        }
        let product = mul.apply(&xv[i], &yv[i]);
        if zc.assign(i) {
            add.foldl(&mut zv[i], &product);
        } else {
            zv[i] = product;
        }
    }
    Ok(())
}

/// `z = x ⊕ y` at the union of the patterns of `x` and `y`; entries
/// present in only one input are copied through (folded with the monoid
/// identity).
pub fn ewise_add<T, Op>(
    z: &mut Vector<T>,
    x: &Vector<T>,
    y: &Vector<T>,
    monoid: &Monoid<Op, T>,
    desc: Descriptor,
) -> Result<()>
where
    T: Element,
    Op: BinaryOperator<T, T, T>,
{
    check_size(z.size(), x.size())?;
    check_size(z.size(), y.size())?;
    check_dense_claim(x, desc)?;
    check_dense_claim(y, desc)?;

    z.clear();
    let xv = x.raw_values();
    let yv = y.raw_values();

    if is_effectively_dense(x) && is_effectively_dense(y) {
        let m = *monoid;
        dense_compute(z, move |i| m.apply(&xv[i], &yv[i]));
        return Ok(());
    }

    // union semantics force the full loop unless one side is empty
    let m = *monoid;
    scatter_compute(z, Domain::Full(x.size()), move |i| {
        match (x.coordinates().assigned(i), y.coordinates().assigned(i)) {
            (true, true) => Some(m.apply(&xv[i], &yv[i])),
            (true, false) => Some(xv[i]),
            (false, true) => Some(yv[i]),
            (false, false) => None,
        }
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// dot
// ---------------------------------------------------------------------------

/// `acc ⊕= Σ_i x[i] ⊗ y[i]` over the pattern intersection. Per-task
/// partials start from the additive identity; partials are folded into the
/// caller's scalar once all tasks complete.
pub fn dot<T, AddOp, MulOp>(
    acc: &mut T,
    x: &Vector<T>,
    y: &Vector<T>,
    add: &Monoid<AddOp, T>,
    mul: MulOp,
    phase: Phase,
) -> Result<()>
where
    T: Element,
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
{
    check_size(x.size(), y.size())?;
    if phase == Phase::Resize {
        return Ok(());
    }

    let xv = x.raw_values();
    let yv = y.raw_values();

    let partials: Vec<T> = if is_effectively_dense(x) && is_effectively_dense(y) {
        parallel::map_ranges(x.size(), |range| {
            let mut local = add.identity();
            for i in range {
                let product = mul.apply(&xv[i], &yv[i]);
                add.foldl(&mut local, &product);
            }
            local
        })
    } else {
        // iterate the sparser operand, probe the other
        let (driver, other) = if x.nnz() <= y.nnz() { (x, y) } else { (y, x) };
        let stack: Vec<usize> = if driver.coordinates().is_dense() {
            (0..driver.size()).collect()
        } else {
            driver.coordinates().stack().to_vec()
        };
        parallel::map_ranges(stack.len(), |range| {
            let mut local = add.identity();
            for k in range {
                let i = stack[k];
                if other.coordinates().assigned(i) {
                    let product = mul.apply(&xv[i], &yv[i]);
                    add.foldl(&mut local, &product);
                }
            }
            local
        })
    };

    for p in partials {
        add.foldl(acc, &p);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ewise_lambda
// ---------------------------------------------------------------------------

/// Apply `f(i, &mut value)` to every stored entry of `x`.
pub fn ewise_lambda<T, F>(f: F, x: &mut Vector<T>) -> Result<()>
where
    T: Element,
    F: Fn(usize, &mut T) + Sync,
{
    if is_effectively_dense(x) {
        let n = x.size();
        let ranges = parallel::partition(n, parallel::num_threads());
        let mut segments: Vec<(usize, &mut [T])> = Vec::with_capacity(ranges.len());
        let mut tail = x.raw_values_mut();
        for r in &ranges {
            let (seg, rest) = std::mem::take(&mut tail).split_at_mut(r.len());
            segments.push((r.start, seg));
            tail = rest;
        }
        let units: Vec<()> = vec![(); segments.len()];
        parallel::for_each_zip(segments, units, |(start, seg), ()| {
            for (off, v) in seg.iter_mut().enumerate() {
                f(start + off, v);
            }
        });
    } else {
        let (values, coords) = x.parts_mut();
        let stack = coords.stack();
        let view = crate::parallel::SendPtr::from_mut_slice(values);
        let ranges = parallel::partition(stack.len(), parallel::num_threads());
        let units: Vec<()> = vec![(); ranges.len()];
        parallel::for_each_zip(ranges, units, |range, ()| {
            for k in range {
                let i = stack[k];
                // stack entries are unique
                unsafe { f(i, view.get_mut(i)) };
            }
        });
    }
    Ok(())
}
