//! Geometric multigrid V-cycle, used as a preconditioner for
//! [`conjugate_gradient`](super::conjugate_gradient).
//!
//! Each level owns its system matrix, a rectangular restriction matrix to
//! the next-coarser level, the inverse diagonal and a red/black colouring
//! for the smoother, plus the work vectors the cycle needs. Prolongation
//! reuses the restriction matrix through the transpose descriptor instead
//! of storing a second operator.

use crate::algebra::{Minus, Plus, Semiring, Times};
use crate::blas1;
use crate::blas2::{mxv, mxv_masked};
use crate::descriptor::{Descriptor, Phase};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::vector::Vector;
use num_traits::Float;

use super::cg::Preconditioner;

/// One level of the grid hierarchy.
struct Level<T: Element> {
    /// System matrix at this resolution.
    a: Matrix<T>,
    /// Coarse-by-fine restriction; `None` on the coarsest level.
    restriction: Option<Matrix<T>>,
    /// Reciprocal of the matrix diagonal.
    diag_inv: Vector<T>,
    /// One mask vector per smoother colour, swept in ascending colour
    /// order; together they partition the unknowns.
    colour_masks: Vec<Vector<u8>>,
    /// Fine-sized scratch: `A z` and the prolongated correction.
    work: Vector<T>,
    /// Fine-sized scratch: the masked smoother update.
    delta: Vector<T>,
    /// Restricted residual, sized to the next-coarser level.
    coarse_rhs: Vector<T>,
    /// Coarse-level correction, sized to the next-coarser level.
    coarse_sol: Vector<T>,
}

/// V-cycle preconditioner over a caller-supplied hierarchy.
pub struct Multigrid<T: Element> {
    levels: Vec<Level<T>>,
    smoother_steps: usize,
    coarse_sweeps: usize,
}

impl<T: Element + Float> Multigrid<T> {
    /// An empty hierarchy performing `smoother_steps` red/black sweeps at
    /// each level and `coarse_sweeps` sweeps as the coarsest-level solve.
    pub fn new(smoother_steps: usize, coarse_sweeps: usize) -> Self {
        Multigrid {
            levels: Vec::new(),
            smoother_steps: smoother_steps.max(1),
            coarse_sweeps: coarse_sweeps.max(1),
        }
    }

    /// Number of levels pushed so far.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Append the next-coarser level. Levels are pushed finest first; the
    /// previous level's restriction must map onto this one.
    ///
    /// `restriction` maps this level to the next-coarser one and is `None`
    /// for the coarsest level. `colours` assigns each unknown a smoother
    /// colour; one mask vector is built per distinct colour, and sweeps
    /// visit the colours in ascending order.
    pub fn push_level(
        &mut self,
        a: Matrix<T>,
        restriction: Option<Matrix<T>>,
        colours: &[u8],
    ) -> Result<()> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(Error::Mismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        if colours.len() != n {
            return Err(Error::Mismatch {
                expected: n,
                got: colours.len(),
            });
        }
        if let Some(prev) = self.levels.last() {
            let expected = prev
                .restriction
                .as_ref()
                .map_or(0, Matrix::nrows);
            if expected != n {
                return Err(Error::Mismatch { expected, got: n });
            }
        }
        let coarse_dim = match &restriction {
            Some(r) => {
                if r.ncols() != n {
                    return Err(Error::Mismatch {
                        expected: n,
                        got: r.ncols(),
                    });
                }
                r.nrows()
            }
            None => 0,
        };

        let mut diag_inv = Vector::<T>::new(n);
        blas1::set(&mut diag_inv, <T as Element>::zero())?;
        let mut found = 0;
        for (i, j, v) in a.triples() {
            if i == j {
                if !v.is_nonzero() {
                    return Err(Error::Illegal("zero on the smoother diagonal"));
                }
                diag_inv.set_element(v.recip(), i)?;
                found += 1;
            }
        }
        if found != n {
            return Err(Error::Illegal("missing diagonal entry in smoother matrix"));
        }

        let mut palette = colours.to_vec();
        palette.sort_unstable();
        palette.dedup();
        let mut colour_masks = Vec::with_capacity(palette.len());
        for &c in &palette {
            let entries: Vec<(usize, u8)> = colours
                .iter()
                .enumerate()
                .filter(|&(_, &cc)| cc == c)
                .map(|(i, _)| (i, 1u8))
                .collect();
            colour_masks.push(Vector::build(n, &entries)?);
        }

        self.levels.push(Level {
            a,
            restriction,
            diag_inv,
            colour_masks,
            work: Vector::new(n),
            delta: Vector::new(n),
            coarse_rhs: Vector::new(coarse_dim),
            coarse_sol: Vector::new(coarse_dim),
        });
        Ok(())
    }
}

/// One coloured Gauss-Seidel sweep: for each colour mask in turn,
/// `z[i] += diag_inv[i] * (r[i] - (A z)[i])` over the unknowns the mask
/// selects. Recomputing the masked `A z` between half-sweeps lets each
/// colour see the updates of the previous one.
fn smooth<T: Element + Float>(level: &mut Level<T>, r: &Vector<T>, z: &mut Vector<T>) -> Result<()> {
    let ring = Semiring::<Plus, Times, T>::plus_times();
    let Level {
        a,
        diag_inv,
        colour_masks,
        work,
        delta,
        ..
    } = level;
    for mask in colour_masks.iter() {
        // A z over this colour's rows; untouched rows still need their
        // explicit zero so the residual below covers every masked unknown
        work.clear();
        mxv_masked(
            work,
            mask,
            a,
            z,
            &ring,
            Descriptor::EXPLICIT_ZERO,
            Phase::Execute,
        )?;
        blas1::ewise_apply_masked(delta, mask, r, &*work, Minus, Descriptor::default())?;
        blas1::fold_vector(delta, diag_inv, Times)?;
        blas1::fold_vector(z, &*delta, Plus)?;
    }
    Ok(())
}

/// Recursive V-cycle over a finest-first level slice, solving `A z ≈ r`
/// with a zero initial guess.
fn vcycle<T: Element + Float>(
    levels: &mut [Level<T>],
    r: &Vector<T>,
    z: &mut Vector<T>,
    smoother_steps: usize,
    coarse_sweeps: usize,
) -> Result<()> {
    let zero = <T as Element>::zero();
    blas1::set(z, zero)?;
    let Some((level, rest)) = levels.split_first_mut() else {
        return Ok(());
    };

    if level.restriction.is_none() || rest.is_empty() {
        for _ in 0..coarse_sweeps {
            smooth(level, r, z)?;
        }
        return Ok(());
    }

    for _ in 0..smoother_steps {
        smooth(level, r, z)?;
    }

    let ring = Semiring::<Plus, Times, T>::plus_times();

    // fine residual, then restrict it
    blas1::set(&mut level.work, zero)?;
    mxv(
        &mut level.work,
        &level.a,
        z,
        &ring,
        Descriptor::default(),
        Phase::Execute,
    )?;
    {
        let rr = r;
        blas1::ewise_lambda(
            |i, wi| *wi = rr.get(i).unwrap_or(zero) - *wi,
            &mut level.work,
        )?;
    }
    let restriction = level
        .restriction
        .as_ref()
        .ok_or(Error::Illegal("missing restriction operator"))?;
    blas1::set(&mut level.coarse_rhs, zero)?;
    mxv(
        &mut level.coarse_rhs,
        restriction,
        &level.work,
        &ring,
        Descriptor::default(),
        Phase::Execute,
    )?;

    vcycle(
        rest,
        &level.coarse_rhs,
        &mut level.coarse_sol,
        smoother_steps,
        coarse_sweeps,
    )?;

    // prolongate the coarse correction and fold it in
    blas1::set(&mut level.work, zero)?;
    mxv(
        &mut level.work,
        restriction,
        &level.coarse_sol,
        &ring,
        Descriptor::TRANSPOSE_MATRIX,
        Phase::Execute,
    )?;
    blas1::fold_vector(z, &level.work, Plus)?;

    for _ in 0..smoother_steps {
        smooth(level, r, z)?;
    }
    Ok(())
}

impl<T: Element + Float> Preconditioner<T> for Multigrid<T> {
    fn apply(&mut self, z: &mut Vector<T>, r: &Vector<T>) -> Result<()> {
        if self.levels.is_empty() {
            return blas1::set_vector(z, r);
        }
        if z.size() != self.levels[0].a.nrows() {
            return Err(Error::Mismatch {
                expected: self.levels[0].a.nrows(),
                got: z.size(),
            });
        }
        vcycle(
            &mut self.levels,
            r,
            z,
            self.smoother_steps,
            self.coarse_sweeps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laplacian_1d(n: usize) -> Matrix<f64> {
        let mut triples = Vec::with_capacity(3 * n);
        for i in 0..n {
            triples.push((i, i, 2.0));
            if i > 0 {
                triples.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triples.push((i, i + 1, -1.0));
            }
        }
        Matrix::from_triples(n, n, &triples).unwrap()
    }

    fn injection(fine: usize) -> Matrix<f64> {
        let coarse = fine / 2;
        let triples: Vec<_> = (0..coarse).map(|c| (c, 2 * c + 1, 1.0)).collect();
        Matrix::from_triples(coarse, fine, &triples).unwrap()
    }

    fn parity_colours(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 2) as u8).collect()
    }

    #[test]
    fn vcycle_reduces_the_residual() {
        let n = 16;
        let fine = laplacian_1d(n);
        let coarse = laplacian_1d(n / 2);
        let mut mg = Multigrid::new(2, 16);
        mg.push_level(fine.clone(), Some(injection(n)), &parity_colours(n))
            .unwrap();
        mg.push_level(coarse, None, &parity_colours(n / 2)).unwrap();

        let r = Vector::from_slice(&vec![1.0f64; n]);
        let mut z = Vector::<f64>::new(n);
        mg.apply(&mut z, &r).unwrap();

        // z should approximate A^{-1} r better than the zero guess:
        // compare residual norms before and after
        let ring = Semiring::<Plus, Times, f64>::plus_times();
        let mut az = Vector::<f64>::new(n);
        blas1::set(&mut az, 0.0).unwrap();
        mxv(&mut az, &fine, &z, &ring, Descriptor::default(), Phase::Execute).unwrap();
        let mut resid = 0.0;
        for i in 0..n {
            let d = 1.0 - az.get(i).unwrap();
            resid += d * d;
        }
        assert!(resid.sqrt() < (n as f64).sqrt());
    }

    #[test]
    fn level_dimensions_are_checked() {
        let mut mg = Multigrid::<f64>::new(1, 1);
        mg.push_level(laplacian_1d(8), Some(injection(8)), &parity_colours(8))
            .unwrap();
        // coarse level must match the restriction's row count (4)
        assert!(matches!(
            mg.push_level(laplacian_1d(5), None, &parity_colours(5)),
            Err(Error::Mismatch { expected: 4, got: 5 })
        ));
    }

    #[test]
    fn zero_diagonal_rejected() {
        let a = Matrix::from_triples(2, 2, &[(0, 0, 1.0f64), (0, 1, 1.0)]).unwrap();
        let mut mg = Multigrid::<f64>::new(1, 1);
        assert!(matches!(
            mg.push_level(a, None, &[0, 1]),
            Err(Error::Illegal(_))
        ));
    }
}
