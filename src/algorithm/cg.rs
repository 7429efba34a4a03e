//! Preconditioned conjugate gradients.
//!
//! The solver touches the system matrix only through [`mxv`] and the
//! vectors only through the level-1 primitives, so it inherits their
//! parallelism without any kernel code of its own. Convergence is judged
//! against the initial residual norm, the usual criterion for symmetric
//! positive-definite systems.

use crate::algebra::{Minus, Monoid, Plus, Semiring, Times};
use crate::blas1;
use crate::blas2::mxv;
use crate::descriptor::{Descriptor, Phase};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::vector::Vector;
use num_traits::Float;

/// Solver configuration.
#[derive(Debug, Clone, Copy)]
pub struct CgOptions<T> {
    /// Hard cap on iterations.
    pub max_iterations: usize,
    /// Relative residual reduction at which the solve counts as converged.
    pub tolerance: T,
}

impl<T: Element> Default for CgOptions<T> {
    fn default() -> Self {
        CgOptions {
            max_iterations: 500,
            tolerance: T::from_f64(1e-8),
        }
    }
}

/// Result of a conjugate-gradient solve.
#[derive(Debug, Clone, Copy)]
pub struct CgOutcome<T> {
    /// Iterations actually performed.
    pub iterations: usize,
    /// Final absolute residual two-norm.
    pub residual_norm: T,
    /// Whether the relative tolerance was met.
    pub converged: bool,
}

/// Approximate application of an inverse operator, `z ≈ M⁻¹ r`.
pub trait Preconditioner<T: Element> {
    fn apply(&mut self, z: &mut Vector<T>, r: &Vector<T>) -> Result<()>;
}

/// The do-nothing preconditioner: `z = r`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPreconditioner;

impl<T: Element> Preconditioner<T> for IdentityPreconditioner {
    fn apply(&mut self, z: &mut Vector<T>, r: &Vector<T>) -> Result<()> {
        blas1::set_vector(z, r)
    }
}

/// Solve `A x = b` for symmetric positive-definite `A`, starting from the
/// initial guess in `x`.
pub fn conjugate_gradient<T, P>(
    x: &mut Vector<T>,
    a: &Matrix<T>,
    b: &Vector<T>,
    precond: &mut P,
    options: &CgOptions<T>,
) -> Result<CgOutcome<T>>
where
    T: Element + Float,
    P: Preconditioner<T>,
{
    let n = a.nrows();
    if a.ncols() != n {
        return Err(Error::Mismatch {
            expected: n,
            got: a.ncols(),
        });
    }
    if x.size() != n {
        return Err(Error::Mismatch {
            expected: n,
            got: x.size(),
        });
    }
    if b.size() != n {
        return Err(Error::Mismatch {
            expected: n,
            got: b.size(),
        });
    }

    let zero = <T as Element>::zero();
    let ring = Semiring::<Plus, Times, T>::plus_times();
    let plus: Monoid<Plus, T> = Monoid::plus();

    // the update loop walks every entry of x, so a sparse guess is
    // promoted to an explicit dense one up front
    if x.nnz() != n {
        let full: Vec<T> = (0..n).map(|i| x.get(i).unwrap_or(zero)).collect();
        *x = Vector::from_slice(&full);
    }

    // r = b - A x
    let mut r = Vector::<T>::new(n);
    blas1::set(&mut r, zero)?;
    mxv(&mut r, a, x, &ring, Descriptor::default(), Phase::Execute)?;
    blas1::ewise_lambda(|i, ri| *ri = b.get(i).unwrap_or(zero) - *ri, &mut r)?;

    let mut rr = zero;
    blas1::dot(&mut rr, &r, &r, &plus, Times, Phase::Execute)?;
    let norm0 = rr.sqrt();
    if norm0 == zero {
        return Ok(CgOutcome {
            iterations: 0,
            residual_norm: zero,
            converged: true,
        });
    }

    let mut z = Vector::<T>::new(n);
    let mut p = Vector::<T>::new(n);
    let mut ap = Vector::<T>::new(n);
    let mut scaled = Vector::<T>::new(n);

    let mut rtz_old = zero;
    let mut norm = norm0;

    for iter in 1..=options.max_iterations {
        precond.apply(&mut z, &r)?;

        let mut rtz = zero;
        blas1::dot(&mut rtz, &r, &z, &plus, Times, Phase::Execute)?;

        if iter == 1 {
            blas1::set_vector(&mut p, &z)?;
        } else {
            let beta = rtz / rtz_old;
            blas1::foldl(&mut p, beta, Times)?;
            blas1::fold_vector(&mut p, &z, Plus)?;
        }
        rtz_old = rtz;

        blas1::set(&mut ap, zero)?;
        mxv(&mut ap, a, &p, &ring, Descriptor::default(), Phase::Execute)?;

        let mut pap = zero;
        blas1::dot(&mut pap, &p, &ap, &plus, Times, Phase::Execute)?;
        if !(pap > zero) {
            // search direction fell in the null space; A is not SPD
            return Ok(CgOutcome {
                iterations: iter,
                residual_norm: norm,
                converged: false,
            });
        }
        let alpha = rtz / pap;

        blas1::ewise_apply_right_scalar(&mut scaled, &p, alpha, Times, Descriptor::default())?;
        blas1::fold_vector(x, &scaled, Plus)?;
        blas1::ewise_apply_right_scalar(&mut scaled, &ap, alpha, Times, Descriptor::default())?;
        blas1::fold_vector(&mut r, &scaled, Minus)?;

        rr = zero;
        blas1::dot(&mut rr, &r, &r, &plus, Times, Phase::Execute)?;
        norm = rr.sqrt();
        if norm <= options.tolerance * norm0 {
            return Ok(CgOutcome {
                iterations: iter,
                residual_norm: norm,
                converged: true,
            });
        }
    }

    Ok(CgOutcome {
        iterations: options.max_iterations,
        residual_norm: norm,
        converged: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_system_converges_immediately() {
        let a = Matrix::from_triples(3, 3, &[(0, 0, 2.0f64), (1, 1, 4.0), (2, 2, 8.0)]).unwrap();
        let b = Vector::from_slice(&[2.0f64, 8.0, 24.0]);
        let mut x = Vector::<f64>::new(3);
        blas1::set(&mut x, 0.0).unwrap();
        let outcome = conjugate_gradient(
            &mut x,
            &a,
            &b,
            &mut IdentityPreconditioner,
            &CgOptions::default(),
        )
        .unwrap();
        assert!(outcome.converged);
        assert!((x.get(0).unwrap() - 1.0).abs() < 1e-8);
        assert!((x.get(1).unwrap() - 2.0).abs() < 1e-8);
        assert!((x.get(2).unwrap() - 3.0).abs() < 1e-8);
    }

    #[test]
    fn zero_rhs_is_trivially_solved() {
        let a = Matrix::identity(4, 1.0f64);
        let b = Vector::from_slice(&[0.0f64; 4]);
        let mut x = Vector::<f64>::new(4);
        blas1::set(&mut x, 0.0).unwrap();
        let outcome = conjugate_gradient(
            &mut x,
            &a,
            &b,
            &mut IdentityPreconditioner,
            &CgOptions::default(),
        )
        .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn rectangular_matrix_rejected() {
        let a = Matrix::from_triples(2, 3, &[(0, 0, 1.0f64)]).unwrap();
        let b = Vector::from_slice(&[1.0f64, 1.0]);
        let mut x = Vector::<f64>::new(2);
        assert!(matches!(
            conjugate_gradient(
                &mut x,
                &a,
                &b,
                &mut IdentityPreconditioner,
                &CgOptions::default()
            ),
            Err(Error::Mismatch { .. })
        ));
    }
}
