//! End-to-end solver runs on discrete Laplacians.

use sparr::algebra::{Plus, Semiring, Times};
use sparr::algorithm::{conjugate_gradient, CgOptions, IdentityPreconditioner, Multigrid};
use sparr::{blas1, blas2, Descriptor, Matrix, Phase, Vector};

/// Tridiagonal [-1, 2, -1] operator on `n` points.
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

/// 7-point Laplacian on an `nx × nx × nx` grid with Dirichlet boundaries.
fn laplacian_3d(nx: usize) -> Matrix<f64> {
    let n = nx * nx * nx;
    let idx = |x: usize, y: usize, z: usize| (z * nx + y) * nx + x;
    let mut triples = Vec::new();
    for z in 0..nx {
        for y in 0..nx {
            for x in 0..nx {
                let i = idx(x, y, z);
                triples.push((i, i, 6.0));
                if x > 0 {
                    triples.push((i, idx(x - 1, y, z), -1.0));
                }
                if x + 1 < nx {
                    triples.push((i, idx(x + 1, y, z), -1.0));
                }
                if y > 0 {
                    triples.push((i, idx(x, y - 1, z), -1.0));
                }
                if y + 1 < nx {
                    triples.push((i, idx(x, y + 1, z), -1.0));
                }
                if z > 0 {
                    triples.push((i, idx(x, y, z - 1), -1.0));
                }
                if z + 1 < nx {
                    triples.push((i, idx(x, y, z + 1), -1.0));
                }
            }
        }
    }
    Matrix::from_triples(n, n, &triples).unwrap()
}

/// Injection restriction keeping every second point of a 1-D grid.
fn injection_1d(fine: usize) -> Matrix<f64> {
    let coarse = fine / 2;
    let triples: Vec<_> = (0..coarse).map(|c| (c, 2 * c + 1, 1.0)).collect();
    Matrix::from_triples(coarse, fine, &triples).unwrap()
}

fn parity_colours(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 2) as u8).collect()
}

/// Residual two-norm of `A x - b`.
fn residual_norm(a: &Matrix<f64>, x: &Vector<f64>, b: &Vector<f64>) -> f64 {
    let ring = Semiring::<Plus, Times, f64>::plus_times();
    let n = a.nrows();
    let mut ax = Vector::<f64>::new(n);
    blas1::set(&mut ax, 0.0).unwrap();
    blas2::mxv(&mut ax, a, x, &ring, Descriptor::default(), Phase::Execute).unwrap();
    (0..n)
        .map(|i| {
            let d = ax.get(i).unwrap_or(0.0) - b.get(i).unwrap_or(0.0);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[test]
fn plain_cg_solves_the_1d_laplacian() {
    let n = 64;
    let a = laplacian_1d(n);
    let b = Vector::from_slice(&vec![1.0f64; n]);
    let mut x = Vector::<f64>::new(n);
    blas1::set(&mut x, 0.0).unwrap();

    let outcome = conjugate_gradient(
        &mut x,
        &a,
        &b,
        &mut IdentityPreconditioner,
        &CgOptions {
            max_iterations: 200,
            tolerance: 1e-10,
        },
    )
    .unwrap();

    assert!(outcome.converged, "stalled at {}", outcome.residual_norm);
    assert!(residual_norm(&a, &x, &b) < 1e-6);
}

#[test]
fn multigrid_preconditioning_cuts_the_iteration_count() {
    let n = 64;
    let a = laplacian_1d(n);
    let b = Vector::from_slice(&vec![1.0f64; n]);
    let options = CgOptions {
        max_iterations: 200,
        tolerance: 1e-10,
    };

    let mut x_plain = Vector::<f64>::new(n);
    blas1::set(&mut x_plain, 0.0).unwrap();
    let plain = conjugate_gradient(
        &mut x_plain,
        &a,
        &b,
        &mut IdentityPreconditioner,
        &options,
    )
    .unwrap();
    assert!(plain.converged);

    let mut mg = Multigrid::new(2, 32);
    mg.push_level(a.clone(), Some(injection_1d(n)), &parity_colours(n))
        .unwrap();
    mg.push_level(laplacian_1d(n / 2), Some(injection_1d(n / 2)), &parity_colours(n / 2))
        .unwrap();
    mg.push_level(laplacian_1d(n / 4), None, &parity_colours(n / 4))
        .unwrap();
    assert_eq!(mg.depth(), 3);

    let mut x_mg = Vector::<f64>::new(n);
    blas1::set(&mut x_mg, 0.0).unwrap();
    let preconditioned = conjugate_gradient(&mut x_mg, &a, &b, &mut mg, &options).unwrap();

    assert!(preconditioned.converged);
    assert!(
        preconditioned.iterations < plain.iterations,
        "preconditioned {} vs plain {}",
        preconditioned.iterations,
        plain.iterations
    );
    assert!(residual_norm(&a, &x_mg, &b) < 1e-6);
}

#[test]
fn cg_handles_a_3d_poisson_problem() {
    let nx = 6;
    let a = laplacian_3d(nx);
    let n = nx * nx * nx;
    let b = Vector::from_slice(&vec![1.0f64; n]);
    let mut x = Vector::<f64>::new(n);
    blas1::set(&mut x, 0.0).unwrap();

    let outcome = conjugate_gradient(
        &mut x,
        &a,
        &b,
        &mut IdentityPreconditioner,
        &CgOptions {
            max_iterations: 300,
            tolerance: 1e-9,
        },
    )
    .unwrap();

    assert!(outcome.converged);
    assert!(residual_norm(&a, &x, &b) < 1e-5);
}

#[test]
fn sparse_initial_guess_is_densified() {
    let n = 32;
    let a = laplacian_1d(n);
    let b = Vector::from_slice(&vec![1.0f64; n]);
    // only two entries assigned; the rest are treated as zero
    let mut x = Vector::build(n, &[(0, 0.5f64), (17, -1.0)]).unwrap();

    let outcome = conjugate_gradient(
        &mut x,
        &a,
        &b,
        &mut IdentityPreconditioner,
        &CgOptions {
            max_iterations: 200,
            tolerance: 1e-10,
        },
    )
    .unwrap();

    assert!(outcome.converged);
    assert_eq!(x.nnz(), n);
    assert!(residual_norm(&a, &x, &b) < 1e-6);
}
