//! Shared-memory sparse linear algebra over semirings.
//!
//! The crate provides sparse [`Vector`] and dual-layout [`Matrix`]
//! containers, an algebra layer of binary operators, monoids and semirings,
//! and level-1/level-2 BLAS-style primitives whose kernels are selected at
//! runtime by data-movement estimates. [`Descriptor`] bits tune a call
//! (masks, transposition, density assertions) without changing its
//! signature.
//!
//! Kernels parallelise through fork-join tasks that stage sparsity updates
//! into per-task buffers and merge them in one collective step, so a
//! vector's coordinate set is never contended mid-loop.
//!
//! # Example
//!
//! ```
//! use sparr::algebra::{Plus, Semiring, Times};
//! use sparr::{blas2, Descriptor, Matrix, Phase, Vector};
//!
//! # fn main() -> sparr::Result<()> {
//! let a = Matrix::from_triples(2, 2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)])?;
//! let v = Vector::from_slice(&[10.0, 20.0]);
//! let ring = Semiring::<Plus, Times, f64>::plus_times();
//!
//! let mut u = Vector::<f64>::new(2);
//! blas2::mxv(&mut u, &a, &v, &ring, Descriptor::default(), Phase::Execute)?;
//! assert_eq!(u.get(0), Some(50.0));
//! assert_eq!(u.get(1), Some(60.0));
//! # Ok(())
//! # }
//! ```

pub mod algebra;
pub mod algorithm;
pub mod blas1;
pub mod blas2;
pub mod config;
pub mod coordinates;
pub mod descriptor;
pub mod element;
pub mod error;
pub mod matrix;
pub mod parallel;
pub mod vector;

pub use descriptor::{Descriptor, Phase};
pub use element::Element;
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use vector::Vector;

/// Common imports for downstream code.
pub mod prelude {
    pub use crate::algebra::{BinaryOperator, Monoid, Semiring};
    pub use crate::algorithm::{conjugate_gradient, CgOptions, Multigrid, Preconditioner};
    pub use crate::descriptor::{Descriptor, Phase};
    pub use crate::element::Element;
    pub use crate::error::{Error, Result};
    pub use crate::matrix::Matrix;
    pub use crate::vector::Vector;
    pub use crate::{blas1, blas2};
}
