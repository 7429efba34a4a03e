//! Solvers built on the level-1/level-2 primitives.

pub mod cg;
pub mod multigrid;

pub use cg::{conjugate_gradient, CgOptions, CgOutcome, IdentityPreconditioner, Preconditioner};
pub use multigrid::Multigrid;
