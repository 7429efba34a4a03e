//! Operator, monoid, and semiring records that parameterise the kernels.
//!
//! A kernel receives these by value and treats them as opaque callables: it
//! may invoke `apply`, fold a value into an accumulator, or use a bulk
//! slice variant, and it may only synthesise an identity element through a
//! monoid. All records are zero- or near-zero-sized so the hot loops
//! monomorphise to direct calls.

mod monoid;
mod operator;
mod semiring;

pub use monoid::Monoid;
pub use operator::{
    BinaryOperator, Divide, Left, LogicalAnd, LogicalOr, Max, Min, Minus, Plus, Right, Times,
};
pub use semiring::Semiring;
