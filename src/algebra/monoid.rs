//! Monoids: an associative operator together with its identity element.

use super::operator::{BinaryOperator, LogicalAnd, LogicalOr, Max, Min, Plus, Times};
use crate::element::Element;

/// An associative binary operator over `T` with an identity element.
///
/// Kernels must obtain identities only through [`Monoid::identity`]; the
/// associativity assumption is what allows a primitive to apply the
/// operator in unspecified per-element order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Monoid<Op, T> {
    op: Op,
    identity: T,
}

impl<Op, T> Monoid<Op, T>
where
    Op: BinaryOperator<T, T, T>,
    T: Element,
{
    /// Pair an operator with its identity. The caller asserts that
    /// `op(identity, x) == op(x, identity) == x` for all `x`.
    pub fn new(op: Op, identity: T) -> Self {
        Monoid { op, identity }
    }

    /// The underlying operator.
    #[inline]
    pub fn op(&self) -> Op {
        self.op
    }

    /// The identity element.
    #[inline]
    pub fn identity(&self) -> T {
        self.identity
    }

    /// `op(a, b)`.
    #[inline]
    pub fn apply(&self, a: &T, b: &T) -> T {
        self.op.apply(a, b)
    }

    /// Left fold: `acc = op(acc, v)`.
    #[inline]
    pub fn foldl(&self, acc: &mut T, v: &T) {
        *acc = self.op.apply(acc, v);
    }

    /// Right fold: `acc = op(v, acc)`. Differs from [`Monoid::foldl`] only
    /// for non-commutative operators.
    #[inline]
    pub fn foldr(&self, v: &T, acc: &mut T) {
        *acc = self.op.apply(v, acc);
    }
}

impl<T: Element> Monoid<Plus, T> {
    /// The (+, 0) monoid.
    pub fn plus() -> Self {
        Monoid::new(Plus, T::zero())
    }
}

impl<T: Element> Monoid<Times, T> {
    /// The (×, 1) monoid.
    pub fn times() -> Self {
        Monoid::new(Times, T::one())
    }
}

impl<T: Element> Monoid<Min, T> {
    /// The (min, +∞) monoid; integral types saturate to their maximum.
    pub fn min() -> Self {
        Monoid::new(Min, T::from_f64(f64::INFINITY))
    }
}

impl<T: Element> Monoid<Max, T> {
    /// The (max, -∞) monoid; integral types saturate to their minimum.
    pub fn max() -> Self {
        Monoid::new(Max, T::from_f64(f64::NEG_INFINITY))
    }
}

impl<T: Element> Monoid<LogicalOr, T> {
    /// The (∨, 0) monoid on the nonzero interpretation.
    pub fn lor() -> Self {
        Monoid::new(LogicalOr, T::zero())
    }
}

impl<T: Element> Monoid<LogicalAnd, T> {
    /// The (∧, 1) monoid on the nonzero interpretation.
    pub fn land() -> Self {
        Monoid::new(LogicalAnd, T::one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities() {
        assert_eq!(Monoid::<Plus, f64>::plus().identity(), 0.0);
        assert_eq!(Monoid::<Times, i32>::times().identity(), 1);
        assert_eq!(Monoid::<Min, i64>::min().identity(), i64::MAX);
        assert_eq!(Monoid::<Max, f32>::max().identity(), f32::NEG_INFINITY);
    }

    #[test]
    fn folds() {
        let m = Monoid::<Plus, i32>::plus();
        let mut acc = m.identity();
        for v in [1, 2, 3] {
            m.foldl(&mut acc, &v);
        }
        assert_eq!(acc, 6);
    }
}
