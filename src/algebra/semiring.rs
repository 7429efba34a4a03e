//! Semirings: an additive commutative monoid composed with a
//! multiplicative monoid that distributes over it.

use super::monoid::Monoid;
use super::operator::{BinaryOperator, LogicalAnd, LogicalOr, Max, Min, Plus, Times};
use crate::element::Element;

/// A semiring over a single carrier type `T`.
///
/// The multiplicative side is carried as a full monoid so that kernels that
/// need `A + I` semantics ([`Descriptor::ADD_IDENTITY`]) have a
/// well-defined multiplicative identity to inject.
///
/// [`Descriptor::ADD_IDENTITY`]: crate::descriptor::Descriptor::ADD_IDENTITY
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Semiring<AddOp, MulOp, T> {
    additive: Monoid<AddOp, T>,
    multiplicative: Monoid<MulOp, T>,
}

impl<AddOp, MulOp, T> Semiring<AddOp, MulOp, T>
where
    AddOp: BinaryOperator<T, T, T>,
    MulOp: BinaryOperator<T, T, T>,
    T: Element,
{
    /// Compose an additive and a multiplicative monoid. The caller asserts
    /// commutativity of the additive side and distributivity of the
    /// multiplicative side over it.
    pub fn new(additive: Monoid<AddOp, T>, multiplicative: Monoid<MulOp, T>) -> Self {
        Semiring {
            additive,
            multiplicative,
        }
    }

    /// The additive monoid.
    #[inline]
    pub fn additive(&self) -> Monoid<AddOp, T> {
        self.additive
    }

    /// The multiplicative monoid.
    #[inline]
    pub fn multiplicative(&self) -> Monoid<MulOp, T> {
        self.multiplicative
    }

    /// The additive identity ("zero").
    #[inline]
    pub fn zero(&self) -> T {
        self.additive.identity()
    }

    /// The multiplicative identity ("one").
    #[inline]
    pub fn one(&self) -> T {
        self.multiplicative.identity()
    }
}

impl<T: Element> Semiring<Plus, Times, T> {
    /// The arithmetic (+, ×) semiring.
    pub fn plus_times() -> Self {
        Semiring::new(Monoid::plus(), Monoid::times())
    }
}

impl<T: Element> Semiring<Min, Plus, T> {
    /// The tropical (min, +) semiring: shortest paths.
    pub fn min_plus() -> Self {
        Semiring::new(Monoid::min(), Monoid::plus())
    }
}

impl<T: Element> Semiring<Max, Plus, T> {
    /// The (max, +) semiring: longest paths, scheduling.
    pub fn max_plus() -> Self {
        Semiring::new(Monoid::max(), Monoid::plus())
    }
}

impl<T: Element> Semiring<Max, Min, T> {
    /// The (max, min) semiring: bottleneck capacity.
    pub fn max_min() -> Self {
        Semiring::new(Monoid::max(), Monoid::new(Min, T::from_f64(f64::INFINITY)))
    }
}

impl<T: Element> Semiring<LogicalOr, LogicalAnd, T> {
    /// The boolean (∨, ∧) semiring: reachability, transitive closure.
    pub fn or_and() -> Self {
        Semiring::new(Monoid::lor(), Monoid::land())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_times_identities() {
        let ring = Semiring::<Plus, Times, f64>::plus_times();
        assert_eq!(ring.zero(), 0.0);
        assert_eq!(ring.one(), 1.0);
    }

    #[test]
    fn min_plus_identities() {
        let ring = Semiring::<Min, Plus, f64>::min_plus();
        assert_eq!(ring.zero(), f64::INFINITY);
        assert_eq!(ring.one(), 0.0);
    }

    #[test]
    fn path_semiring_identities() {
        let ring = Semiring::<Max, Plus, f64>::max_plus();
        assert_eq!(ring.zero(), f64::NEG_INFINITY);
        assert_eq!(ring.one(), 0.0);

        let ring = Semiring::<Max, Min, f64>::max_min();
        assert_eq!(ring.zero(), f64::NEG_INFINITY);
        assert_eq!(ring.one(), f64::INFINITY);
    }

    #[test]
    fn boolean_semiring() {
        let ring = Semiring::<LogicalOr, LogicalAnd, u8>::or_and();
        assert_eq!(ring.zero(), 0);
        assert_eq!(ring.one(), 1);
        let mut acc = ring.zero();
        ring.additive().foldl(&mut acc, &7);
        assert_eq!(acc, 1);
    }
}
