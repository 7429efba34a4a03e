//! Element trait for scalar types stored in sparr containers.

use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be elements of a vector or matrix.
///
/// All kernels are monomorphic over an `Element`; there is no runtime dtype
/// dispatch. The `to_f64`/`from_f64` pair exists for generic identity
/// construction (e.g. `T::from_f64(f64::INFINITY)` for a min-monoid) and for
/// mask interpretation, where any stored value other than zero counts as
/// `true`.
///
/// # Bounds
/// - `Pod + Zeroable` — value buffers are allocated zero-initialised
/// - `Add + Sub + Mul + Div` — arithmetic with `Output = Self`
/// - `PartialOrd` — min/max operators
///
/// `Neg` is deliberately not required: unsigned types do not support it.
pub trait Element:
    Copy
    + Clone
    + Debug
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + PartialOrd
{
    /// Convert to f64 for generic numeric operations.
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type.
    ///
    /// For integer types this is a saturating `as` cast, so
    /// `from_f64(f64::INFINITY)` yields the type's maximum — exactly what a
    /// min-monoid identity needs.
    fn from_f64(v: f64) -> Self;

    /// Additive identity.
    fn zero() -> Self;

    /// Multiplicative identity.
    fn one() -> Self;

    /// Whether the stored value counts as set under valued mask semantics.
    #[inline]
    fn is_nonzero(self) -> bool {
        self.to_f64() != 0.0
    }
}

macro_rules! impl_element {
    ($($t:ty => $zero:expr, $one:expr);* $(;)?) => {
        $(
            impl Element for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as $t
                }

                #[inline]
                fn zero() -> Self {
                    $zero
                }

                #[inline]
                fn one() -> Self {
                    $one
                }
            }
        )*
    };
}

impl_element! {
    f64 => 0.0, 1.0;
    f32 => 0.0, 1.0;
    i32 => 0, 1;
    i64 => 0, 1;
    u8 => 0, 1;
    u32 => 0, 1;
    u64 => 0, 1;
    usize => 0, 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_identity_casts() {
        assert_eq!(i64::from_f64(f64::INFINITY), i64::MAX);
        assert_eq!(i32::from_f64(f64::NEG_INFINITY), i32::MIN);
        assert_eq!(u32::from_f64(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn nonzero_interpretation() {
        assert!(1.5f64.is_nonzero());
        assert!(!0.0f32.is_nonzero());
        assert!(7u8.is_nonzero());
    }
}
