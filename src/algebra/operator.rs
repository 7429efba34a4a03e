//! Binary operators over explicit domain triples.

use crate::element::Element;

/// A pure binary operator `D1 × D2 → D3`.
///
/// Operators are `Copy` zero-sized markers; kernels monomorphise over them.
/// `BLOCKSIZE` advertises a preferred unroll width for dense inner loops.
/// The slice-level fold helper is the bulk fast path; the default just
/// loops over `apply`, and an operator may override it.
pub trait BinaryOperator<D1, D2, D3>: Copy + Send + Sync + 'static {
    /// Preferred unroll width for vectorised inner loops.
    const BLOCKSIZE: usize = 8;

    /// Evaluate the operator. Cannot fail.
    fn apply(&self, a: &D1, b: &D2) -> D3;

    /// Bulk left fold: `acc[i] = op(acc[i], x[i])` for all `i`.
    ///
    /// Only available when the accumulator domain matches `D1` and `D3`.
    #[inline]
    fn ewise_foldl_slice(&self, acc: &mut [D3], x: &[D2])
    where
        Self: BinaryOperator<D3, D2, D3>,
    {
        debug_assert_eq!(acc.len(), x.len());
        for (a, b) in acc.iter_mut().zip(x.iter()) {
            *a = BinaryOperator::<D3, D2, D3>::apply(self, a, b);
        }
    }

}

macro_rules! declare_operator {
    ($(#[$doc:meta])* $name:ident, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
        pub struct $name;

        impl<T: Element> BinaryOperator<T, T, T> for $name {
            #[inline]
            fn apply(&self, $a: &T, $b: &T) -> T {
                $body
            }
        }
    };
}

declare_operator!(
    /// Numerical addition.
    Plus,
    |a, b| *a + *b
);

declare_operator!(
    /// Numerical subtraction.
    Minus,
    |a, b| *a - *b
);

declare_operator!(
    /// Numerical multiplication.
    Times,
    |a, b| *a * *b
);

declare_operator!(
    /// Numerical division.
    Divide,
    |a, b| *a / *b
);

declare_operator!(
    /// Minimum. NaN-oblivious: comparison failure picks the left operand.
    Min,
    |a, b| if *b < *a { *b } else { *a }
);

declare_operator!(
    /// Maximum. NaN-oblivious: comparison failure picks the left operand.
    Max,
    |a, b| if *b > *a { *b } else { *a }
);

declare_operator!(
    /// Logical OR on the nonzero interpretation of the operands.
    LogicalOr,
    |a, b| if a.is_nonzero() || b.is_nonzero() {
        T::one()
    } else {
        T::zero()
    }
);

declare_operator!(
    /// Logical AND on the nonzero interpretation of the operands.
    LogicalAnd,
    |a, b| if a.is_nonzero() && b.is_nonzero() {
        T::one()
    } else {
        T::zero()
    }
);

/// Projects its left operand: `op(a, b) = a`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Left;

impl<D1: Element, D2: Element> BinaryOperator<D1, D2, D1> for Left {
    #[inline]
    fn apply(&self, a: &D1, _b: &D2) -> D1 {
        *a
    }
}

/// Projects its right operand: `op(a, b) = b`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Right;

impl<D1: Element, D2: Element> BinaryOperator<D1, D2, D2> for Right {
    #[inline]
    fn apply(&self, _a: &D1, b: &D2) -> D2 {
        *b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_application() {
        assert_eq!(Plus.apply(&3.0f64, &4.0), 7.0);
        assert_eq!(Times.apply(&3i64, &4), 12);
        assert_eq!(Min.apply(&3.0f32, &-1.0), -1.0);
        assert_eq!(Max.apply(&3u32, &7), 7);
        assert_eq!(Divide.apply(&9.0f64, &2.0), 4.5);
        assert_eq!(
            BinaryOperator::<f64, u8, f64>::apply(&Left, &2.5f64, &1u8),
            2.5
        );
        assert_eq!(
            BinaryOperator::<u8, f64, f64>::apply(&Right, &1u8, &2.5f64),
            2.5
        );
        assert_eq!(LogicalOr.apply(&0u8, &5u8), 1);
        assert_eq!(LogicalAnd.apply(&0u8, &5u8), 0);
    }

    #[test]
    fn bulk_foldl() {
        let mut acc = [1.0f64, 2.0, 3.0];
        Plus.ewise_foldl_slice(&mut acc, &[10.0, 20.0, 30.0]);
        assert_eq!(acc, [11.0, 22.0, 33.0]);
    }
}
