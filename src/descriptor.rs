//! Descriptors select kernel specialisations or declare operand
//! preconditions, and the execution phase distinguishes planning from work.

use bitflags::bitflags;

bitflags! {
    /// Bitmask of flags that parameterise a primitive call.
    ///
    /// Each bit is either a *hint* (the kernel may pick a faster path, and
    /// degrades gracefully when the hint is useless) or an *assertion* (the
    /// caller claims a precondition; a violated assertion yields
    /// [`Error::Illegal`](crate::error::Error::Illegal)).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Descriptor: u32 {
        /// Swap the roles of rows and columns of the matrix operand.
        const TRANSPOSE_MATRIX = 1 << 0;
        /// Invert the mask predicate.
        const INVERT_MASK = 1 << 1;
        /// Interpret mask membership (not the stored value) as the predicate.
        const STRUCTURAL = 1 << 2;
        /// Assertion: every vector operand is fully populated.
        const DENSE = 1 << 3;
        /// Treat the matrix as A + I on the fly: each diagonal position
        /// contributes the input value unchanged, as if multiplied by the
        /// multiplicative identity.
        const ADD_IDENTITY = 1 << 4;
        /// Replace each input value by its index.
        const USE_INDEX = 1 << 5;
        /// Ensure output positions receive an explicit additive identity
        /// even if no contribution arrives.
        const EXPLICIT_ZERO = 1 << 6;
        /// Caller vouches that aliased output/input containers are safe.
        const SAFE_OVERLAP = 1 << 7;
        /// Assertion: no cross-domain casts occur. Trait bounds on the
        /// operator domains already make a mismatch unrepresentable, so
        /// this bit is accepted and vacuously satisfied.
        const NO_CASTING = 1 << 8;
        /// Disable column-major dispatch; the row-major kernel always wins.
        const FORCE_ROW_MAJOR = 1 << 9;
    }
}

impl Descriptor {
    /// Whether a present `value` at a mask position passes this
    /// descriptor's mask interpretation. Positions absent from the mask
    /// never pass before inversion.
    #[inline]
    pub fn mask_passes(self, present: bool, value_nonzero: bool) -> bool {
        let raw = present && (self.contains(Descriptor::STRUCTURAL) || value_nonzero);
        if self.contains(Descriptor::INVERT_MASK) {
            !raw
        } else {
            raw
        }
    }
}

/// Execution phase of a primitive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Plan only; return immediately without producing results. The
    /// reference kernels never reallocate mid-operation, so this is a no-op
    /// that exists for API parity with backends that do.
    Resize,
    /// Perform the computation.
    #[default]
    Execute,
}
