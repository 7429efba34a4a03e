//! Error types for sparr primitives.

use thiserror::Error;

/// Result type alias using sparr's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that a sparr primitive can return.
///
/// Primitives never partially mutate their outputs: either the call succeeds
/// and the output reflects the full result, or the first failing check
/// short-circuits before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operand dimensions are incompatible.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    Mismatch {
        /// Size the primitive required
        expected: usize,
        /// Size the operand actually had
        got: usize,
    },

    /// A descriptor claimed a precondition that did not hold, or a
    /// construction argument is inconsistent.
    #[error("Illegal argument: {0}")]
    Illegal(&'static str),

    /// Output aliases an input without the `SAFE_OVERLAP` descriptor.
    #[error("Output vector overlaps with an input or mask vector")]
    Overlap,

    /// Allocation of values, coordinates, or scratch storage failed.
    ///
    /// The reference backend allocates through the global allocator, which
    /// aborts rather than reporting failure, so this variant is reserved
    /// for backends with fallible allocation.
    #[error("Out of memory")]
    OutOfMemory,

    /// An internal invariant was violated. Callers should treat this as
    /// fatal; it indicates a bug in sparr itself.
    #[error("Internal invariant violated: {0}")]
    Panic(&'static str),
}
