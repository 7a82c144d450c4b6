//! Utility functions
//!
//! Functions not large enough to warrant their own crate or module, but flexible enough to be used
//! in multiple disjunct places in the library. May also contain backports, workarounds.

/// Calculates the maximum number of faulty nodes that can be tolerated in a cabinet of `n` nodes.
///
/// For every `n > 0` this is the largest `t` with `3 t < n`, i.e. `n / 3 - 1` if `n` is a
/// multiple of three and `n / 3` otherwise.
#[inline]
pub fn max_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}
