//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, PrimInt, Signed};

/// Clamp a value into the inclusive range `[min, max]`.
///
/// NaN passes through unchanged.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Round to the nearest integer, ties going to the even neighbour.
///
/// Values outside the range of `i64` saturate, NaN becomes zero.
pub fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Bring a cyclic integer value back into `[-half_range, half_range]` by
/// adding or subtracting one full range.
///
/// Only a single correction is applied, values more than one full range out
/// are left partially wrapped.
pub fn wrap_once<T>(value: T, half_range: T) -> T
where
    T: PrimInt + Signed,
{
    let full_range = half_range + half_range;

    if value < -half_range {
        value + full_range
    } else if value > half_range {
        value - full_range
    } else {
        value
    }
}
