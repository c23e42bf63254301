//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the cell simulation. Board coordinates,
//! ball speeds and radii are all stored as `Fixed`; no floats are used in
//! gameplay logic.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 px                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The board is 800x600 pixels, so a squared distance between two points
//! (up to 1 000 000 px²) does not fit in Q16.16. Squared distances are
//! therefore kept in Q32.32 `i64` and square roots are taken with an exact
//! integer square root (`isqrt_u64`).

use std::fmt;

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

// =============================================================================
// CONVERSIONS
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// # Warning
/// Only use at compile-time or initialization. NEVER in tick loop.
///
/// # Example
/// ```
/// use war_of_cells::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert an integer pixel value to fixed-point.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i << FIXED_SCALE
}

/// Integer part of a fixed-point value (floor).
#[inline]
pub const fn to_int(f: Fixed) -> i32 {
    f >> FIXED_SCALE
}

/// Convert fixed-point to float for display and serialization.
///
/// # Warning
/// Only use for visual output. NEVER use result in game logic.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Multiply two fixed-point numbers.
///
/// Uses an i64 intermediate to prevent overflow, then truncates.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Exact integer square root: the largest `r` with `r * r <= n`.
///
/// Newton iteration from an initial guess that is always above the root,
/// so the sequence decreases monotonically to the floor root.
pub fn isqrt_u64(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let bits = 64 - n.leading_zeros();
    let mut x = 1u64 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Square root of a Q32.32 value, returned as Q16.16 (floored).
///
/// Used for pixel distances that overflow Q16.16 when squared.
#[inline]
pub fn sqrt_wide(q32: i64) -> Fixed {
    if q32 <= 0 {
        return 0;
    }
    isqrt_u64(q32 as u64).min(i32::MAX as u64) as Fixed
}

/// Ergonomic wrapper used for `Debug` output of fixed values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedNum(pub Fixed);

impl fmt::Debug for FixedNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({:.4})", to_float(self.0))
    }
}

impl fmt::Display for FixedNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", to_float(self.0))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(from_int(30), 30 * FIXED_ONE);
        assert_eq!(to_int(from_int(-7)), -7);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(0.5), FIXED_HALF);
        assert_eq!(to_fixed(-1.0), -FIXED_ONE);
    }

    #[test]
    fn test_fixed_mul() {
        assert_eq!(fixed_mul(to_fixed(2.0), to_fixed(3.0)), to_fixed(6.0));
        assert_eq!(fixed_mul(FIXED_HALF, FIXED_HALF), to_fixed(0.25));
        assert_eq!(fixed_mul(from_int(-4), FIXED_HALF), from_int(-2));
    }

    #[test]
    fn test_isqrt_exact() {
        assert_eq!(isqrt_u64(0), 0);
        assert_eq!(isqrt_u64(1), 1);
        assert_eq!(isqrt_u64(3), 1);
        assert_eq!(isqrt_u64(4), 2);
        assert_eq!(isqrt_u64(99), 9);
        assert_eq!(isqrt_u64(100), 10);
        assert_eq!(isqrt_u64(u64::MAX), u32::MAX as u64);

        for n in 0..10_000u64 {
            let r = isqrt_u64(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({n}) = {r}");
        }
    }

    #[test]
    fn test_sqrt_wide_pixels() {
        // 600 px squared in Q32.32
        let d2 = (600i64 * 600) << 32;
        assert_eq!(sqrt_wide(d2), from_int(600));
        assert_eq!(sqrt_wide(-5), 0);
    }

    #[test]
    fn test_fixednum_debug() {
        assert_eq!(format!("{}", FixedNum(FIXED_HALF)), "0.5000");
    }
}
