//! Fixed-Point 2D Vector
//!
//! Deterministic 2D vector operations for board geometry.
//! Distances between board points are computed in Q32.32 so that
//! pixel-scale coordinates never overflow.

use std::fmt;
use std::ops::{Add, Sub};
use serde::{Serialize, Deserialize};

use super::fixed::{Fixed, FIXED_SCALE, fixed_mul, sqrt_wide, to_float};

/// 2D vector with fixed-point components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// X component (Q16.16 fixed-point)
    pub x: Fixed,
    /// Y component (Q16.16 fixed-point)
    pub y: Fixed,
}

impl FixedVec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create a new vector from fixed-point components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer pixel components.
    #[inline]
    pub const fn from_ints(x: i32, y: i32) -> Self {
        Self {
            x: x << FIXED_SCALE,
            y: y << FIXED_SCALE,
        }
    }

    /// Add another vector.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
        }
    }

    /// Subtract another vector.
    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(other.x),
            y: self.y.wrapping_sub(other.y),
        }
    }

    /// Scale by a fixed-point scalar.
    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    /// Squared distance to another point, in Q32.32.
    #[inline]
    pub fn distance_squared_wide(self, other: Self) -> i64 {
        let dx = other.x as i64 - self.x as i64;
        let dy = other.y as i64 - self.y as i64;
        dx * dx + dy * dy
    }

    /// Distance to another point (floored, Q16.16).
    #[inline]
    pub fn distance(self, other: Self) -> Fixed {
        sqrt_wide(self.distance_squared_wide(other))
    }

    /// True if `other` lies within `radius` of this point (inclusive).
    #[inline]
    pub fn within(self, other: Self, radius: Fixed) -> bool {
        let r = radius as i64;
        self.distance_squared_wide(other) <= r * r
    }

    /// Unit direction from this point towards `target`.
    ///
    /// Returns the zero vector when both points coincide.
    pub fn direction_to(self, target: Self) -> Self {
        let len = self.distance(target) as i64;
        if len == 0 {
            return Self::ZERO;
        }
        let dx = target.x as i64 - self.x as i64;
        let dy = target.y as i64 - self.y as i64;
        Self {
            x: ((dx << FIXED_SCALE) / len) as Fixed,
            y: ((dy << FIXED_SCALE) / len) as Fixed,
        }
    }

    /// Convert to floats for rendering and history documents.
    #[inline]
    pub fn to_floats(self) -> (f32, f32) {
        (to_float(self.x), to_float(self.y))
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        FixedVec2::add(self, rhs)
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        FixedVec2::sub(self, rhs)
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "Vec2({:.2}, {:.2})", x, y)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{from_int, to_fixed, FIXED_ONE};

    #[test]
    fn test_vec2_add_sub() {
        let a = FixedVec2::from_ints(3, 4);
        let b = FixedVec2::from_ints(1, 2);
        assert_eq!(a + b, FixedVec2::from_ints(4, 6));
        assert_eq!(a - b, FixedVec2::from_ints(2, 2));
    }

    #[test]
    fn test_vec2_scale() {
        let v = FixedVec2::from_ints(2, -4);
        assert_eq!(v.scale(to_fixed(0.5)), FixedVec2::from_ints(1, -2));
    }

    #[test]
    fn test_distance_across_board() {
        let a = FixedVec2::from_ints(0, 0);
        let b = FixedVec2::from_ints(800, 600);
        assert_eq!(a.distance(b), from_int(1000));

        let c = FixedVec2::from_ints(100, 300);
        let d = FixedVec2::from_ints(160, 300);
        assert_eq!(c.distance(d), from_int(60));
    }

    #[test]
    fn test_within_inclusive() {
        let a = FixedVec2::from_ints(100, 100);
        assert!(a.within(FixedVec2::from_ints(130, 100), from_int(30)));
        assert!(!a.within(FixedVec2::from_ints(131, 100), from_int(30)));
    }

    #[test]
    fn test_direction_is_unit() {
        let a = FixedVec2::from_ints(0, 0);
        let dir = a.direction_to(FixedVec2::from_ints(300, 400));
        assert_eq!(dir, FixedVec2::new(to_fixed(0.6), to_fixed(0.8)));

        let axis = a.direction_to(FixedVec2::from_ints(0, -50));
        assert_eq!(axis, FixedVec2::new(0, -FIXED_ONE));

        assert_eq!(a.direction_to(a), FixedVec2::ZERO);
    }

    #[test]
    fn test_vec2_determinism() {
        let a = FixedVec2::from_ints(123, 456);
        let b = FixedVec2::from_ints(789, 12);
        for _ in 0..100 {
            assert_eq!(a.direction_to(b), a.direction_to(b));
            assert_eq!(a.distance(b), a.distance(b));
        }
    }
}
