//! Closed value ranges over `f64` with infinite endpoints.

use std::fmt;

/// Absolute tolerance used when comparing evaluated values.
pub const TOLERANCE: f64 = 1e-9;

/// Numeric precision used to open a transition band next to a breakpoint.
pub const DECIMAL_PRECISION: f64 = 1e-7;

/// True when `value` is zero within [`TOLERANCE`].
#[must_use]
pub fn is_zero(value: f64) -> bool {
    value.abs() <= TOLERANCE
}

/// True when `value` is finite and integral within [`TOLERANCE`].
#[must_use]
pub fn is_integer(value: f64) -> bool {
    value.is_finite() && (value - value.round()).abs() <= TOLERANCE
}

/// A closed interval `[lower, upper]`; either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    lower: f64,
    upper: f64,
}

impl ValueRange {
    /// The degenerate range `[0, 0]`.
    pub const ZERO: ValueRange = ValueRange {
        lower: 0.0,
        upper: 0.0,
    };

    /// `[0, 1]`.
    pub const UNIT: ValueRange = ValueRange {
        lower: 0.0,
        upper: 1.0,
    };

    /// `[0, ∞)`.
    pub const NON_NEGATIVE: ValueRange = ValueRange {
        lower: 0.0,
        upper: f64::INFINITY,
    };

    /// `(-∞, ∞)`.
    pub const UNBOUNDED: ValueRange = ValueRange {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    /// Create a range, or `None` when `lower > upper` or either end is NaN.
    #[must_use]
    pub fn new(lower: f64, upper: f64) -> Option<Self> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return None;
        }
        Some(Self { lower, upper })
    }

    /// Create a range from two endpoints in either order.
    ///
    /// NaN endpoints widen to the unbounded side.
    #[must_use]
    pub fn spanning(a: f64, b: f64) -> Self {
        let a_lo = if a.is_nan() { f64::NEG_INFINITY } else { a };
        let b_lo = if b.is_nan() { f64::NEG_INFINITY } else { b };
        let a_hi = if a.is_nan() { f64::INFINITY } else { a };
        let b_hi = if b.is_nan() { f64::INFINITY } else { b };
        Self {
            lower: a_lo.min(b_lo),
            upper: a_hi.max(b_hi),
        }
    }

    /// The single-point range `[value, value]`.
    #[must_use]
    pub const fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    #[must_use]
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    #[must_use]
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// True when both ends are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }

    /// The value when the range is a single point.
    #[must_use]
    pub fn fixed_value(&self) -> Option<f64> {
        if (self.upper - self.lower).abs() <= TOLERANCE && self.lower.is_finite() {
            Some(self.lower)
        } else {
            None
        }
    }

    /// Membership test with [`TOLERANCE`] slack on both ends.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower - TOLERANCE && value <= self.upper + TOLERANCE
    }

    /// True when `self` lies inside `outer`.
    #[must_use]
    pub fn within(&self, outer: &ValueRange) -> bool {
        self.lower >= outer.lower - TOLERANCE && self.upper <= outer.upper + TOLERANCE
    }

    /// `max(|lower|, |upper|)`.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.lower.abs().max(self.upper.abs())
    }

    /// `upper - lower`.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// True when zero is a possible value.
    #[must_use]
    pub fn contains_zero(&self) -> bool {
        self.contains(0.0)
    }

    /// True when the lower end is exactly zero (within tolerance).
    #[must_use]
    pub fn lower_is_zero(&self) -> bool {
        is_zero(self.lower)
    }

    /// True when the upper end is exactly zero (within tolerance).
    #[must_use]
    pub fn upper_is_zero(&self) -> bool {
        is_zero(self.upper)
    }

    /// Range of `coefficient * v` for `v` in `self`.
    #[must_use]
    pub fn scale(&self, coefficient: f64) -> Self {
        if coefficient == 0.0 {
            return Self::ZERO;
        }
        Self::spanning(coefficient * self.lower, coefficient * self.upper)
    }

    /// Range of `a + b` for `a` in `self` and `b` in `other`.
    #[must_use]
    pub fn add(&self, other: &ValueRange) -> Self {
        Self::spanning(self.lower + other.lower, self.upper + other.upper)
    }

    /// Range of `v + offset`.
    #[must_use]
    pub fn shift(&self, offset: f64) -> Self {
        Self::spanning(self.lower + offset, self.upper + offset)
    }

    /// Smallest range containing both.
    #[must_use]
    pub fn union(&self, other: &ValueRange) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Overlap of both ranges, or `None` when disjoint.
    #[must_use]
    pub fn intersect(&self, other: &ValueRange) -> Option<Self> {
        Self::new(self.lower.max(other.lower), self.upper.min(other.upper))
    }

    /// Round the ends inward to integers.
    #[must_use]
    pub fn integral(&self) -> Self {
        let lower = if self.lower.is_finite() {
            (self.lower - TOLERANCE).ceil()
        } else {
            self.lower
        };
        let upper = if self.upper.is_finite() {
            (self.upper + TOLERANCE).floor()
        } else {
            self.upper
        };
        Self::new(lower, upper).unwrap_or(*self)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted() {
        assert!(ValueRange::new(2.0, 1.0).is_none());
        assert!(ValueRange::new(f64::NAN, 1.0).is_none());
        assert!(ValueRange::new(1.0, 1.0).is_some());
    }

    #[test]
    fn test_scale_negative_swaps_ends() {
        let range = ValueRange::new(-3.0, 5.0).unwrap();
        assert_eq!(range.scale(-2.0), ValueRange::new(-10.0, 6.0).unwrap());
    }

    #[test]
    fn test_scale_by_zero_of_unbounded_is_zero() {
        assert_eq!(ValueRange::UNBOUNDED.scale(0.0), ValueRange::ZERO);
    }

    #[test]
    fn test_add_with_infinity() {
        let sum = ValueRange::NON_NEGATIVE.add(&ValueRange::point(-1.0));
        assert_eq!(sum.lower(), -1.0);
        assert_eq!(sum.upper(), f64::INFINITY);
    }

    #[test]
    fn test_integral_rounds_inward() {
        let range = ValueRange::new(0.5, 3.7).unwrap().integral();
        assert_eq!(range, ValueRange::new(1.0, 3.0).unwrap());
    }

    #[test]
    fn test_fixed_value() {
        assert_eq!(ValueRange::point(4.0).fixed_value(), Some(4.0));
        assert_eq!(ValueRange::UNIT.fixed_value(), None);
    }

    #[test]
    fn test_integer_helpers() {
        assert!(is_integer(3.0));
        assert!(!is_integer(3.5));
        assert!(!is_integer(f64::INFINITY));
        assert!(is_zero(1e-12));
    }
}
