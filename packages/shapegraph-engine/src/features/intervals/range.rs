//! Closed integer intervals with saturating sentinel arithmetic.
//!
//! A bound equal to [`INT_MIN`] / [`INT_MAX`] means "unbounded" on that
//! side. Arithmetic never computes through a sentinel: an unbounded operand
//! keeps the result unbounded, and finite results that would stray into the
//! reserved red zone near the machine extremes widen to the sentinel
//! instead. A non-sentinel bound observed inside the red zone therefore
//! indicates corrupted arithmetic upstream and traps in debug builds.

use std::fmt;
use std::ops::{AddAssign, MulAssign};

use serde::{Deserialize, Serialize};

/// Lower sentinel: unbounded below.
pub const INT_MIN: i64 = i64::MIN;
/// Upper sentinel: unbounded above.
pub const INT_MAX: i64 = i64::MAX;

/// Reserved zone next to each machine extreme (half the range on each side).
const RED_ZONE_LO: i64 = INT_MIN >> 1;
const RED_ZONE_HI: i64 = INT_MAX >> 1;

/// Closed interval `[lo, hi]` over `i64` with unbounded-side sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRange {
    pub lo: i64,
    pub hi: i64,
}

impl IntRange {
    /// The full range: unbounded on both sides.
    pub const FULL: IntRange = IntRange {
        lo: INT_MIN,
        hi: INT_MAX,
    };

    pub fn new(lo: i64, hi: i64) -> IntRange {
        let rng = IntRange { lo, hi };
        rng.chk();
        rng
    }

    /// Singular range holding exactly `n`.
    #[inline]
    pub fn num(n: i64) -> IntRange {
        IntRange::new(n, n)
    }

    /// Consistency trap: inverted interval, a bound pretending to be the
    /// opposite sentinel, or a non-sentinel bound inside the red zone.
    #[inline]
    pub(crate) fn chk(&self) {
        debug_assert!(self.lo <= self.hi, "inverted interval {self}");
        debug_assert!(self.lo != INT_MAX && self.hi != INT_MIN, "sentinel on the wrong side {self}");
        debug_assert!(
            self.lo == INT_MIN || self.lo > RED_ZONE_LO,
            "lower bound in the red zone {self}"
        );
        debug_assert!(
            self.hi == INT_MAX || self.hi < RED_ZONE_HI,
            "upper bound in the red zone {self}"
        );
    }

    #[inline]
    pub fn is_singular(&self) -> bool {
        self.lo == self.hi
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.lo == INT_MIN && self.hi == INT_MAX
    }

    /// Count of integers covered. Panics on an unbounded range.
    pub fn width(&self) -> u64 {
        assert!(
            self.lo != INT_MIN && self.hi != INT_MAX,
            "width of an unbounded range"
        );
        (self.hi as i128 - self.lo as i128 + 1) as u64
    }

    /// True iff `self` lies entirely within `big`.
    #[inline]
    pub fn covered_by(&self, big: &IntRange) -> bool {
        big.lo <= self.lo && self.hi <= big.hi
    }

    /// Smallest range covering both operands.
    pub fn join(a: IntRange, b: IntRange) -> IntRange {
        IntRange {
            lo: a.lo.min(b.lo),
            hi: a.hi.max(b.hi),
        }
    }
}

/// Sum of two lower bounds; a sentinel stays, red-zone results widen.
fn add_lo(a: i64, b: i64) -> i64 {
    if a == INT_MIN || b == INT_MIN {
        return INT_MIN;
    }
    clamp_lo(a as i128 + b as i128)
}

/// Sum of two upper bounds; a sentinel stays, red-zone results widen.
fn add_hi(a: i64, b: i64) -> i64 {
    if a == INT_MAX || b == INT_MAX {
        return INT_MAX;
    }
    clamp_hi(a as i128 + b as i128)
}

#[inline]
fn clamp_lo(x: i128) -> i64 {
    if x <= RED_ZONE_LO as i128 {
        INT_MIN
    } else {
        x as i64
    }
}

#[inline]
fn clamp_hi(x: i128) -> i64 {
    if x >= RED_ZONE_HI as i128 {
        INT_MAX
    } else {
        x as i64
    }
}

impl AddAssign for IntRange {
    fn add_assign(&mut self, rhs: IntRange) {
        self.lo = add_lo(self.lo, rhs.lo);
        self.hi = add_hi(self.hi, rhs.hi);
        self.chk();
    }
}

impl AddAssign<i64> for IntRange {
    fn add_assign(&mut self, rhs: i64) {
        *self += IntRange::num(rhs);
    }
}

impl MulAssign for IntRange {
    fn mul_assign(&mut self, rhs: IntRange) {
        // sentinel-as-infinity products over i128; the interval product is
        // the min/max over the four bound combinations
        const INF_P: i128 = i128::MAX;
        const INF_N: i128 = i128::MIN;

        fn lift(b: i64) -> i128 {
            match b {
                INT_MIN => INF_N,
                INT_MAX => INF_P,
                finite => finite as i128,
            }
        }

        fn mul_bound(a: i128, b: i128) -> i128 {
            if a == 0 || b == 0 {
                return 0;
            }
            if a == INF_P || a == INF_N || b == INF_P || b == INF_N {
                return if (a < 0) != (b < 0) { INF_N } else { INF_P };
            }
            a * b
        }

        let combos = [
            mul_bound(lift(self.lo), lift(rhs.lo)),
            mul_bound(lift(self.lo), lift(rhs.hi)),
            mul_bound(lift(self.hi), lift(rhs.lo)),
            mul_bound(lift(self.hi), lift(rhs.hi)),
        ];
        let lo = combos.iter().copied().min().unwrap_or(0);
        let hi = combos.iter().copied().max().unwrap_or(0);
        self.lo = if lo == INF_N { INT_MIN } else { clamp_lo(lo) };
        self.hi = if hi == INF_P { INT_MAX } else { clamp_hi(hi) };
        self.chk();
    }
}

impl MulAssign<i64> for IntRange {
    fn mul_assign(&mut self, rhs: i64) {
        *self *= IntRange::num(rhs);
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lo {
            INT_MIN => f.write_str("[-inf, ")?,
            lo => write!(f, "[{lo}, ")?,
        }
        match self.hi {
            INT_MAX => f.write_str("inf]"),
            hi => write!(f, "{hi}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_shift_is_identity() {
        let mut r = IntRange::new(-4, 17);
        r += IntRange::num(0);
        assert_eq!(r, IntRange::new(-4, 17));
    }

    #[test]
    fn width_counts_inclusively() {
        assert_eq!(IntRange::new(3, 7).width(), 5);
        assert_eq!(IntRange::num(0).width(), 1);
    }

    #[test]
    #[should_panic(expected = "unbounded")]
    fn width_rejects_full_range() {
        let _ = IntRange::FULL.width();
    }

    #[test]
    fn lower_sentinel_is_sticky() {
        let mut r = IntRange {
            lo: INT_MIN,
            hi: 10,
        };
        r += IntRange::new(5, 6);
        assert_eq!(r.lo, INT_MIN);
        assert_eq!(r.hi, 16);
    }

    #[test]
    fn join_takes_the_hull() {
        let j = IntRange::join(IntRange::new(-3, 5), IntRange::new(2, 9));
        assert_eq!(j, IntRange::new(-3, 9));
        assert!(IntRange::new(-3, 5).covered_by(&j));
        assert!(IntRange::new(2, 9).covered_by(&j));
    }

    #[test]
    fn singular_and_coverage() {
        assert!(IntRange::num(5).is_singular());
        assert!(!IntRange::new(1, 2).is_singular());
        assert!(IntRange::num(5).covered_by(&IntRange::new(0, 9)));
        assert!(!IntRange::new(0, 10).covered_by(&IntRange::new(0, 9)));
    }

    #[test]
    fn multiply_scales_both_bounds() {
        let mut r = IntRange::new(-2, 3);
        r *= 4i64;
        assert_eq!(r, IntRange::new(-8, 12));

        let mut neg = IntRange::new(2, 5);
        neg *= -1i64;
        assert_eq!(neg, IntRange::new(-5, -2));
    }

    #[test]
    fn multiply_keeps_sentinels() {
        let mut r = IntRange {
            lo: 1,
            hi: INT_MAX,
        };
        r *= 2i64;
        assert_eq!(r.hi, INT_MAX);
        assert_eq!(r.lo, 2);
    }

    proptest! {
        #[test]
        fn join_covers_both_operands(
            a_lo in -1000i64..1000, a_w in 0i64..100,
            b_lo in -1000i64..1000, b_w in 0i64..100,
        ) {
            let a = IntRange::new(a_lo, a_lo + a_w);
            let b = IntRange::new(b_lo, b_lo + b_w);
            let j = IntRange::join(a, b);
            prop_assert!(a.covered_by(&j));
            prop_assert!(b.covered_by(&j));
        }

        #[test]
        fn shifted_range_keeps_width(
            lo in -1000i64..1000, w in 0i64..100, shift in -500i64..500,
        ) {
            let mut r = IntRange::new(lo, lo + w);
            let width = r.width();
            r += shift;
            prop_assert_eq!(r.width(), width);
        }
    }
}
