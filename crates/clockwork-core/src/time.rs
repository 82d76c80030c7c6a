//! The epsilon time grid: [`TimeInstant`], [`TimeSpan`] and [`Epsilon`].
//!
//! All simulated time is an integer count of epsilons, the finest unit
//! the run resolves. Instants are absolute and signed (a run may start
//! at a negative epoch); spans are relative and never negative.

use std::fmt;
use std::ops::Add;

use crate::error::TimeError;

// ── Epsilon ─────────────────────────────────────────────────────────

/// Resolution of the time grid.
///
/// Chosen once per run. Only conversions from real-valued model time
/// depend on it; the kernel itself compares raw epsilon counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Epsilon {
    /// One epsilon is a nanosecond.
    Nanoseconds,
    /// One epsilon is a microsecond.
    #[default]
    Microseconds,
    /// One epsilon is a millisecond.
    Milliseconds,
    /// One epsilon is a second.
    Seconds,
}

impl Epsilon {
    /// Number of epsilons in one second.
    pub fn per_second(self) -> i64 {
        match self {
            Self::Nanoseconds => 1_000_000_000,
            Self::Microseconds => 1_000_000,
            Self::Milliseconds => 1_000,
            Self::Seconds => 1,
        }
    }

    /// Short unit suffix, used in diagnostics.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }
}

// ── TimeInstant ─────────────────────────────────────────────────────

/// An absolute point in simulated time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeInstant(i64);

impl TimeInstant {
    /// The conventional start of a run.
    pub const ZERO: TimeInstant = TimeInstant(0);

    /// The latest representable instant.
    pub const MAX: TimeInstant = TimeInstant(i64::MAX);

    /// Create an instant from a raw epsilon count.
    #[inline]
    pub const fn from_epsilons(epsilons: i64) -> Self {
        Self(epsilons)
    }

    /// Raw epsilon count.
    #[inline]
    pub const fn epsilons(self) -> i64 {
        self.0
    }

    /// `self + span`, or an overflow error.
    pub fn checked_add(self, span: TimeSpan) -> Result<TimeInstant, TimeError> {
        self.0
            .checked_add(span.0)
            .map(TimeInstant)
            .ok_or(TimeError::Overflow)
    }

    /// Span from `earlier` to `self`. `None` if `earlier` is after `self`.
    pub fn span_since(self, earlier: TimeInstant) -> Option<TimeSpan> {
        self.0
            .checked_sub(earlier.0)
            .filter(|d| *d >= 0)
            .map(TimeSpan)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: TimeInstant) -> bool {
        self.0 < other.0
    }

    /// Truncated bucket key for a grid of `width` epsilons.
    ///
    /// Uses floor division so instants before zero still land in
    /// buckets that sort before the zero bucket.
    #[inline]
    pub fn bucket(self, width: TimeSpan) -> i64 {
        self.0.div_euclid(width.0.max(1))
    }
}

impl fmt::Display for TimeInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

// ── TimeSpan ────────────────────────────────────────────────────────

/// A non-negative relative duration in epsilons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSpan(i64);

impl TimeSpan {
    /// The empty span.
    pub const ZERO: TimeSpan = TimeSpan(0);

    /// Create a span, rejecting negative lengths.
    pub fn new(epsilons: i64) -> Result<Self, TimeError> {
        if epsilons < 0 {
            return Err(TimeError::NegativeSpan { epsilons });
        }
        Ok(Self(epsilons))
    }

    /// Convert a span in seconds to the grid, rounding to the nearest epsilon.
    pub fn from_secs_f64(secs: f64, epsilon: Epsilon) -> Result<Self, TimeError> {
        if !secs.is_finite() {
            return Err(TimeError::Overflow);
        }
        let raw = (secs * epsilon.per_second() as f64).round();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        if raw >= i64::MAX as f64 {
            return Err(TimeError::Overflow);
        }
        Self::new(raw as i64)
    }

    /// Raw epsilon count.
    #[inline]
    pub const fn epsilons(self) -> i64 {
        self.0
    }

    /// `self + other`, or an overflow error.
    pub fn checked_add(self, other: TimeSpan) -> Result<TimeSpan, TimeError> {
        self.0
            .checked_add(other.0)
            .map(TimeSpan)
            .ok_or(TimeError::Overflow)
    }

    /// Returns `true` for the empty span.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}eps", self.0)
    }
}

impl Add<TimeSpan> for TimeInstant {
    type Output = TimeInstant;

    /// Saturating at [`TimeInstant::MAX`]; use
    /// [`checked_add`](TimeInstant::checked_add) to observe overflow.
    fn add(self, rhs: TimeSpan) -> TimeInstant {
        TimeInstant(self.0.saturating_add(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instants_are_totally_ordered() {
        let a = TimeInstant::from_epsilons(-5);
        let b = TimeInstant::ZERO;
        let c = TimeInstant::from_epsilons(7);
        assert!(a < b && b < c);
        assert!(a.is_before(c));
        assert!(!c.is_before(c));
        assert_eq!(c, TimeInstant::from_epsilons(7));
    }

    #[test]
    fn negative_span_rejected() {
        assert_eq!(
            TimeSpan::new(-1),
            Err(TimeError::NegativeSpan { epsilons: -1 })
        );
        assert_eq!(TimeSpan::new(0), Ok(TimeSpan::ZERO));
    }

    #[test]
    fn add_and_span_since() {
        let t = TimeInstant::from_epsilons(10);
        let later = t.checked_add(TimeSpan::new(5).unwrap()).unwrap();
        assert_eq!(later.epsilons(), 15);
        assert_eq!(later.span_since(t), Some(TimeSpan::new(5).unwrap()));
        assert_eq!(t.span_since(later), None);
    }

    #[test]
    fn checked_add_overflows() {
        let t = TimeInstant::MAX;
        assert_eq!(
            t.checked_add(TimeSpan::new(1).unwrap()),
            Err(TimeError::Overflow)
        );
        assert_eq!(t + TimeSpan::new(1).unwrap(), TimeInstant::MAX);
    }

    #[test]
    fn bucket_uses_floor_division() {
        let w = TimeSpan::new(10).unwrap();
        assert_eq!(TimeInstant::from_epsilons(0).bucket(w), 0);
        assert_eq!(TimeInstant::from_epsilons(9).bucket(w), 0);
        assert_eq!(TimeInstant::from_epsilons(10).bucket(w), 1);
        assert_eq!(TimeInstant::from_epsilons(-1).bucket(w), -1);
    }

    #[test]
    fn seconds_convert_to_grid() {
        let s = TimeSpan::from_secs_f64(1.5, Epsilon::Milliseconds).unwrap();
        assert_eq!(s.epsilons(), 1_500);
        assert!(TimeSpan::from_secs_f64(-0.5, Epsilon::Seconds).is_err());
        assert!(TimeSpan::from_secs_f64(f64::NAN, Epsilon::Seconds).is_err());
    }

    #[test]
    fn seconds_at_the_grid_limit_overflow() {
        assert_eq!(
            TimeSpan::from_secs_f64(9_223_372_036_854_775_808.0, Epsilon::Seconds),
            Err(TimeError::Overflow)
        );
        let big = TimeSpan::from_secs_f64(9_223_372_036_854_774_784.0, Epsilon::Seconds).unwrap();
        assert_eq!(big.epsilons(), 9_223_372_036_854_774_784);
    }

    #[test]
    fn display_shows_raw_epsilons() {
        assert_eq!(TimeInstant::from_epsilons(42).to_string(), "t=42");
        assert_eq!(TimeSpan::new(3).unwrap().to_string(), "3eps");
    }
}
