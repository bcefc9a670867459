//! Simulation time.
//!
//! `SimTime` is a fixed-point count of nanoseconds. One nanosecond is the
//! minimum representable interval; all coordination arithmetic (grant
//! comparison, visibility scheduling, period quantization) happens on the
//! integer representation so that no federate ever observes two grants that
//! compare equal but differ in the last bit of a float.
//!
//! Conversions to and from `f64` seconds exist only at the API edge (user
//! code and configuration files think in seconds).

use serde::{Deserialize, Serialize, Serializer};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A point (or span) of simulated time, in nanoseconds.
///
/// `SimTime` is totally ordered and starts at [`SimTime::ZERO`].
/// [`SimTime::NEVER`] is the upper sentinel: it compares greater than every
/// finite time and is used as the frontier of a disconnected federate, which
/// can no longer block anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(i64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: Self = Self(0);

    /// Sentinel meaning "no longer bounded": greater than any finite time.
    pub const NEVER: Self = Self(i64::MAX);

    /// Construct from a raw nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Raw nanosecond count.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Construct from seconds, rounded to the nearest nanosecond.
    ///
    /// Non-finite and out-of-range inputs saturate to [`SimTime::NEVER`]
    /// (positive) or [`SimTime::ZERO`] (negative or NaN).
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_seconds(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return if seconds > 0.0 { Self::NEVER } else { Self::ZERO };
        }
        let nanos = seconds * NANOS_PER_SECOND as f64;
        if nanos >= i64::MAX as f64 {
            Self::NEVER
        } else {
            // nanos is finite, positive, and below i64::MAX here
            Self((nanos + 0.5) as i64)
        }
    }

    /// Value in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_seconds(self) -> f64 {
        if self == Self::NEVER {
            f64::INFINITY
        } else {
            self.0 as f64 / NANOS_PER_SECOND as f64
        }
    }

    /// Whether this is a finite time (not the [`SimTime::NEVER`] sentinel).
    pub const fn is_finite(self) -> bool {
        self.0 != i64::MAX
    }

    /// Addition that sticks at [`SimTime::NEVER`] instead of wrapping.
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Smallest integer multiple of `period` that is `>= self`.
    ///
    /// Returns `self` unchanged when `period` is zero or not finite.
    pub fn round_up_to(self, period: Self) -> Self {
        if period.0 <= 0 || !period.is_finite() || !self.is_finite() {
            return self;
        }
        let p = i128::from(period.0);
        let quanta = (i128::from(self.0) + p - 1).div_euclid(p);
        match i64::try_from(quanta.saturating_mul(p)) {
            Ok(nanos) => Self(nanos),
            Err(_) => Self::NEVER,
        }
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_finite() {
            write!(f, "{}s", self.as_seconds())
        } else {
            write!(f, "never")
        }
    }
}

// Serialized as f64 seconds: configuration documents and logs think in
// seconds, same as the underlying constructors.
impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_seconds())
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if seconds.is_nan() || seconds < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "time must be a non-negative number of seconds, got {seconds}"
            )));
        }
        Ok(Self::from_seconds(seconds))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_is_default() {
        assert_eq!(SimTime::default(), SimTime::ZERO);
    }

    #[test]
    fn from_seconds_rounds_to_nanos() {
        assert_eq!(SimTime::from_seconds(0.01).as_nanos(), 10_000_000);
        assert_eq!(SimTime::from_seconds(5.01).as_nanos(), 5_010_000_000);
    }

    #[test]
    fn never_dominates_every_finite_time() {
        assert!(SimTime::NEVER > SimTime::from_seconds(1e9));
        assert!(!SimTime::NEVER.is_finite());
        assert_eq!(SimTime::NEVER.as_seconds(), f64::INFINITY);
    }

    #[test]
    fn out_of_range_seconds_saturate_to_never() {
        assert_eq!(SimTime::from_seconds(1e12), SimTime::NEVER);
    }

    #[test]
    fn negative_and_nan_seconds_clamp_to_zero() {
        assert_eq!(SimTime::from_seconds(-3.0), SimTime::ZERO);
        assert_eq!(SimTime::from_seconds(f64::NAN), SimTime::ZERO);
        assert_eq!(SimTime::from_seconds(f64::INFINITY), SimTime::NEVER);
    }

    #[test]
    fn saturating_add_sticks_at_never() {
        let t = SimTime::from_seconds(1.0);
        assert_eq!(SimTime::NEVER.saturating_add(t), SimTime::NEVER);
        assert_eq!(t.saturating_add(t), SimTime::from_seconds(2.0));
    }

    #[test]
    fn round_up_lands_on_period_multiples() {
        let p = SimTime::from_seconds(0.01);
        assert_eq!(SimTime::from_seconds(0.005).round_up_to(p), p);
        assert_eq!(p.round_up_to(p), p);
        assert_eq!(SimTime::from_seconds(0.011).round_up_to(p), SimTime::from_seconds(0.02));
        assert_eq!(SimTime::ZERO.round_up_to(p), SimTime::ZERO);
    }

    #[test]
    fn round_up_with_zero_period_is_identity() {
        let t = SimTime::from_seconds(0.123);
        assert_eq!(t.round_up_to(SimTime::ZERO), t);
    }

    proptest! {
        #[test]
        fn round_up_never_decreases(nanos in 0i64..1_000_000_000_000, period_ns in 1i64..1_000_000_000) {
            let t = SimTime::from_nanos(nanos);
            let p = SimTime::from_nanos(period_ns);
            let rounded = t.round_up_to(p);
            prop_assert!(rounded >= t);
            prop_assert_eq!(rounded.as_nanos() % period_ns, 0);
            prop_assert!(rounded.as_nanos() - t.as_nanos() < period_ns);
        }
    }
}
