//! Simulation time management

use crate::error::EventError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// Simulation time in seconds
///
/// SimTime represents a point in simulation time as an `f64`. It is never NaN
/// and never negative, which makes the ordering total. Positive infinity is a
/// valid value and stands for "never"; it can be compared against but it is not
/// a valid event time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    /// Time zero, the default start of a simulation
    pub const ZERO: SimTime = SimTime(0.0);

    /// The time that never comes
    pub const INFINITY: SimTime = SimTime(f64::INFINITY);

    /// Create a new SimTime at the simulation start (time zero)
    pub const fn zero() -> Self {
        Self::ZERO
    }

    /// Create a SimTime from seconds.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is NaN or negative.
    pub fn new(secs: f64) -> Self {
        match Self::try_new(secs) {
            Ok(time) => time,
            Err(err) => panic!("{err}"),
        }
    }

    /// Create a SimTime from seconds, rejecting NaN and negative values.
    pub fn try_new(secs: f64) -> Result<Self, EventError> {
        if secs.is_nan() {
            return Err(EventError::InvalidTime(
                "SimTime cannot be created from NaN".to_string(),
            ));
        }
        if secs < 0.0 {
            return Err(EventError::InvalidTime(format!(
                "SimTime cannot be negative: {secs}"
            )));
        }
        // Normalise -0.0 so that equal times compare equal under total ordering.
        Ok(SimTime(secs + 0.0))
    }

    /// Get the time in seconds
    pub const fn as_f64(&self) -> f64 {
        self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    /// Elapsed seconds since `earlier`, saturating at zero
    pub fn duration_since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    /// Advance by `rhs` seconds.
    ///
    /// # Panics
    ///
    /// Panics if the result would be NaN or negative.
    fn add(self, rhs: f64) -> Self::Output {
        SimTime::new(self.0 + rhs)
    }
}

impl Sub<SimTime> for SimTime {
    type Output = f64;

    fn sub(self, rhs: SimTime) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Default for SimTime {
    fn default() -> Self {
        SimTime::zero()
    }
}

impl From<f64> for SimTime {
    /// Convert from seconds (as f64) to SimTime
    ///
    /// # Examples
    /// ```
    /// # use des_core::SimTime;
    /// let time = SimTime::from(1.5);
    /// assert_eq!(time.as_f64(), 1.5);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the input is negative or NaN.
    fn from(secs: f64) -> Self {
        SimTime::new(secs)
    }
}

impl From<SimTime> for f64 {
    fn from(time: SimTime) -> Self {
        time.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_infinite() {
            write!(f, "∞")
        } else {
            write!(f, "{}s", self.0)
        }
    }
}
