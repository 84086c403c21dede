//! Simulation time.
//!
//! Time in Forgecast is abstract: a finite, non-negative number of
//! simulated units. There is no wall clock anywhere in the core.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A simulated timestamp or duration.
///
/// Values are validated to be finite and non-negative, which makes the
/// ordering total and lets `SimTime` be used as a merge key.
///
/// # Examples
///
/// ```
/// use forgecast::SimTime;
///
/// let start = SimTime::new(2.0).unwrap();
/// let end = start + SimTime::new(3.0).unwrap();
/// assert_eq!(end.value(), 5.0);
/// assert!(SimTime::new(-1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SimTime(f64);

impl SimTime {
    /// The origin of simulated time.
    pub const ZERO: Self = Self(0.0);

    /// Creates a validated timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTime` for negative, NaN or infinite values.
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidTime { value });
        }
        // Normalize -0.0 so equal times hash equally.
        Ok(Self(value + 0.0))
    }

    /// The raw value.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns the later of two times.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other > self { other } else { self }
    }
}

impl Default for SimTime {
    fn default() -> Self {
        Self::ZERO
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

impl Hash for SimTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Add for SimTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        // Both operands are finite and non-negative; only overflow to +inf is possible.
        let sum = self.0 + rhs.0;
        Self(if sum.is_finite() { sum } else { f64::MAX })
    }
}

impl TryFrom<f64> for SimTime {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SimTime> for f64 {
    fn from(value: SimTime) -> Self {
        value.0
    }
}

impl From<u32> for SimTime {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}
