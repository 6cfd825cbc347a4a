use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// A validated gate value in `[0, 1]`.
///
/// `1` keeps the full ReLU nonlinearity of a reducible block, `0` turns it into the identity.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Gate(f32);

impl Gate {
    /// The fully nonlinear gate every network starts with.
    pub const OPEN: Self = Self(1.);

    /// The fully linear gate, after which the blocks can be reduced.
    pub const CLOSED: Self = Self(0.);

    /// Creates a new `Gate`.
    ///
    /// # Arguments
    /// * `value` - The gate value.
    ///
    /// # Returns
    /// An error if `value` is NaN or lies outside `[0, 1]`. Out of range values are never
    /// clamped.
    pub fn new(value: f32) -> Result<Self> {
        if !(0. ..=1.).contains(&value) {
            return Err(MlErr::InvalidGate(value));
        }

        Ok(Self(value))
    }

    /// Returns the raw gate value.
    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }

    /// Returns whether the gate is fully closed.
    #[inline]
    pub fn is_closed(self) -> bool {
        self.0 == 0.
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::OPEN
    }
}

impl TryFrom<f32> for Gate {
    type Error = MlErr;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Gate> for f32 {
    fn from(value: Gate) -> Self {
        value.0
    }
}

impl Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_closed_interval() {
        assert_eq!(Gate::new(0.).unwrap(), Gate::CLOSED);
        assert_eq!(Gate::new(1.).unwrap(), Gate::OPEN);
        assert_eq!(Gate::new(0.25).unwrap().value(), 0.25);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(Gate::new(1.5), Err(MlErr::InvalidGate(v)) if v == 1.5));
        assert!(matches!(Gate::new(-0.1), Err(MlErr::InvalidGate(_))));
        assert!(Gate::new(f32::NAN).is_err());
        assert!(Gate::new(f32::INFINITY).is_err());
    }

    #[test]
    fn default_is_open() {
        assert_eq!(Gate::default(), Gate::OPEN);
        assert!(!Gate::default().is_closed());
        assert!(Gate::CLOSED.is_closed());
    }
}
