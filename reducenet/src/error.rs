use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

use crate::initialization::RandErr;

/// The result type used in the entire reducenet crate.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The reducenet crate's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    EmptyBatch(&'static str),
    InvalidGate(f32),
    InvalidProgress(f32),
    InvalidSchedule(&'static str),
    InvalidConfig(String),
    Shape(ShapeError),
    Init(RandErr),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a shape mismatch for {what}, got {got:?} and expected {expected:?}"
            ),
            MlErr::EmptyBatch(what) => write!(f, "Got an empty batch for {what}"),
            MlErr::InvalidGate(value) => {
                write!(f, "The gate must lie in [0, 1], got {value}")
            }
            MlErr::InvalidProgress(prop) => {
                write!(f, "The training progress must lie in [0, 1], got {prop}")
            }
            MlErr::InvalidSchedule(msg) => write!(f, "Invalid schedule input: {msg}"),
            MlErr::InvalidConfig(msg) => write!(f, "Invalid network configuration: {msg}"),
            MlErr::Shape(e) => write!(f, "Failed to shape an array: {e}"),
            MlErr::Init(e) => write!(f, "Failed to initialize the parameters: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Init(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<RandErr> for MlErr {
    fn from(value: RandErr) -> Self {
        Self::Init(value)
    }
}
