//! Reducible residual networks for CIFAR-style image classification.
//!
//! Every block's first nonlinearity is `gate * relu(a) + (1 - gate) * a`, with one gate shared
//! by the whole network. Driving the gate from `1` to `0` over training (see
//! [`gating::GateSchedule`]) leaves blocks whose first two convolutions compose linearly.

pub mod arch;
pub mod error;
pub mod gating;
pub mod initialization;
pub mod optimization;
pub mod params;

pub use error::{MlErr, Result};
