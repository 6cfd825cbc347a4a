//! The scalar gate that interpolates every reducible block between its nonlinear and its
//! linear form, and the schedule that drives it from `1` to `0` over training.

mod gate;
mod schedule;

pub use gate::Gate;
pub use schedule::{GateSchedule, cosine_gate};
