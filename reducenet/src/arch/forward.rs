use crate::gating::Gate;

/// Whether a forward pass belongs to training or to inference.
///
/// Batch norm layers normalize with the batch statistics and update their running statistics
/// in `Train` mode, and normalize with the running statistics in `Eval` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// The context shared by every block during one forward pass.
///
/// The network builds a single `Forward` from its own gate and hands the same value to every
/// block, so all blocks observe the same gate for the whole pass.
#[derive(Debug, Clone, Copy)]
pub struct Forward {
    pub gate: Gate,
    pub mode: Mode,
}

impl Forward {
    pub fn new(gate: Gate, mode: Mode) -> Self {
        Self { gate, mode }
    }
}
