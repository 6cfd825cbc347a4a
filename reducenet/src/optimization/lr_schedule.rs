use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// How the learning rate evolves from one epoch to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Cosine annealing from the base rate down to `0` over `t_max` epochs.
    Cosine { t_max: usize },
    /// Multiplies the rate by `gamma` at each milestone epoch.
    MultiStep { milestones: Vec<usize>, gamma: f32 },
}

impl LrSchedule {
    /// Computes the learning rate after `epoch_idx` completed epochs.
    pub fn lr(&self, base: f32, epoch_idx: usize) -> f32 {
        match self {
            Self::Cosine { t_max } => {
                let t_max = (*t_max).max(1) as f64;
                let t = epoch_idx as f64;
                (0.5 * base as f64 * (1. + (PI * t / t_max).cos())) as f32
            }
            Self::MultiStep { milestones, gamma } => {
                let passed = milestones.iter().filter(|&&m| m <= epoch_idx).count();
                base * gamma.powi(passed as i32)
            }
        }
    }
}
