use std::{f64::consts::PI, num::NonZeroUsize};

use super::Gate;
use crate::{MlErr, Result};

/// Maps training progress to a gate value following a half cosine,
/// `0.5 * (1 + cos(pi * prop))`.
///
/// The result is `1` at `prop = 0`, `0` at `prop = 1` and non-increasing in between, with a zero
/// slope at both ends.
///
/// # Arguments
/// * `prop` - The fraction of the total iterations already completed.
///
/// # Returns
/// The gate or an error if `prop` is NaN or lies outside `[0, 1]`.
pub fn cosine_gate(prop: f32) -> Result<Gate> {
    if !(0. ..=1.).contains(&prop) {
        return Err(MlErr::InvalidProgress(prop));
    }

    let value = 0.5 * (1. + (PI * prop as f64).cos());
    Gate::new(value as f32)
}

/// Couples the training loop's counters to the gate.
///
/// Stateless: the gate is recomputed on every iteration from the counters the driver supplies.
#[derive(Debug, Clone, Copy)]
pub struct GateSchedule {
    epochs: NonZeroUsize,
    iters_per_epoch: NonZeroUsize,
}

impl GateSchedule {
    /// Creates a new `GateSchedule`.
    ///
    /// # Arguments
    /// * `epochs` - The total amount of epochs the run is planned for.
    /// * `iters_per_epoch` - The amount of batches in an epoch.
    pub fn new(epochs: NonZeroUsize, iters_per_epoch: NonZeroUsize) -> Self {
        Self {
            epochs,
            iters_per_epoch,
        }
    }

    /// Returns the total amount of iterations of the run.
    pub fn total_iters(&self) -> usize {
        self.epochs.get() * self.iters_per_epoch.get()
    }

    /// Computes the fraction of iterations completed once the given one finishes.
    ///
    /// Runs that go on past the planned total (e.g. resumed ones) saturate at `1`.
    ///
    /// # Arguments
    /// * `epoch` - The current epoch, starting at `1`.
    /// * `batch_idx` - The index of the current batch within the epoch, starting at `0`.
    ///
    /// # Returns
    /// The progress or an error if the counters are out of range.
    pub fn progress(&self, epoch: usize, batch_idx: usize) -> Result<f32> {
        if epoch == 0 {
            return Err(MlErr::InvalidSchedule("epochs are counted from 1"));
        }

        let iters_per_epoch = self.iters_per_epoch.get();
        if batch_idx >= iters_per_epoch {
            return Err(MlErr::InvalidSchedule(
                "the batch index exceeds the batches per epoch",
            ));
        }

        let done = (epoch - 1) * iters_per_epoch + batch_idx + 1;
        let prop = done as f64 / self.total_iters() as f64;
        Ok(prop.min(1.) as f32)
    }

    /// Computes the gate for the given iteration.
    pub fn gate(&self, epoch: usize, batch_idx: usize) -> Result<Gate> {
        cosine_gate(self.progress(epoch, batch_idx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(epochs: usize, iters: usize) -> GateSchedule {
        GateSchedule::new(
            NonZeroUsize::new(epochs).unwrap(),
            NonZeroUsize::new(iters).unwrap(),
        )
    }

    #[test]
    fn cosine_gate_endpoints() {
        assert_eq!(cosine_gate(0.).unwrap(), Gate::OPEN);
        assert_eq!(cosine_gate(1.).unwrap(), Gate::CLOSED);
        assert!((cosine_gate(0.5).unwrap().value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cosine_gate_is_bounded_and_non_increasing() {
        let mut prev = cosine_gate(0.).unwrap();

        for i in 1..=1000 {
            let gate = cosine_gate(i as f32 / 1000.).unwrap();
            assert!((0. ..=1.).contains(&gate.value()));
            assert!(gate <= prev, "{gate} > {prev} at step {i}");
            prev = gate;
        }
    }

    #[test]
    fn cosine_gate_rejects_invalid_progress() {
        assert!(matches!(cosine_gate(1.01), Err(MlErr::InvalidProgress(_))));
        assert!(cosine_gate(-0.01).is_err());
        assert!(cosine_gate(f32::NAN).is_err());
    }

    #[test]
    fn progress_counts_completed_iterations() {
        let schedule = schedule(2, 4);

        assert_eq!(schedule.progress(1, 0).unwrap(), 1. / 8.);
        assert_eq!(schedule.progress(1, 3).unwrap(), 4. / 8.);
        assert_eq!(schedule.progress(2, 0).unwrap(), 5. / 8.);
        assert_eq!(schedule.progress(2, 3).unwrap(), 1.);
    }

    #[test]
    fn last_iteration_closes_the_gate() {
        let schedule = schedule(3, 5);
        assert_eq!(schedule.gate(3, 4).unwrap(), Gate::CLOSED);
    }

    #[test]
    fn progress_saturates_past_the_planned_run() {
        let schedule = schedule(2, 4);

        assert_eq!(schedule.progress(3, 0).unwrap(), 1.);
        assert_eq!(schedule.gate(5, 2).unwrap(), Gate::CLOSED);
    }

    #[test]
    fn progress_rejects_invalid_counters() {
        let schedule = schedule(2, 4);

        assert!(matches!(
            schedule.progress(0, 0),
            Err(MlErr::InvalidSchedule(_))
        ));
        assert!(schedule.progress(1, 4).is_err());
    }
}
