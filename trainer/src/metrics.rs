use std::{
    fmt::{self, Display},
    time::Duration,
};

use ndarray::{ArrayView2, Axis};

/// Running loss and accuracy over one pass of a data loader.
#[derive(Debug, Default, Clone)]
pub struct EpochMetrics {
    pub loss_sum: f64,
    pub batches: usize,
    pub correct: usize,
    pub samples: usize,
    pub elapsed: Duration,
}

impl EpochMetrics {
    /// Adds one batch's mean loss and its predictions.
    pub fn record(&mut self, loss: f32, logits: ArrayView2<f32>, labels: &[usize]) {
        self.loss_sum += loss as f64;
        self.batches += 1;
        self.correct += count_correct(logits, labels);
        self.samples += labels.len();
    }

    /// The mean of the batch losses.
    pub fn loss(&self) -> f32 {
        if self.batches == 0 {
            return 0.;
        }

        (self.loss_sum / self.batches as f64) as f32
    }

    /// The percentage of correctly classified samples.
    pub fn accuracy(&self) -> f32 {
        if self.samples == 0 {
            return 0.;
        }

        100. * self.correct as f32 / self.samples as f32
    }
}

impl Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss {:.4} | acc {:.3}% ({}/{}) | {:.1?}",
            self.loss(),
            self.accuracy(),
            self.correct,
            self.samples,
            self.elapsed
        )
    }
}

/// Counts the rows whose highest logit is at the label's column. Ties pick the first column.
pub fn count_correct(logits: ArrayView2<f32>, labels: &[usize]) -> usize {
    logits
        .axis_iter(Axis(0))
        .zip(labels)
        .filter(|(row, label)| {
            let argmax = row
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0;
            argmax == **label
        })
        .count()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn accuracy_counts_argmax_hits() {
        let logits = array![[0.1, 0.9], [2., -1.], [0.3, 0.3]];
        let mut metrics = EpochMetrics::default();

        metrics.record(0.5, logits.view(), &[1, 1, 0]);
        metrics.record(1.5, logits.view(), &[0, 0, 0]);

        assert_eq!(metrics.correct, 4);
        assert_eq!(metrics.samples, 6);
        assert!((metrics.accuracy() - 400. / 6.).abs() < 1e-4);
        assert_eq!(metrics.loss(), 1.);
    }

    #[test]
    fn empty_metrics_are_zero() {
        let metrics = EpochMetrics::default();

        assert_eq!(metrics.loss(), 0.);
        assert_eq!(metrics.accuracy(), 0.);
    }
}
