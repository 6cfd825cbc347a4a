use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Softmax cross entropy over raw logits, averaged over the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Returns the row-wise softmax of `logits`.
    pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = logits.to_owned();

        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        probs
    }

    fn check(logits: &ArrayView2<f32>, targets: &[usize]) -> Result<()> {
        let (n, classes) = logits.dim();

        if targets.len() != n {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: targets.len(),
                expected: n,
            });
        }

        if let Some(&label) = targets.iter().find(|&&t| t >= classes) {
            return Err(MlErr::SizeMismatch {
                what: "label",
                got: label,
                expected: classes,
            });
        }

        Ok(())
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, targets: &[usize]) -> Result<f32> {
        Self::check(&logits, targets)?;

        let total: f32 = logits
            .axis_iter(Axis(0))
            .zip(targets)
            .map(|(row, &t)| {
                let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
                let log_sum = row.fold(0., |acc, &v| acc + (v - max).exp()).ln() + max;
                log_sum - row[t]
            })
            .sum();

        Ok(total / targets.len().max(1) as f32)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, targets: &[usize]) -> Result<Array2<f32>> {
        Self::check(&logits, targets)?;

        let mut d = Self::softmax(logits);
        for (mut row, &t) in d.axis_iter_mut(Axis(0)).zip(targets) {
            row[t] -= 1.;
        }

        d /= targets.len().max(1) as f32;
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn uniform_logits_give_log_classes() {
        let logits = Array2::zeros((2, 4));
        let loss = CrossEntropy::new().loss(logits.view(), &[0, 3]).unwrap();

        assert!((loss - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn large_logits_stay_finite() {
        let logits = array![[1000., 0.], [0., 1000.]];
        let ce = CrossEntropy::new();

        assert!(ce.loss(logits.view(), &[0, 1]).unwrap().abs() < 1e-6);
        assert!(ce.loss(logits.view(), &[1, 0]).unwrap().is_finite());
    }

    #[test]
    fn derivative_is_softmax_minus_one_hot() {
        let logits = array![[0., 0.], [2f32.ln(), 0.]];
        let d = CrossEntropy::new().loss_prime(logits.view(), &[1, 0]).unwrap();

        let expected = array![[0.25, -0.25], [-1. / 6., 1. / 6.]];
        assert!(d.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn rejects_bad_targets() {
        let logits = Array2::zeros((2, 3));
        let ce = CrossEntropy::new();

        assert!(ce.loss(logits.view(), &[0]).is_err());
        assert!(ce.loss(logits.view(), &[0, 3]).is_err());
    }
}
