use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of logits and their class labels.
pub trait LossFn {
    /// Returns the mean loss of the batch.
    fn loss(&self, logits: ArrayView2<f32>, targets: &[usize]) -> Result<f32>;

    /// Returns the derivative of the mean loss with respect to the logits.
    fn loss_prime(&self, logits: ArrayView2<f32>, targets: &[usize]) -> Result<Array2<f32>>;
}
