use crate::{MlErr, Result};

/// A `ParamGen` generates values for the initial state of a layer's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// `None` if the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Samples exactly `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The amount of samples to generate.
    ///
    /// # Returns
    /// The samples or an error if the generator ran out before producing `n` values.
    fn sample_exact(&mut self, n: usize) -> Result<Vec<f32>> {
        let sample = self.sample(n).unwrap_or_default();

        if sample.len() != n {
            return Err(MlErr::SizeMismatch {
                what: "initial parameters",
                got: sample.len(),
                expected: n,
            });
        }

        Ok(sample)
    }
}
