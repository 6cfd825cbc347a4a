use super::ParamGen;

/// A parameter generator that always generates the same value.
///
/// Used for the batch norm affine parameters (scale `1`, shift `0`).
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    /// * `limit` - The maximum amount of times to generate that value.
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        let n = n.min(self.remaining);
        self.remaining -= n;
        Some(vec![self.value; n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_limit() {
        let mut param_gen = ConstParamGen::new(1., 4);

        assert_eq!(param_gen.sample(3).unwrap(), [1.; 3]);
        assert_eq!(param_gen.sample(3).unwrap(), [1.]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn sample_exact_fails_when_short() {
        let mut param_gen = ConstParamGen::new(0., 2);
        assert!(param_gen.sample_exact(3).is_err());
    }
}
