use super::ParamGen;

/// A parameter generator that delegates the generation to a chain of generators.
///
/// Every layer of the network contributes the generators for its own parameters, in forward
/// order, so sampling the whole chain yields the network's flat parameter vector.
pub struct ChainedParamGen {
    param_gens: Vec<Box<dyn ParamGen>>,
    curr: usize,
}

impl ChainedParamGen {
    /// Creates a new `ChainedParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `param_gens` - The generators to drain, in order.
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens,
            curr: 0,
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let mut sample = Vec::with_capacity(n);

        while sample.len() < n && self.curr < self.param_gens.len() {
            match self.param_gens[self.curr].sample(n - sample.len()) {
                Some(chunk) if sample.len() + chunk.len() == n => sample.extend(chunk),
                Some(chunk) => {
                    sample.extend(chunk);
                    self.curr += 1;
                }
                None => self.curr += 1,
            }
        }

        if sample.is_empty() && n > 0 {
            return None;
        }

        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::{super::ConstParamGen, *};

    #[test]
    fn empty() {
        let mut param_gen = ChainedParamGen::new(vec![]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn spans_generators() {
        let param_gens: Vec<Box<dyn ParamGen>> = vec![
            Box::new(ConstParamGen::new(0., 1)),
            Box::new(ConstParamGen::new(1., 3)),
        ];

        let mut param_gen = ChainedParamGen::new(param_gens);

        assert_eq!(param_gen.sample(2).unwrap(), [0., 1.]);
        assert_eq!(param_gen.sample(5).unwrap(), [1., 1.]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn nested_chains() {
        let inner: Vec<Box<dyn ParamGen>> = vec![
            Box::new(ConstParamGen::new(1., 1)),
            Box::new(ConstParamGen::new(2., 1)),
        ];

        let param_gens: Vec<Box<dyn ParamGen>> = vec![
            Box::new(ConstParamGen::new(0., 1)),
            Box::new(ChainedParamGen::new(inner)),
            Box::new(ConstParamGen::new(3., 1)),
        ];

        let mut param_gen = ChainedParamGen::new(param_gens);

        assert_eq!(param_gen.sample_exact(4).unwrap(), [0., 1., 2., 3.]);
        assert!(param_gen.sample(1).is_none());
    }
}
