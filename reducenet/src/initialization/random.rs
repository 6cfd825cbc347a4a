use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{ParamGen, RandErr};

/// A parameter generator that follows a certain probabilistic distribution.
///
/// The random number generator is shared between every generator of a network so that the
/// whole initialization is reproducible from a single seed.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A shared random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(rng: Rc<RefCell<R>>, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Normal<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a normal distribution.
    ///
    /// # Arguments
    /// * `rng` - A shared random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (NaN or infinite).
    pub fn normal(
        rng: Rc<RefCell<R>>,
        limit: usize,
        mean: f32,
        std_dev: f32,
    ) -> Result<Self, RandErr> {
        Ok(Self::new(rng, Normal::new(mean, std_dev)?, limit))
    }

    /// Creates a new `RandParamGen` parameter generator using Kaiming (He) normal
    /// initialization in fan-in mode, `std = sqrt(2 / fan_in)`.
    ///
    /// # Arguments
    /// * `rng` - A shared random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units feeding each output unit.
    ///
    /// # Returns
    /// An error if `fan_in` is zero.
    pub fn kaiming(rng: Rc<RefCell<R>>, limit: usize, fan_in: usize) -> Result<Self, RandErr> {
        if fan_in == 0 {
            return Err(RandErr("kaiming initialization needs a positive fan-in".into()));
        }

        let std_dev = (2. / fan_in as f32).sqrt();
        Self::normal(rng, limit, 0., std_dev)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        let n = n.min(self.remaining);
        self.remaining -= n;

        let mut rng = self.rng.borrow_mut();
        let sample = (0..n).map(|_| self.distribution.sample(&mut *rng)).collect();
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn seeded_rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn partial() {
        let mut param_gen = RandParamGen::normal(seeded_rng(), 10, 0., 1.).unwrap();

        assert_eq!(param_gen.sample(7).unwrap().len(), 7);
        assert_eq!(param_gen.sample(7).unwrap().len(), 3);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn kaiming_matches_fan_in_variance() {
        const N: usize = 20_000;
        let fan_in = 8;

        let mut param_gen = RandParamGen::kaiming(seeded_rng(), N, fan_in).unwrap();
        let sample = param_gen.sample_exact(N).unwrap();

        let mean = sample.iter().sum::<f32>() / N as f32;
        let var = sample.iter().map(|w| (w - mean).powi(2)).sum::<f32>() / N as f32;

        assert!(mean.abs() < 0.02, "mean {mean}");
        assert!((var - 2. / fan_in as f32).abs() < 0.02, "var {var}");
    }

    #[test]
    fn kaiming_rejects_zero_fan_in() {
        assert!(RandParamGen::kaiming(seeded_rng(), 1, 0).is_err());
    }
}
