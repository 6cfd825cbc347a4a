use super::Optimizer;
use crate::{MlErr, Result};

/// Stochastic gradient descent with momentum, optional Nesterov acceleration and L2 weight
/// decay added to the gradient.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    nesterov: bool,
    weight_decay: f32,
    velocity: Box<[f32]>,
}

impl Sgd {
    /// Creates a new `Sgd` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - The decay of the velocity, `0` for plain gradient descent.
    /// * `nesterov` - Whether to look ahead along the velocity.
    /// * `weight_decay` - The L2 penalty coefficient.
    pub fn new(
        len: usize,
        learning_rate: f32,
        momentum: f32,
        nesterov: bool,
        weight_decay: f32,
    ) -> Self {
        Self {
            learning_rate,
            momentum,
            nesterov,
            weight_decay,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }
}

impl Optimizer for Sgd {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() || grad.len() != self.velocity.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer gradient",
                got: grad.len(),
                expected: self.velocity.len(),
            });
        }

        let Self {
            learning_rate: lr,
            momentum: mu,
            nesterov,
            weight_decay: wd,
            ..
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                let g = g + wd * *p;
                *v = mu * *v + g;

                let step = if nesterov { g + mu * *v } else { *v };
                *p -= lr * step;
            });

        Ok(())
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}
