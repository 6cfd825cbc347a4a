use ndarray::prelude::*;

use crate::{MlErr, Result};

/// Averages every channel over its spatial dimensions, `[N, C, H, W] -> [N, C]`.
#[derive(Debug, Clone, Default)]
pub struct GlobalAvgPool {
    input_dim: (usize, usize, usize, usize),
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayView4<f32>) -> Result<Array2<f32>> {
        let (n, c, h, w) = x.dim();

        if h * w == 0 {
            return Err(MlErr::ShapeMismatch {
                what: "pooling input",
                got: vec![n, c, h, w],
                expected: vec![n, c, 1, 1],
            });
        }

        self.input_dim = (n, c, h, w);
        Ok(x.sum_axis(Axis(3)).sum_axis(Axis(2)) / (h * w) as f32)
    }

    pub fn backward(&self, d: ArrayView2<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = self.input_dim;

        if d.dim() != (n, c) {
            return Err(MlErr::ShapeMismatch {
                what: "pooling delta",
                got: d.shape().to_vec(),
                expected: vec![n, c],
            });
        }

        let scale = 1. / (h * w) as f32;
        Ok(Array4::from_shape_fn((n, c, h, w), |(b, ch, _, _)| {
            d[[b, ch]] * scale
        }))
    }
}
