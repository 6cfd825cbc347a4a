use std::fmt::{self, Display};

use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result};

/// A fully connected layer computing `x · W + b`, with `W` of shape `[in, out]`.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    size: usize,

    // Forward metadata
    x: Array2<f32>,
}

impl Linear {
    /// Creates a new `Linear`.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: Array2::zeros((0, 0)),
        }
    }

    /// Returns the amount of parameters of this layer.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::ShapeMismatch {
                what: "linear input",
                got: x.shape().to_vec(),
                expected: vec![x.nrows(), self.dim.0],
            });
        }

        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1., &x, &w, 0., &mut z);
        z += &b;

        self.x = x.to_owned();
        Ok(z)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        if d.dim() != (self.x.nrows(), self.dim.1) {
            return Err(MlErr::ShapeMismatch {
                what: "linear delta",
                got: d.shape().to_vec(),
                expected: vec![self.x.nrows(), self.dim.1],
            });
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1., &self.x.t(), &d, 1., &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1., &d, &w.t(), 0., &mut dx);

        Ok(dx)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len(grad.len())?;
        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;
        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size {
            return Err(MlErr::SizeMismatch {
                what: "linear params",
                got: len,
                expected: self.size,
            });
        }

        Ok(())
    }
}

impl Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Linear({}, {})", self.dim.0, self.dim.1)
    }
}
