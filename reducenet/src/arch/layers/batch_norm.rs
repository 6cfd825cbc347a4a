use std::fmt::{self, Display};

use ndarray::{Zip, prelude::*};

use crate::{MlErr, Result, arch::Mode};

const EPS: f32 = 1e-5;
const MOMENTUM: f32 = 0.1;

/// Per-channel batch normalization over `[N, C, H, W]` inputs.
///
/// Parameters are laid out as `[scale; C]` followed by `[shift; C]`, buffers as
/// `[running mean; C]` followed by `[running variance; C]`.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    channels: usize,

    // Forward metadata
    mode: Mode,
    x_hat: Array4<f32>,
    inv_std: Array1<f32>,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            mode: Mode::Train,
            x_hat: Array4::zeros((0, 0, 0, 0)),
            inv_std: Array1::zeros(0),
        }
    }

    /// Returns the amount of trainable parameters of this layer.
    pub fn size(&self) -> usize {
        2 * self.channels
    }

    /// Returns the amount of buffer values of this layer.
    pub fn buffer_size(&self) -> usize {
        2 * self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Normalizes `x` channel-wise and applies the affine transform.
    ///
    /// In `Train` mode the batch statistics are used and folded into the running ones
    /// (the variance unbiased), in `Eval` mode the running statistics are used.
    pub fn forward(
        &mut self,
        params: &[f32],
        buffers: &mut [f32],
        x: ArrayView4<f32>,
        mode: Mode,
    ) -> Result<Array4<f32>> {
        let c = self.channels;
        let (n, xc, h, w) = x.dim();

        if xc != c {
            return Err(MlErr::ShapeMismatch {
                what: "batch norm input channels",
                got: vec![n, xc, h, w],
                expected: vec![n, c, h, w],
            });
        }

        if n * h * w == 0 {
            return Err(MlErr::EmptyBatch("batch norm input"));
        }

        let (scale, shift) = params.split_at(c);
        let (running_mean, running_var) = buffers.split_at_mut(c);
        let m = (n * h * w) as f32;

        let mut x_hat = x.to_owned();
        let mut inv_std = Array1::zeros(c);

        for (ch, mut plane) in x_hat.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, var) = match mode {
                Mode::Train => {
                    let mean = plane.sum() / m;
                    let var = plane.fold(0., |acc, &v| acc + (v - mean).powi(2)) / m;
                    let unbiased = if m > 1. { var * m / (m - 1.) } else { var };

                    running_mean[ch] = (1. - MOMENTUM) * running_mean[ch] + MOMENTUM * mean;
                    running_var[ch] = (1. - MOMENTUM) * running_var[ch] + MOMENTUM * unbiased;
                    (mean, var)
                }
                Mode::Eval => (running_mean[ch], running_var[ch]),
            };

            let istd = 1. / (var + EPS).sqrt();
            plane.mapv_inplace(|v| (v - mean) * istd);
            inv_std[ch] = istd;
        }

        let mut y = x_hat.clone();
        for (ch, mut plane) in y.axis_iter_mut(Axis(1)).enumerate() {
            let (g, b) = (scale[ch], shift[ch]);
            plane.mapv_inplace(|v| g * v + b);
        }

        self.mode = mode;
        self.x_hat = x_hat;
        self.inv_std = inv_std;
        Ok(y)
    }

    /// Accumulates the scale and shift gradients and propagates the delta to the input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView4<f32>,
    ) -> Result<Array4<f32>> {
        let c = self.channels;

        if d.dim() != self.x_hat.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "batch norm delta",
                got: d.shape().to_vec(),
                expected: self.x_hat.shape().to_vec(),
            });
        }

        let (n, _, h, w) = d.dim();
        let m = (n * h * w) as f32;
        let (scale, _) = params.split_at(c);
        let (dscale, dshift) = grad.split_at_mut(c);

        let mut dx = Array4::zeros(d.raw_dim());

        for ch in 0..c {
            let d_c = d.index_axis(Axis(1), ch);
            let x_hat = self.x_hat.index_axis(Axis(1), ch);

            let sum_d = d_c.sum();
            let sum_dx_hat = Zip::from(&d_c)
                .and(&x_hat)
                .fold(0., |acc, &d, &xh| acc + d * xh);

            dscale[ch] += sum_dx_hat;
            dshift[ch] += sum_d;

            let k = scale[ch] * self.inv_std[ch];
            let dx_c = dx.index_axis_mut(Axis(1), ch);

            match self.mode {
                Mode::Train => Zip::from(dx_c).and(&d_c).and(&x_hat).for_each(|dx, &d, &xh| {
                    *dx = k * (d - sum_d / m - xh * sum_dx_hat / m);
                }),
                Mode::Eval => Zip::from(dx_c).and(&d_c).for_each(|dx, &d| *dx = k * d),
            }
        }

        Ok(dx)
    }
}

impl Display for BatchNorm2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchNorm2d({})", self.channels)
    }
}
