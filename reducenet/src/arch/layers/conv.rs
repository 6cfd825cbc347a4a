use std::fmt::{self, Display};

use ndarray::{linalg, prelude::*};
use rayon::prelude::*;

use super::row_major;
use crate::{MlErr, Result};

/// A bias-free 2D convolution over `[N, C, H, W]` inputs.
///
/// The input is unfolded into a `[C * k * k, N * H' * W']` column matrix (im2col) so both
/// passes reduce to matrix products against the `[C_out, C * k * k]` weight matrix.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,

    // Forward metadata
    input_dim: (usize, usize, usize, usize),
    cols: Array2<f32>,
}

/// Spatial geometry of one convolution call.
#[derive(Clone, Copy)]
struct Geometry {
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    ho: usize,
    wo: usize,
}

impl Geometry {
    fn ncols(&self) -> usize {
        self.n * self.ho * self.wo
    }
}

impl Conv2d {
    /// Creates a new `Conv2d`.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of input channels.
    /// * `out_channels` - The amount of output channels.
    /// * `kernel` - The side of the square kernel.
    /// * `stride` - The step between two consecutive kernel applications.
    /// * `padding` - The amount of zeros added on every side of the input.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            input_dim: (0, 0, 0, 0),
            cols: Array2::zeros((0, 0)),
        }
    }

    /// A 3x3 convolution with padding 1.
    pub fn conv3x3(in_channels: usize, out_channels: usize, stride: usize) -> Self {
        Self::new(in_channels, out_channels, 3, stride, 1)
    }

    /// A 1x1 convolution without padding.
    pub fn conv1x1(in_channels: usize, out_channels: usize, stride: usize) -> Self {
        Self::new(in_channels, out_channels, 1, stride, 0)
    }

    /// Returns the amount of parameters of this layer.
    pub fn size(&self) -> usize {
        self.out_channels * self.fan_in()
    }

    /// Returns the amount of inputs feeding each output element.
    pub fn fan_in(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    /// Computes the spatial dimensions of the output for an input of `h` by `w`.
    pub fn output_dim(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let padded = (h + 2 * self.padding, w + 2 * self.padding);

        if self.stride == 0 || padded.0 < self.kernel || padded.1 < self.kernel {
            return Err(MlErr::ShapeMismatch {
                what: "convolution input",
                got: vec![h, w],
                expected: vec![self.kernel, self.kernel],
            });
        }

        let ho = (padded.0 - self.kernel) / self.stride + 1;
        let wo = (padded.1 - self.kernel) / self.stride + 1;
        Ok((ho, wo))
    }

    /// Convolves `x` with the layer's weights.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - An input of shape `[N, C_in, H, W]`.
    ///
    /// # Returns
    /// The output of shape `[N, C_out, H', W']` or an error if `x` has the wrong channel count.
    pub fn forward(&mut self, params: &[f32], x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();

        if c != self.in_channels {
            return Err(MlErr::ShapeMismatch {
                what: "convolution input channels",
                got: vec![n, c, h, w],
                expected: vec![n, self.in_channels, h, w],
            });
        }

        let (ho, wo) = self.output_dim(h, w)?;
        let geo = Geometry { n, c, h, w, ho, wo };

        let cols = self.im2col(&row_major(&x), geo)?;
        let weights = self.view_params(params)?;

        let mut out = Array2::zeros((self.out_channels, geo.ncols()));
        linalg::general_mat_mul(1., &weights, &cols, 0., &mut out);

        self.input_dim = (n, c, h, w);
        self.cols = cols;

        let out = out
            .into_shape_with_order((self.out_channels, n, ho, wo))?
            .permuted_axes([1, 0, 2, 3]);

        Ok(out.as_standard_layout().into_owned())
    }

    /// Accumulates the weight gradient and propagates the delta to the input.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient, accumulated into.
    /// * `d` - The delta of the output, shaped like the last forward's output.
    ///
    /// # Returns
    /// The delta of the input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayView4<f32>,
    ) -> Result<Array4<f32>> {
        let (n, c, h, w) = self.input_dim;
        let (ho, wo) = self.output_dim(h, w)?;
        let expected = (n, self.out_channels, ho, wo);

        if d.dim() != expected || self.cols.ncols() != n * ho * wo {
            let (dn, dc, dh, dw) = d.dim();
            return Err(MlErr::ShapeMismatch {
                what: "convolution delta",
                got: vec![dn, dc, dh, dw],
                expected: vec![expected.0, expected.1, expected.2, expected.3],
            });
        }

        let geo = Geometry { n, c, h, w, ho, wo };
        let d = d
            .permuted_axes([1, 0, 2, 3])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((self.out_channels, geo.ncols()))?;

        let mut dw = ArrayViewMut2::from_shape((self.out_channels, self.fan_in()), grad)?;
        linalg::general_mat_mul(1., &d, &self.cols.t(), 1., &mut dw);

        let weights = self.view_params(params)?;
        let mut dcols = Array2::zeros((self.fan_in(), geo.ncols()));
        linalg::general_mat_mul(1., &weights.t(), &d, 0., &mut dcols);

        let dx = self.col2im(&row_major(&dcols.view()), geo);
        Ok(Array4::from_shape_vec((n, c, h, w), dx)?)
    }

    /// Unfolds a row-major `[N, C, H, W]` input into its column matrix. Row `r` of the result
    /// holds, for every output position, the input value under kernel tap
    /// `(r / k², (r / k) % k, r % k)`, or zero where the tap falls on the padding.
    fn im2col(&self, x: &[f32], geo: Geometry) -> Result<Array2<f32>> {
        let Geometry { n, c, h, w, ho, wo } = geo;
        let (k, stride, pad) = (self.kernel, self.stride, self.padding);
        let ncols = geo.ncols();

        let mut cols = vec![0.; c * k * k * ncols];

        cols.par_chunks_mut(ncols.max(1))
            .enumerate()
            .for_each(|(row, col)| {
                let (ci, ki, kj) = (row / (k * k), (row / k) % k, row % k);

                for b in 0..n {
                    let plane = &x[(b * c + ci) * h * w..][..h * w];
                    let out = &mut col[b * ho * wo..][..ho * wo];

                    for oh in 0..ho {
                        let Some(ih) = (oh * stride + ki).checked_sub(pad).filter(|&ih| ih < h)
                        else {
                            continue;
                        };

                        for ow in 0..wo {
                            if let Some(iw) =
                                (ow * stride + kj).checked_sub(pad).filter(|&iw| iw < w)
                            {
                                out[oh * wo + ow] = plane[ih * w + iw];
                            }
                        }
                    }
                }
            });

        Ok(Array2::from_shape_vec((c * k * k, ncols), cols)?)
    }

    /// Folds a row-major column matrix back onto a `[N, C, H, W]` buffer, summing the
    /// contributions of overlapping kernel taps.
    fn col2im(&self, dcols: &[f32], geo: Geometry) -> Vec<f32> {
        let Geometry { n: _, c, h, w, ho, wo } = geo;
        let (k, stride, pad) = (self.kernel, self.stride, self.padding);
        let ncols = geo.ncols();

        let mut dx = vec![0.; geo.n * c * h * w];

        dx.par_chunks_mut((h * w).max(1))
            .enumerate()
            .for_each(|(plane_idx, plane)| {
                let (b, ci) = (plane_idx / c, plane_idx % c);

                for ki in 0..k {
                    for kj in 0..k {
                        let row = &dcols[((ci * k + ki) * k + kj) * ncols..][..ncols];
                        let row = &row[b * ho * wo..][..ho * wo];

                        for oh in 0..ho {
                            let Some(ih) =
                                (oh * stride + ki).checked_sub(pad).filter(|&ih| ih < h)
                            else {
                                continue;
                            };

                            for ow in 0..wo {
                                if let Some(iw) =
                                    (ow * stride + kj).checked_sub(pad).filter(|&iw| iw < w)
                                {
                                    plane[ih * w + iw] += row[oh * wo + ow];
                                }
                            }
                        }
                    }
                }
            });

        dx
    }

    /// Gives a view of the raw parameter slice as the `[C_out, C_in * k * k]` weight matrix.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<ArrayView2<'a, f32>> {
        Ok(ArrayView2::from_shape(
            (self.out_channels, self.fan_in()),
            params,
        )?)
    }
}

impl Display for Conv2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Conv2d({}, {}, kernel={}, stride={}, padding={})",
            self.in_channels, self.out_channels, self.kernel, self.stride, self.padding
        )
    }
}
