use std::mem;

use crate::{MlErr, Result};

/// Holds the flat parameter, gradient and buffer vectors of a network.
///
/// Layers never own their parameters: on every pass they take contiguous slices of these
/// vectors, in forward order through a `FrontIter` and in reverse order through a `BackIter`.
/// Buffers hold non-trainable state such as batch norm running statistics.
#[derive(Debug, Clone)]
pub struct ParamStore {
    params: Vec<f32>,
    grad: Vec<f32>,
    buffers: Vec<f32>,
}

impl ParamStore {
    /// Creates a new `ParamStore` with a zeroed gradient.
    ///
    /// # Arguments
    /// * `params` - The initial trainable parameters.
    /// * `buffers` - The initial non-trainable state.
    pub fn new(params: Vec<f32>, buffers: Vec<f32>) -> Self {
        Self {
            grad: vec![0.; params.len()],
            params,
            buffers,
        }
    }

    /// Returns the trainable parameters.
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Returns the accumulated gradient.
    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Returns the non-trainable state.
    pub fn buffers(&self) -> &[f32] {
        &self.buffers
    }

    /// Gives simultaneous access to the parameters, for writing, and the gradient.
    pub fn params_and_grad_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    /// Sets the whole gradient to zero.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    /// Replaces the parameters and buffers with the given ones.
    ///
    /// # Returns
    /// An error if any of the lengths differ from the current ones.
    pub fn load(&mut self, params: &[f32], buffers: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "params",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        if buffers.len() != self.buffers.len() {
            return Err(MlErr::SizeMismatch {
                what: "buffers",
                got: buffers.len(),
                expected: self.buffers.len(),
            });
        }

        self.params.copy_from_slice(params);
        self.buffers.copy_from_slice(buffers);
        self.zero_grad();
        Ok(())
    }

    /// Creates a new iterator for the forward pass.
    pub fn front(&mut self) -> FrontIter<'_> {
        FrontIter {
            params: &self.params,
            buffers: &mut self.buffers,
        }
    }

    /// Creates a new iterator for the backward pass.
    pub fn back(&mut self) -> BackIter<'_> {
        BackIter {
            params: &self.params,
            grad: &mut self.grad,
        }
    }
}

/// Yields the parameters and buffers of each layer in forward order.
pub struct FrontIter<'pm> {
    params: &'pm [f32],
    buffers: &'pm mut [f32],
}

impl<'pm> FrontIter<'pm> {
    /// Takes the next `n` parameters and `nbuf` buffer values.
    ///
    /// # Returns
    /// The slices or an error if fewer values than requested are left.
    pub fn take(&mut self, n: usize, nbuf: usize) -> Result<(&'pm [f32], &'pm mut [f32])> {
        if n > self.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "params",
                got: self.params.len(),
                expected: n,
            });
        }

        if nbuf > self.buffers.len() {
            return Err(MlErr::SizeMismatch {
                what: "buffers",
                got: self.buffers.len(),
                expected: nbuf,
            });
        }

        let (params, rest) = self.params.split_at(n);
        self.params = rest;

        let (buffers, rest) = mem::take(&mut self.buffers).split_at_mut(nbuf);
        self.buffers = rest;

        Ok((params, buffers))
    }

    /// Ends the iteration.
    ///
    /// # Returns
    /// An error if the layers didn't consume every value.
    pub fn finish(self) -> Result<()> {
        if !self.params.is_empty() {
            return Err(MlErr::SizeMismatch {
                what: "unused params",
                got: self.params.len(),
                expected: 0,
            });
        }

        if !self.buffers.is_empty() {
            return Err(MlErr::SizeMismatch {
                what: "unused buffers",
                got: self.buffers.len(),
                expected: 0,
            });
        }

        Ok(())
    }
}

/// Yields the parameters and gradient of each layer in reverse order.
pub struct BackIter<'pm> {
    params: &'pm [f32],
    grad: &'pm mut [f32],
}

impl<'pm> BackIter<'pm> {
    /// Takes the last `n` parameters along with their gradient.
    ///
    /// # Returns
    /// The slices or an error if fewer values than requested are left.
    pub fn take(&mut self, n: usize) -> Result<(&'pm [f32], &'pm mut [f32])> {
        let len = self.params.len();

        if n > len {
            return Err(MlErr::SizeMismatch {
                what: "params",
                got: len,
                expected: n,
            });
        }

        let (rest, params) = self.params.split_at(len - n);
        self.params = rest;

        let (rest, grad) = mem::take(&mut self.grad).split_at_mut(len - n);
        self.grad = rest;

        Ok((params, grad))
    }
}
