use ndarray::{Array, ArrayView, Dimension};

use super::{GatedRelu, Relu};
use crate::gating::Gate;

/// The activations used inside the network.
#[derive(Clone, Copy, Debug)]
pub enum ActFn {
    Relu(Relu),
    Gated(GatedRelu),
}

impl ActFn {
    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn gated(gate: Gate) -> Self {
        Self::Gated(GatedRelu::new(gate))
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.f(x),
            Self::Gated(a) => a.f(x),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Relu(a) => a.df(x),
            Self::Gated(a) => a.df(x),
        }
    }

    /// Applies the activation element-wise.
    pub fn forward<D: Dimension>(&self, z: ArrayView<f32, D>) -> Array<f32, D> {
        z.mapv(|z| self.f(z))
    }

    /// Multiplies the incoming delta by the activation's derivative at the pre-activation `z`.
    pub fn backward<D: Dimension>(
        &self,
        z: ArrayView<f32, D>,
        mut d: Array<f32, D>,
    ) -> Array<f32, D> {
        d.zip_mut_with(&z, |d, &z| *d *= self.df(z));
        d
    }
}
