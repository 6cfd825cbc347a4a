use std::{cell::RefCell, rc::Rc};

use log::debug;
use ndarray::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    ActFn, Forward, Mode, NetConfig, ReducibleBlock,
    layers::{BatchNorm2d, Conv2d, GlobalAvgPool, LayerRef, Linear, init_store},
};
use crate::{MlErr, Result, gating::Gate, params::ParamStore};

const INPUT_CHANNELS: usize = 3;

/// A snapshot of everything a `ReduceNet` learns or tracks: parameters, batch norm statistics
/// and the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetState {
    pub params: Vec<f32>,
    pub buffers: Vec<f32>,
    pub gate: Gate,
}

/// A CIFAR residual network built from three stages of reducible blocks.
///
/// The network owns the single gate of all of its blocks. It starts open and is only changed
/// through `set_gate` between passes; each forward pass hands the same value to every block.
#[derive(Debug, Clone)]
pub struct ReduceNet {
    config: NetConfig,
    gate: Gate,
    stem: Conv2d,
    stem_norm: BatchNorm2d,
    stages: Vec<Vec<ReducibleBlock>>,
    pool: GlobalAvgPool,
    head: Linear,
    store: ParamStore,

    // Forward metadata
    stem_z: Array4<f32>,
}

impl ReduceNet {
    /// Creates a new `ReduceNet` with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `config` - The topology of the network.
    /// * `rng` - The source of randomness for the initialization.
    ///
    /// # Returns
    /// The network or an error if `config` has a zero dimension.
    pub fn new<R: Rng + 'static>(config: NetConfig, rng: R) -> Result<Self> {
        config.validate()?;

        let stem_width = config.stem_width();
        let stages: Vec<Vec<_>> = config
            .block_specs()
            .into_iter()
            .map(|specs| specs.into_iter().map(ReducibleBlock::new).collect())
            .collect();

        let mut net = Self {
            stem: Conv2d::conv3x3(INPUT_CHANNELS, stem_width, 1),
            stem_norm: BatchNorm2d::new(stem_width),
            stages,
            pool: GlobalAvgPool::new(),
            head: Linear::new((config.head_width(), config.num_classes)),
            store: ParamStore::new(Vec::new(), Vec::new()),
            gate: Gate::OPEN,
            stem_z: Array4::zeros((0, 0, 0, 0)),
            config,
        };

        let rng = Rc::new(RefCell::new(rng));
        let store = init_store(&net.layers(), &rng)?;
        net.store = store;

        debug!(
            "built a {:?} network with {} parameters",
            net.config.num_blocks,
            net.num_params()
        );

        Ok(net)
    }

    /// The 20 layer network, three blocks per stage.
    pub fn reducenet20<R: Rng + 'static>(num_classes: usize, expansion: usize, rng: R) -> Result<Self> {
        Self::new(NetConfig::reducenet20(num_classes, expansion), rng)
    }

    /// The 56 layer network, nine blocks per stage.
    pub fn reducenet56<R: Rng + 'static>(num_classes: usize, expansion: usize, rng: R) -> Result<Self> {
        Self::new(NetConfig::reducenet56(num_classes, expansion), rng)
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Sets the gate every block observes from the next forward pass on.
    ///
    /// # Returns
    /// An error if `value` is NaN or lies outside `[0, 1]`, leaving the current gate untouched.
    pub fn set_gate(&mut self, value: f32) -> Result<()> {
        self.gate = Gate::new(value)?;
        Ok(())
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    /// Whether the gate is fully closed, so every block's first nonlinearity is the identity.
    pub fn is_reduced(&self) -> bool {
        self.gate.is_closed()
    }

    /// Returns the amount of trainable parameters.
    pub fn num_params(&self) -> usize {
        self.store.params().len()
    }

    /// Computes the logits of a batch of images.
    ///
    /// # Arguments
    /// * `x` - The images, of shape `[N, 3, H, W]`.
    /// * `mode` - Whether batch norms use and update batch statistics or use running ones.
    ///
    /// # Returns
    /// The logits of shape `[N, num_classes]`.
    pub fn forward(&mut self, x: ArrayView4<f32>, mode: Mode) -> Result<Array2<f32>> {
        let (n, c, h, w) = x.dim();

        if c != INPUT_CHANNELS {
            return Err(MlErr::ShapeMismatch {
                what: "network input channels",
                got: vec![n, c, h, w],
                expected: vec![n, INPUT_CHANNELS, h, w],
            });
        }

        if n * h * w == 0 {
            return Err(MlErr::EmptyBatch("network input"));
        }

        let fwd = Forward::new(self.gate, mode);
        let mut front = self.store.front();

        let (params, _) = front.take(self.stem.size(), 0)?;
        let z = self.stem.forward(params, x)?;
        let (params, buffers) = front.take(self.stem_norm.size(), self.stem_norm.buffer_size())?;
        let z = self.stem_norm.forward(params, buffers, z.view(), mode)?;

        let mut out = ActFn::relu().forward(z.view());
        for block in self.stages.iter_mut().flatten() {
            out = block.forward(&fwd, &mut front, out.view())?;
        }

        let pooled = self.pool.forward(out.view())?;
        let (params, _) = front.take(self.head.size(), 0)?;
        let logits = self.head.forward(params, pooled.view())?;
        front.finish()?;

        self.stem_z = z;
        Ok(logits)
    }

    /// Accumulates the gradient of every parameter given the delta of the last forward's
    /// logits.
    pub fn backward(&mut self, d_logits: ArrayView2<f32>) -> Result<()> {
        let mut back = self.store.back();

        let (params, grad) = back.take(self.head.size())?;
        let d = self.head.backward(params, grad, d_logits)?;
        let mut d = self.pool.backward(d.view())?;

        for block in self.stages.iter_mut().flatten().rev() {
            d = block.backward(&mut back, d.view())?;
        }

        let d = ActFn::relu().backward(self.stem_z.view(), d);
        let (params, grad) = back.take(self.stem_norm.size())?;
        let d = self.stem_norm.backward(params, grad, d.view())?;
        let (params, grad) = back.take(self.stem.size())?;
        self.stem.backward(params, grad, d.view())?;

        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.store.zero_grad();
    }

    /// Gives the optimizer access to the parameters and their accumulated gradient.
    pub fn params_and_grad_mut(&mut self) -> (&mut [f32], &[f32]) {
        self.store.params_and_grad_mut()
    }

    /// Takes a snapshot of the network, gate included.
    pub fn state(&self) -> NetState {
        NetState {
            params: self.store.params().to_vec(),
            buffers: self.store.buffers().to_vec(),
            gate: self.gate,
        }
    }

    /// Restores a snapshot taken from a network of the same configuration.
    pub fn load_state(&mut self, state: &NetState) -> Result<()> {
        self.store.load(&state.params, &state.buffers)?;
        self.gate = state.gate;
        Ok(())
    }

    /// Returns every parameterized layer in the order they consume the parameter store.
    pub fn layers(&self) -> Vec<LayerRef<'_>> {
        let mut layers = vec![LayerRef::Conv(&self.stem), LayerRef::Norm(&self.stem_norm)];
        layers.extend(self.stages.iter().flatten().flat_map(ReducibleBlock::layers));
        layers.push(LayerRef::Linear(&self.head));
        layers
    }

    /// Describes the network layer by layer with the parameter count of each.
    pub fn summary(&self) -> String {
        let NetConfig {
            num_blocks,
            num_classes,
            width_scaler,
            expansion,
        } = &self.config;

        let mut lines = vec![format!(
            "ReduceNet(blocks={num_blocks:?}, classes={num_classes}, width_scaler={width_scaler}, expansion={expansion})"
        )];

        lines.extend(
            self.layers()
                .iter()
                .map(|layer| format!("  {:<52}{:>10}", layer.to_string(), layer.size())),
        );

        lines.push(format!(
            "  {:<52}{:>10}",
            "total trainable parameters",
            self.num_params()
        ));

        lines.join("\n")
    }
}
