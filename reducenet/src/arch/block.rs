use ndarray::prelude::*;

use super::{
    ActFn, BlockSpec, Forward,
    layers::{BatchNorm2d, Conv2d, LayerRef},
};
use crate::{
    MlErr, Result,
    params::{BackIter, FrontIter},
};

/// A residual block whose first nonlinearity is blended with the identity by the gate.
///
/// ```text
/// x ─ conv3x3/s ─ bn ─ gated relu ─ conv1x1 ─ bn ─ relu ─ conv3x3 ─ bn ─ (+) ─ out
///  └──────────────────────── shortcut (conv1x1/s ─ bn) ─────────────────┘
/// ```
///
/// Once the gate is `0` the expansion and reduction convolutions compose linearly and the
/// block can be folded into a plain two convolution block.
#[derive(Debug, Clone)]
pub struct ReducibleBlock {
    spec: BlockSpec,
    expand: Conv2d,
    expand_norm: BatchNorm2d,
    reduce: Conv2d,
    reduce_norm: BatchNorm2d,
    conv: Conv2d,
    conv_norm: BatchNorm2d,
    shortcut: Option<(Conv2d, BatchNorm2d)>,

    // Forward metadata
    act: ActFn,
    a: Array4<f32>,
    r: Array4<f32>,
}

impl ReducibleBlock {
    pub fn new(spec: BlockSpec) -> Self {
        let BlockSpec {
            in_channels,
            out_channels,
            stride,
            ..
        } = spec;
        let hidden = spec.expanded_channels();

        let shortcut = spec.needs_projection().then(|| {
            (
                Conv2d::conv1x1(in_channels, out_channels, stride),
                BatchNorm2d::new(out_channels),
            )
        });

        Self {
            spec,
            expand: Conv2d::conv3x3(in_channels, hidden, stride),
            expand_norm: BatchNorm2d::new(hidden),
            reduce: Conv2d::conv1x1(hidden, out_channels, 1),
            reduce_norm: BatchNorm2d::new(out_channels),
            conv: Conv2d::conv3x3(out_channels, out_channels, 1),
            conv_norm: BatchNorm2d::new(out_channels),
            shortcut,
            act: ActFn::relu(),
            a: Array4::zeros((0, 0, 0, 0)),
            r: Array4::zeros((0, 0, 0, 0)),
        }
    }

    /// Returns the block's layers in the order they consume the parameter store.
    pub fn layers(&self) -> Vec<LayerRef<'_>> {
        let mut layers = vec![
            LayerRef::Conv(&self.expand),
            LayerRef::Norm(&self.expand_norm),
            LayerRef::Conv(&self.reduce),
            LayerRef::Norm(&self.reduce_norm),
            LayerRef::Conv(&self.conv),
            LayerRef::Norm(&self.conv_norm),
        ];

        if let Some((conv, norm)) = &self.shortcut {
            layers.extend([LayerRef::Conv(conv), LayerRef::Norm(norm)]);
        }

        layers
    }

    /// Runs the block over `x` of shape `[N, C_in, H, W]`.
    ///
    /// # Arguments
    /// * `fwd` - The pass context holding the gate and the batch norm mode.
    /// * `front` - The parameter store iterator, positioned at this block's first layer.
    /// * `x` - The input.
    ///
    /// # Returns
    /// The output of shape `[N, C_out, H', W']` or an error if `x` has the wrong channel count.
    pub fn forward(
        &mut self,
        fwd: &Forward,
        front: &mut FrontIter,
        x: ArrayView4<f32>,
    ) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();

        if c != self.spec.in_channels {
            return Err(MlErr::ShapeMismatch {
                what: "block input channels",
                got: vec![n, c, h, w],
                expected: vec![n, self.spec.in_channels, h, w],
            });
        }

        let act = ActFn::gated(fwd.gate);

        let (params, _) = front.take(self.expand.size(), 0)?;
        let a = self.expand.forward(params, x)?;
        let a = norm_forward(&mut self.expand_norm, front, a.view(), fwd)?;

        let (params, _) = front.take(self.reduce.size(), 0)?;
        let r = self.reduce.forward(params, act.forward(a.view()).view())?;
        let r = norm_forward(&mut self.reduce_norm, front, r.view(), fwd)?;

        let (params, _) = front.take(self.conv.size(), 0)?;
        let out = self.conv.forward(params, ActFn::relu().forward(r.view()).view())?;
        let mut out = norm_forward(&mut self.conv_norm, front, out.view(), fwd)?;

        match &mut self.shortcut {
            Some((conv, norm)) => {
                let (params, _) = front.take(conv.size(), 0)?;
                let s = conv.forward(params, x)?;
                out += &norm_forward(norm, front, s.view(), fwd)?;
            }
            None => out += &x,
        }

        self.act = act;
        self.a = a;
        self.r = r;
        Ok(out)
    }

    /// Propagates the delta of the block's output through every layer, accumulating their
    /// gradients.
    ///
    /// # Arguments
    /// * `back` - The parameter store iterator, positioned at this block's last layer.
    /// * `d` - The delta of the last forward's output.
    ///
    /// # Returns
    /// The delta of the block's input.
    pub fn backward(&mut self, back: &mut BackIter, d: ArrayView4<f32>) -> Result<Array4<f32>> {
        let d_shortcut = match &mut self.shortcut {
            Some((conv, norm)) => {
                let ds = norm_backward(norm, back, d)?;
                let (params, grad) = back.take(conv.size())?;
                conv.backward(params, grad, ds.view())?
            }
            None => d.to_owned(),
        };

        let d = norm_backward(&mut self.conv_norm, back, d)?;
        let (params, grad) = back.take(self.conv.size())?;
        let d = self.conv.backward(params, grad, d.view())?;
        let d = ActFn::relu().backward(self.r.view(), d);

        let d = norm_backward(&mut self.reduce_norm, back, d.view())?;
        let (params, grad) = back.take(self.reduce.size())?;
        let d = self.reduce.backward(params, grad, d.view())?;
        let d = self.act.backward(self.a.view(), d);

        let d = norm_backward(&mut self.expand_norm, back, d.view())?;
        let (params, grad) = back.take(self.expand.size())?;
        let mut dx = self.expand.backward(params, grad, d.view())?;

        if dx.dim() != d_shortcut.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "block shortcut delta",
                got: d_shortcut.shape().to_vec(),
                expected: dx.shape().to_vec(),
            });
        }

        dx += &d_shortcut;
        Ok(dx)
    }
}

fn norm_forward(
    norm: &mut BatchNorm2d,
    front: &mut FrontIter,
    x: ArrayView4<f32>,
    fwd: &Forward,
) -> Result<Array4<f32>> {
    let (params, buffers) = front.take(norm.size(), norm.buffer_size())?;
    norm.forward(params, buffers, x, fwd.mode)
}

fn norm_backward(
    norm: &mut BatchNorm2d,
    back: &mut BackIter,
    d: ArrayView4<f32>,
) -> Result<Array4<f32>> {
    let (params, grad) = back.take(norm.size())?;
    norm.backward(params, grad, d)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::{Distribution, StandardNormal};

    use super::*;
    use crate::{
        arch::{Mode, layers::init_store},
        gating::Gate,
        params::ParamStore,
    };

    fn block_and_store(spec: BlockSpec) -> (ReducibleBlock, ParamStore) {
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(3)));
        let block = ReducibleBlock::new(spec);
        let store = init_store(&block.layers(), &rng).unwrap();
        (block, store)
    }

    fn random_input(dim: (usize, usize, usize, usize), seed: u64) -> Array4<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array4::from_shape_simple_fn(dim, || StandardNormal.sample(&mut rng))
    }

    fn run(
        block: &mut ReducibleBlock,
        store: &mut ParamStore,
        gate: Gate,
        x: &Array4<f32>,
    ) -> Array4<f32> {
        let fwd = Forward::new(gate, Mode::Train);
        let mut front = store.front();
        let y = block.forward(&fwd, &mut front, x.view()).unwrap();
        front.finish().unwrap();
        y
    }

    fn spec(in_channels: usize, out_channels: usize, stride: usize) -> BlockSpec {
        BlockSpec {
            in_channels,
            out_channels,
            stride,
            expansion: 2,
        }
    }

    #[test]
    fn identity_block_keeps_the_shape() {
        let (mut block, mut store) = block_and_store(spec(16, 16, 1));
        let x = random_input((2, 16, 32, 32), 0);

        let y = run(&mut block, &mut store, Gate::OPEN, &x);

        assert_eq!(y.dim(), (2, 16, 32, 32));
        assert_eq!(block.layers().len(), 6);
    }

    #[test]
    fn downsampling_block_projects_the_shortcut() {
        let (mut block, mut store) = block_and_store(spec(16, 32, 2));
        let x = random_input((2, 16, 32, 32), 0);

        let y = run(&mut block, &mut store, Gate::new(0.5).unwrap(), &x);

        assert_eq!(y.dim(), (2, 32, 16, 16));
        assert_eq!(block.layers().len(), 8);
    }

    #[test]
    fn wrong_channels_are_rejected() {
        let (mut block, mut store) = block_and_store(spec(4, 4, 1));
        let x = random_input((1, 3, 4, 4), 0);
        let fwd = Forward::new(Gate::OPEN, Mode::Train);

        assert!(block.forward(&fwd, &mut store.front(), x.view()).is_err());
    }

    #[test]
    fn output_depends_on_the_gate() {
        let (mut block, mut store) = block_and_store(spec(4, 4, 1));
        let x = random_input((2, 4, 6, 6), 1);

        let open = run(&mut block, &mut store, Gate::OPEN, &x);
        let again = run(&mut block, &mut store, Gate::OPEN, &x);
        let closed = run(&mut block, &mut store, Gate::CLOSED, &x);

        assert_eq!(open, again);
        assert!(open.iter().zip(&closed).any(|(a, b)| (a - b).abs() > 1e-4));
    }

    #[test]
    fn backward_consumes_every_parameter() {
        let (mut block, mut store) = block_and_store(spec(4, 8, 2));
        let x = random_input((2, 4, 6, 6), 2);

        let y = run(&mut block, &mut store, Gate::new(0.3).unwrap(), &x);
        let d = random_input(y.dim(), 3);

        let mut back = store.back();
        let dx = block.backward(&mut back, d.view()).unwrap();
        assert!(back.take(1).is_err());
        assert_eq!(dx.dim(), x.dim());

        let mut offset = 0;
        for layer in block.layers() {
            let grad = &store.grad()[offset..offset + layer.size()];
            assert!(grad.iter().any(|&g| g != 0.), "no gradient for {layer}");
            offset += layer.size();
        }
    }
}
