use std::{
    cell::RefCell,
    fmt::{self, Display},
    rc::Rc,
};

use rand::Rng;

use super::{BatchNorm2d, Conv2d, Linear};
use crate::{
    Result,
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
    params::ParamStore,
};

/// A borrowed view over any parameterized layer, in the order it consumes the parameter store.
#[derive(Debug, Clone, Copy)]
pub enum LayerRef<'a> {
    Conv(&'a Conv2d),
    Norm(&'a BatchNorm2d),
    Linear(&'a Linear),
}

impl LayerRef<'_> {
    /// Returns the amount of trainable parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv(l) => l.size(),
            Self::Norm(l) => l.size(),
            Self::Linear(l) => l.size(),
        }
    }

    /// Returns the amount of buffer values of the layer.
    pub fn buffer_size(&self) -> usize {
        match self {
            Self::Norm(l) => l.buffer_size(),
            _ => 0,
        }
    }

    /// Builds the generators of the layer's initial parameters, in storage order.
    ///
    /// Convolution and linear weights are drawn from a Kaiming normal distribution, the
    /// linear bias from a standard normal one. Batch norms start as the identity.
    pub fn param_gens<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Vec<Box<dyn ParamGen>>> {
        let gens: Vec<Box<dyn ParamGen>> = match self {
            Self::Conv(l) => vec![Box::new(RandParamGen::kaiming(
                rng.clone(),
                l.size(),
                l.fan_in(),
            )?)],
            Self::Norm(l) => vec![
                Box::new(ConstParamGen::new(1., l.channels())),
                Box::new(ConstParamGen::new(0., l.channels())),
            ],
            Self::Linear(l) => {
                let (fan_in, out) = l.dim();
                vec![
                    Box::new(RandParamGen::kaiming(rng.clone(), fan_in * out, fan_in)?),
                    Box::new(RandParamGen::normal(rng.clone(), out, 0., 1.)?),
                ]
            }
        };

        Ok(gens)
    }

    /// Returns the initial buffers of the layer: a zero running mean and a unit running variance.
    pub fn initial_buffers(&self) -> Vec<f32> {
        match self {
            Self::Norm(l) => [vec![0.; l.channels()], vec![1.; l.channels()]].concat(),
            _ => Vec::new(),
        }
    }
}

/// Samples the initial parameters and buffers of `layers`, in order, into a new store.
pub fn init_store<R: Rng + 'static>(layers: &[LayerRef], rng: &Rc<RefCell<R>>) -> Result<ParamStore> {
    let mut param_gens = Vec::new();
    for layer in layers {
        param_gens.extend(layer.param_gens(rng)?);
    }

    let size = layers.iter().map(LayerRef::size).sum();
    let params = ChainedParamGen::new(param_gens).sample_exact(size)?;
    let buffers = layers.iter().flat_map(LayerRef::initial_buffers).collect();

    Ok(ParamStore::new(params, buffers))
}

impl Display for LayerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conv(l) => l.fmt(f),
            Self::Norm(l) => l.fmt(f),
            Self::Linear(l) => l.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn generators_cover_each_layer() {
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(7)));
        let conv = Conv2d::conv3x3(3, 4, 1);
        let norm = BatchNorm2d::new(4);
        let linear = Linear::new((4, 2));

        for layer in [
            LayerRef::Conv(&conv),
            LayerRef::Norm(&norm),
            LayerRef::Linear(&linear),
        ] {
            let mut param_gen = ChainedParamGen::new(layer.param_gens(&rng).unwrap());
            assert_eq!(param_gen.sample_exact(layer.size()).unwrap().len(), layer.size());
            assert!(param_gen.sample(1).is_none());
        }
    }

    #[test]
    fn batch_norm_starts_as_identity() {
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(7)));
        let norm = BatchNorm2d::new(2);
        let layer = LayerRef::Norm(&norm);

        let mut param_gen = ChainedParamGen::new(layer.param_gens(&rng).unwrap());
        assert_eq!(param_gen.sample_exact(4).unwrap(), [1., 1., 0., 0.]);
        assert_eq!(layer.initial_buffers(), [0., 0., 1., 1.]);
        assert_eq!(LayerRef::Conv(&Conv2d::conv1x1(2, 2, 1)).buffer_size(), 0);
    }

    #[test]
    fn store_holds_every_layer() {
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(7)));
        let conv = Conv2d::conv3x3(3, 4, 1);
        let norm = BatchNorm2d::new(4);

        let store = init_store(&[LayerRef::Conv(&conv), LayerRef::Norm(&norm)], &rng).unwrap();

        assert_eq!(store.params().len(), 3 * 9 * 4 + 8);
        assert_eq!(&store.params()[108..], [1., 1., 1., 1., 0., 0., 0., 0.]);
        assert_eq!(store.buffers(), [0., 0., 0., 0., 1., 1., 1., 1.]);
        assert!(store.grad().iter().all(|&g| g == 0.));
    }
}
