use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// The widths of the three stages before scaling.
const BASE_WIDTHS: [usize; 3] = [16, 32, 64];

/// The stride of the first block of each stage.
const STAGE_STRIDES: [usize; 3] = [1, 2, 2];

/// The predefined network depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "reduce20")]
    ReduceNet20,
    #[serde(rename = "reduce56")]
    ReduceNet56,
}

impl Variant {
    /// Returns the amount of blocks of each stage.
    pub fn num_blocks(self) -> [usize; 3] {
        match self {
            Self::ReduceNet20 => [3, 3, 3],
            Self::ReduceNet56 => [9, 9, 9],
        }
    }

    /// Returns the variant's short name, as used in checkpoint file names.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReduceNet20 => "reduce20",
            Self::ReduceNet56 => "reduce56",
        }
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The topology of a `ReduceNet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    pub num_blocks: [usize; 3],
    pub num_classes: usize,
    pub width_scaler: usize,
    pub expansion: usize,
}

/// One stage of blocks sharing an output width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub blocks: usize,
    pub width: usize,
    pub stride: usize,
    pub expansion: usize,
}

/// The shape of a single reducible block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub stride: usize,
    pub expansion: usize,
}

impl BlockSpec {
    /// Whether the shortcut needs a projection to match the block's output.
    pub fn needs_projection(&self) -> bool {
        self.stride != 1 || self.in_channels != self.out_channels
    }

    /// The amount of channels after the expansion convolution.
    pub fn expanded_channels(&self) -> usize {
        self.expansion * self.out_channels
    }
}

impl NetConfig {
    /// Creates a new `NetConfig` with the default width.
    pub fn new(num_blocks: [usize; 3], num_classes: usize, expansion: usize) -> Self {
        Self {
            num_blocks,
            num_classes,
            width_scaler: 1,
            expansion,
        }
    }

    /// The 20 layer configuration, three blocks per stage.
    pub fn reducenet20(num_classes: usize, expansion: usize) -> Self {
        Self::new(Variant::ReduceNet20.num_blocks(), num_classes, expansion)
    }

    /// The 56 layer configuration, nine blocks per stage.
    pub fn reducenet56(num_classes: usize, expansion: usize) -> Self {
        Self::new(Variant::ReduceNet56.num_blocks(), num_classes, expansion)
    }

    pub fn with_width_scaler(mut self, width_scaler: usize) -> Self {
        self.width_scaler = width_scaler;
        self
    }

    /// Checks that every dimension of the network is positive.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(MlErr::InvalidConfig(msg.to_string()));

        if self.expansion == 0 {
            return invalid("the expansion factor must be positive");
        }

        if self.num_classes == 0 {
            return invalid("the amount of classes must be positive");
        }

        if self.width_scaler == 0 {
            return invalid("the width scaler must be positive");
        }

        if self.num_blocks.contains(&0) {
            return invalid("every stage needs at least one block");
        }

        Ok(())
    }

    /// The output channels of the stem convolution.
    pub fn stem_width(&self) -> usize {
        BASE_WIDTHS[0] * self.width_scaler
    }

    /// The input features of the classification head.
    pub fn head_width(&self) -> usize {
        BASE_WIDTHS[2] * self.width_scaler
    }

    pub fn stage_specs(&self) -> [StageSpec; 3] {
        std::array::from_fn(|i| StageSpec {
            blocks: self.num_blocks[i],
            width: BASE_WIDTHS[i] * self.width_scaler,
            stride: STAGE_STRIDES[i],
            expansion: self.expansion,
        })
    }

    /// Unrolls the stages into their blocks, one `Vec` per stage.
    ///
    /// The first block of a stage takes the previous stage's width at the stage's stride, the
    /// rest keep the stage width at stride 1.
    pub fn block_specs(&self) -> Vec<Vec<BlockSpec>> {
        self.stage_specs()
            .into_iter()
            .scan(self.stem_width(), |in_width, stage| {
                let blocks: Vec<_> = (0..stage.blocks)
                    .map(|i| BlockSpec {
                        in_channels: if i == 0 { *in_width } else { stage.width },
                        out_channels: stage.width,
                        stride: if i == 0 { stage.stride } else { 1 },
                        expansion: stage.expansion,
                    })
                    .collect();

                *in_width = stage.width;
                Some(blocks)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_double_the_width_and_halve_the_resolution() {
        let specs = NetConfig::reducenet20(10, 4).with_width_scaler(2).stage_specs();

        let widths: Vec<_> = specs.iter().map(|s| s.width).collect();
        let strides: Vec<_> = specs.iter().map(|s| s.stride).collect();

        assert_eq!(widths, [32, 64, 128]);
        assert_eq!(strides, [1, 2, 2]);
        assert!(specs.iter().all(|s| s.blocks == 3 && s.expansion == 4));
    }

    #[test]
    fn only_stage_transitions_need_projections() {
        let stages = NetConfig::reducenet20(10, 2).block_specs();

        let projections: Vec<Vec<bool>> = stages
            .iter()
            .map(|blocks| blocks.iter().map(BlockSpec::needs_projection).collect())
            .collect();

        assert_eq!(
            projections,
            [
                [false, false, false],
                [true, false, false],
                [true, false, false]
            ]
        );

        assert_eq!(stages[1][0].in_channels, 16);
        assert_eq!(stages[1][0].out_channels, 32);
        assert_eq!(stages[2][0].stride, 2);
        assert_eq!(stages[2][1].in_channels, 64);
        assert_eq!(stages[2][1].expanded_channels(), 128);
    }

    #[test]
    fn deep_variant_has_nine_blocks_per_stage() {
        let config = NetConfig::reducenet56(100, 3);

        assert!(config.block_specs().iter().all(|stage| stage.len() == 9));
        assert_eq!(config.expansion, 3);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(NetConfig::reducenet20(10, 0).validate().is_err());
        assert!(NetConfig::reducenet20(0, 1).validate().is_err());
        assert!(NetConfig::new([3, 0, 3], 10, 1).validate().is_err());
        assert!(NetConfig::reducenet20(10, 1).with_width_scaler(0).validate().is_err());
        assert!(NetConfig::reducenet56(10, 1).validate().is_ok());
    }

    #[test]
    fn variants_serialize_to_short_names() {
        assert_eq!(Variant::ReduceNet56.to_string(), "reduce56");
        assert_eq!(Variant::ReduceNet20.num_blocks(), [3, 3, 3]);
    }
}
