use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
};

use reducenet::{
    arch::{NetConfig, Variant},
    optimization::LrSchedule,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerErr};

/// The supported datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    #[serde(rename = "cifar10")]
    Cifar10,
    #[serde(rename = "cifar100")]
    Cifar100,
}

impl DatasetKind {
    pub fn num_classes(self) -> usize {
        match self {
            Self::Cifar10 => 10,
            Self::Cifar100 => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cifar10 => "cifar10",
            Self::Cifar100 => "cifar100",
        }
    }

    /// The evaluation batch size used when the config doesn't set one.
    pub fn default_test_batch_size(self) -> usize {
        match self {
            Self::Cifar10 => 512,
            Self::Cifar100 => 128,
        }
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The learning rate schedules selectable from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LrScheduleKind {
    /// Cosine annealing over the whole run.
    #[serde(rename = "cos")]
    Cosine,
    /// Step decay at the `schedule` milestones.
    #[serde(rename = "step")]
    Step,
}

/// Everything a training run is configured with, read from a JSON file.
///
/// Only `expansion` is required, every other field falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    #[serde(default = "defaults::model")]
    pub model: Variant,
    pub expansion: usize,
    #[serde(default = "defaults::width_scaler")]
    pub width_scaler: usize,
    #[serde(default = "defaults::dataset")]
    pub dataset: DatasetKind,
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "defaults::workers")]
    pub workers: usize,
    #[serde(default = "defaults::seed")]
    pub seed: u64,
    #[serde(default = "defaults::optimizer")]
    pub optimizer: LrScheduleKind,
    #[serde(default = "defaults::schedule")]
    pub schedule: Vec<usize>,
    #[serde(default = "defaults::lr")]
    pub lr: f32,
    #[serde(default = "defaults::gamma")]
    pub gamma: f32,
    #[serde(default = "defaults::momentum")]
    pub momentum: f32,
    #[serde(default = "defaults::nesterov")]
    pub nesterov: bool,
    #[serde(default = "defaults::weight_decay")]
    pub weight_decay: f32,
    #[serde(default = "defaults::epochs")]
    pub epochs: usize,
    #[serde(default = "defaults::train_batch_size")]
    pub train_batch_size: usize,
    /// Falls back to the dataset's default when unset.
    #[serde(default)]
    pub test_batch_size: Option<usize>,
    #[serde(default)]
    pub resume: bool,
    #[serde(default = "defaults::checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "defaults::log_every")]
    pub log_every: usize,
}

mod defaults {
    use std::path::PathBuf;

    use super::{DatasetKind, LrScheduleKind, Variant};

    pub fn model() -> Variant {
        Variant::ReduceNet20
    }

    pub fn width_scaler() -> usize {
        1
    }

    pub fn dataset() -> DatasetKind {
        DatasetKind::Cifar10
    }

    pub fn data_dir() -> PathBuf {
        PathBuf::from("./data")
    }

    pub fn workers() -> usize {
        4
    }

    pub fn seed() -> u64 {
        128
    }

    pub fn optimizer() -> LrScheduleKind {
        LrScheduleKind::Cosine
    }

    pub fn schedule() -> Vec<usize> {
        vec![100, 150, 180]
    }

    pub fn lr() -> f32 {
        0.1
    }

    pub fn gamma() -> f32 {
        0.1
    }

    pub fn momentum() -> f32 {
        0.9
    }

    pub fn nesterov() -> bool {
        true
    }

    pub fn weight_decay() -> f32 {
        1e-4
    }

    pub fn epochs() -> usize {
        200
    }

    pub fn train_batch_size() -> usize {
        128
    }

    pub fn checkpoint_dir() -> PathBuf {
        PathBuf::from("./checkpoint")
    }

    pub fn log_every() -> usize {
        50
    }
}

impl TrainConfig {
    /// Parses and validates a config from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the config file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Checks every bound the training loop relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(TrainerErr::InvalidConfig(msg.to_string()));

        if self.expansion == 0 {
            return invalid("expansion must be positive");
        }

        if self.width_scaler == 0 {
            return invalid("width_scaler must be positive");
        }

        if self.epochs == 0 {
            return invalid("epochs must be positive");
        }

        if self.train_batch_size == 0 || self.test_batch_size() == 0 {
            return invalid("batch sizes must be positive");
        }

        if self.workers == 0 {
            return invalid("workers must be positive");
        }

        if self.log_every == 0 {
            return invalid("log_every must be positive");
        }

        if !(self.lr.is_finite() && self.lr > 0.) {
            return invalid("lr must be a positive number");
        }

        if !(0. ..1.).contains(&self.momentum) {
            return invalid("momentum must lie in [0, 1)");
        }

        if self.nesterov && self.momentum == 0. {
            return invalid("nesterov needs a positive momentum");
        }

        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.) {
            return invalid("weight_decay must be a non negative number");
        }

        if self.optimizer == LrScheduleKind::Step && !self.schedule.is_sorted() {
            return invalid("schedule milestones must be increasing");
        }

        Ok(())
    }

    pub fn test_batch_size(&self) -> usize {
        self.test_batch_size
            .unwrap_or_else(|| self.dataset.default_test_batch_size())
    }

    /// The topology of the network to train.
    pub fn net_config(&self) -> NetConfig {
        NetConfig::new(
            self.model.num_blocks(),
            self.dataset.num_classes(),
            self.expansion,
        )
        .with_width_scaler(self.width_scaler)
    }

    pub fn lr_schedule(&self) -> LrSchedule {
        match self.optimizer {
            LrScheduleKind::Cosine => LrSchedule::Cosine { t_max: self.epochs },
            LrScheduleKind::Step => LrSchedule::MultiStep {
                milestones: self.schedule.clone(),
                gamma: self.gamma,
            },
        }
    }

    /// The single file the best model is saved to and resumed from.
    pub fn checkpoint_path(&self) -> PathBuf {
        let name = format!(
            "{}_{}_weight_decay_{}_lr_{}_{}_epoch_ckpt.safetensors",
            self.dataset, self.model, self.weight_decay, self.lr, self.epochs
        );

        self.checkpoint_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_expansion_is_required() {
        let config = TrainConfig::from_json(r#"{ "expansion": 4 }"#).unwrap();

        assert_eq!(config.model, Variant::ReduceNet20);
        assert_eq!(config.dataset, DatasetKind::Cifar10);
        assert_eq!(config.epochs, 200);
        assert_eq!(config.train_batch_size, 128);
        assert_eq!(config.test_batch_size(), 512);
        assert_eq!(config.lr_schedule(), LrSchedule::Cosine { t_max: 200 });
        assert!(config.nesterov);
        assert!(!config.resume);

        assert!(TrainConfig::from_json("{}").is_err());
    }

    #[test]
    fn net_config_follows_model_and_dataset() {
        let json = r#"{ "expansion": 2, "model": "reduce56", "dataset": "cifar100", "width_scaler": 2 }"#;
        let net = TrainConfig::from_json(json).unwrap().net_config();

        assert_eq!(net.num_blocks, [9, 9, 9]);
        assert_eq!(net.num_classes, 100);
        assert_eq!(net.width_scaler, 2);
        assert_eq!(net.expansion, 2);
    }

    #[test]
    fn test_batch_size_defaults_per_dataset() {
        let cifar100 = TrainConfig::from_json(r#"{ "expansion": 1, "dataset": "cifar100" }"#).unwrap();
        assert_eq!(cifar100.test_batch_size(), 128);

        let json = r#"{ "expansion": 1, "dataset": "cifar100", "test_batch_size": 64 }"#;
        assert_eq!(TrainConfig::from_json(json).unwrap().test_batch_size(), 64);

        let json = r#"{ "expansion": 1, "test_batch_size": 0 }"#;
        assert!(TrainConfig::from_json(json).is_err());
    }

    #[test]
    fn step_schedule_uses_the_milestones() {
        let json = r#"{ "expansion": 1, "optimizer": "step", "schedule": [2, 4], "gamma": 0.5 }"#;
        let config = TrainConfig::from_json(json).unwrap();

        assert_eq!(
            config.lr_schedule(),
            LrSchedule::MultiStep {
                milestones: vec![2, 4],
                gamma: 0.5
            }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        for json in [
            r#"{ "expansion": 0 }"#,
            r#"{ "expansion": 1, "epochs": 0 }"#,
            r#"{ "expansion": 1, "lr": -0.1 }"#,
            r#"{ "expansion": 1, "momentum": 1.0 }"#,
            r#"{ "expansion": 1, "model": "reduce32" }"#,
            r#"{ "expansion": 1, "optimizer": "step", "schedule": [5, 3] }"#,
            r#"{ "expansion": 1, "unknown": true }"#,
        ] {
            assert!(TrainConfig::from_json(json).is_err(), "{json}");
        }
    }

    #[test]
    fn checkpoint_name_describes_the_run() {
        let json = r#"{ "expansion": 1, "checkpoint_dir": "ckpt", "epochs": 10 }"#;
        let config = TrainConfig::from_json(json).unwrap();

        assert_eq!(
            config.checkpoint_path(),
            Path::new("ckpt").join("cifar10_reduce20_weight_decay_0.0001_lr_0.1_10_epoch_ckpt.safetensors")
        );
    }
}
