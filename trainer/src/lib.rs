//! The training driver of `reducenet`: CIFAR loading and augmentation, the epoch loop with its
//! gate and learning rate schedules, evaluation and checkpointing.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod training;

pub use config::TrainConfig;
pub use error::TrainerErr;
pub use training::Trainer;
