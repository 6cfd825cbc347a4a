pub mod activations;
mod block;
mod config;
mod forward;
pub mod layers;
pub mod loss;
mod network;

pub use activations::ActFn;
pub use block::ReducibleBlock;
pub use config::{BlockSpec, NetConfig, StageSpec, Variant};
pub use forward::{Forward, Mode};
pub use network::{NetState, ReduceNet};
