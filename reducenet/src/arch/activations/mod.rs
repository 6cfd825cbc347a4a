mod act_fn;
mod gated;
mod relu;

pub use act_fn::ActFn;
pub use gated::GatedRelu;
pub use relu::Relu;
