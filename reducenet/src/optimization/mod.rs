mod lr_schedule;
mod optimizer;
mod sgd;

pub use lr_schedule::LrSchedule;
pub use optimizer::Optimizer;
pub use sgd::Sgd;
