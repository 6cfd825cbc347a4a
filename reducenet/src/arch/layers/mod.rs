mod batch_norm;
mod conv;
mod layer;
mod linear;
mod pool;

use std::borrow::Cow;

use ndarray::{ArrayView, Dimension};

pub use batch_norm::BatchNorm2d;
pub use conv::Conv2d;
pub use layer::{LayerRef, init_store};
pub use linear::Linear;
pub use pool::GlobalAvgPool;

/// Returns the elements of `x` in row-major order, copying only when `x` isn't laid out that way.
fn row_major<'a, D: Dimension>(x: &'a ArrayView<'_, f32, D>) -> Cow<'a, [f32]> {
    match x.as_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => Cow::Owned(x.iter().copied().collect()),
    }
}
