pub mod shape;
pub mod view;

pub use shape::RuntimeShape;
pub use view::{Tensor, TensorMut};
