pub mod int4;
pub mod multiplier;

pub use int4::unpack_dense_int4_into_int8;
pub use multiplier::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64};
