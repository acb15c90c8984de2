pub mod conv;
pub mod geometry;
pub mod im2col;
pub mod params;
pub mod requant;

pub use conv::{conv_per_channel, conv_per_channel_i16, conv_per_channel_packed_int4};
pub use geometry::ConvGeometry;
pub use params::{ConvParams, PaddingValues, PerChannelQuant};
pub use requant::{writeback, OutputElement, OutputStage};
