// Per-channel quantized convolution entry points.
//
// Each batch element runs lowering, one multiply phase and writeback before
// the next one starts. All shape and quantization checks happen up front.

use super::geometry::ConvGeometry;
use super::im2col::{lower_filter, lower_input};
use super::params::{ConvParams, PerChannelQuant};
use super::requant::{writeback, OutputStage};
use crate::backend::{MatmulBackend, SoftwareBackend};
use crate::error::Result;
use crate::profile::Profiler;
use crate::quant::unpack_dense_int4_into_int8;
use crate::tensor::{RuntimeShape, Tensor, TensorMut};
use std::ops::RangeInclusive;

const SHIFT_RANGE_I8: RangeInclusive<i32> = -31..=30;
const SHIFT_RANGE_I16: RangeInclusive<i32> = -31..=7;

/// Largest |i8| and |i16| operand magnitudes.
const I8_MAGNITUDE: i64 = 128;
const I16_MAGNITUDE: i64 = 32768;

/// The i64 requantization keeps |acc| below 2^47.
const I64_ACC_LIMIT: i64 = 1 << 47;

fn bias_len<T>(bias: Option<&[T]>) -> Option<usize> {
  bias.map(|b| b.len())
}

fn max_abs_bias<T: Copy + Into<i64>>(bias: Option<&[T]>) -> i64 {
  let max = bias
    .unwrap_or(&[])
    .iter()
    .map(|&b| {
      let wide: i64 = b.into();
      wide.unsigned_abs()
    })
    .max()
    .unwrap_or(0);
  max.min(i64::MAX as u64) as i64
}

/// Accumulator bound of the 8-bit path: offset samples times i8 weights,
/// plus bias, must stay inside i32. Every caller that multiplies i8
/// operands runs this before lowering.
pub fn check_i8_accumulation(geom: &ConvGeometry, input_offset: i32, bias: Option<&[i32]>) -> Result<()> {
  let max_term = (I8_MAGNITUDE + input_offset.unsigned_abs() as i64) * I8_MAGNITUDE;
  geom.check_accumulation(max_term, max_abs_bias(bias), i32::MAX as i64)
}

/// 8-bit input, 8-bit filter, 32-bit bias and accumulator.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel(
  params: &ConvParams,
  quant: &PerChannelQuant,
  input: &Tensor<i8>,
  filter: &Tensor<i8>,
  bias: Option<&[i32]>,
  output: &mut TensorMut<i8>,
  backend: &mut dyn MatmulBackend,
  profiler: &mut Profiler,
) -> Result<()> {
  let geom = ConvGeometry::new(params, input.shape(), filter.shape(), bias_len(bias), output.shape())?;
  geom.check_quant(quant, SHIFT_RANGE_I8)?;
  check_i8_accumulation(&geom, params.input_offset, bias)?;
  let stage = OutputStage::from_params::<i8>(params)?;

  let lowered_filter = lower_filter(&geom, filter);
  for batch in 0..geom.batches {
    let lowered_input = lower_input(&geom, input, batch);
    let result =
      profiler.measure(|cycles| backend.matmul(&lowered_filter, &lowered_input, params.input_offset, cycles))?;
    writeback(&geom, &stage, quant, bias, &result, batch, output);
    log::debug!("{} backend: batch {} of {} written", backend.name(), batch + 1, geom.batches);
  }
  Ok(())
}

/// 16-bit input, 8-bit filter, 64-bit bias and accumulator.
///
/// The 16-bit scheme is symmetric: `input_offset` and `output_offset` are
/// ignored. Always runs on the software backend.
pub fn conv_per_channel_i16(
  params: &ConvParams,
  quant: &PerChannelQuant,
  input: &Tensor<i16>,
  filter: &Tensor<i8>,
  bias: Option<&[i64]>,
  output: &mut TensorMut<i16>,
  profiler: &mut Profiler,
) -> Result<()> {
  let geom = ConvGeometry::new(params, input.shape(), filter.shape(), bias_len(bias), output.shape())?;
  geom.check_quant(quant, SHIFT_RANGE_I16)?;
  geom.check_accumulation(I16_MAGNITUDE * I8_MAGNITUDE, max_abs_bias(bias), I64_ACC_LIMIT)?;
  let stage = OutputStage::new::<i16>(0, params.quantized_activation_min, params.quantized_activation_max)?;

  let lowered_filter = lower_filter(&geom, filter);
  for batch in 0..geom.batches {
    let lowered_input = lower_input(&geom, input, batch);
    let result = profiler.measure(|cycles| {
      SoftwareBackend::multiply::<i64>(&lowered_filter, &lowered_input, 0, cycles)
    })?;
    writeback(&geom, &stage, quant, bias, &result, batch, output);
  }
  Ok(())
}

/// 8-bit path over a filter packed two int4 values per byte.
#[allow(clippy::too_many_arguments)]
pub fn conv_per_channel_packed_int4(
  params: &ConvParams,
  quant: &PerChannelQuant,
  input: &Tensor<i8>,
  filter_shape: &RuntimeShape,
  packed_filter: &[i8],
  bias: Option<&[i32]>,
  output: &mut TensorMut<i8>,
  backend: &mut dyn MatmulBackend,
  profiler: &mut Profiler,
) -> Result<()> {
  let unpacked = unpack_dense_int4_into_int8(packed_filter, filter_shape.flat_size())?;
  let filter = Tensor::new(filter_shape, &unpacked)?;
  conv_per_channel(params, quant, input, &filter, bias, output, backend, profiler)
}
