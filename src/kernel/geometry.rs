use super::params::{ConvParams, PerChannelQuant};
use crate::error::{shape_mismatch, ConvError, Result};
use crate::tensor::RuntimeShape;
use std::ops::RangeInclusive;

/// Validated dimensions of one convolution call.
///
/// Built once per invocation before any lowering happens; everything
/// downstream indexes with these values and never re-checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvGeometry {
  pub batches: usize,
  pub input_height: usize,
  pub input_width: usize,
  pub input_depth: usize,
  pub filter_height: usize,
  pub filter_width: usize,
  pub filter_input_depth: usize,
  pub output_height: usize,
  pub output_width: usize,
  pub output_depth: usize,
  pub groups: usize,
  pub filters_per_group: usize,
  pub stride_height: usize,
  pub stride_width: usize,
  pub dilation_height: usize,
  pub dilation_width: usize,
  pub pad_height: usize,
  pub pad_width: usize,
}

impl ConvGeometry {
  pub fn new(
    params: &ConvParams,
    input_shape: &RuntimeShape,
    filter_shape: &RuntimeShape,
    bias_len: Option<usize>,
    output_shape: &RuntimeShape,
  ) -> Result<Self> {
    if params.quantized_activation_min > params.quantized_activation_max {
      return Err(shape_mismatch(format!(
        "activation range [{}, {}] is empty",
        params.quantized_activation_min, params.quantized_activation_max
      )));
    }
    if params.stride_height == 0 || params.stride_width == 0 {
      return Err(shape_mismatch("stride must be at least 1"));
    }
    if params.dilation_height_factor == 0 || params.dilation_width_factor == 0 {
      return Err(shape_mismatch("dilation must be at least 1"));
    }

    input_shape.require_rank(4, "input")?;
    filter_shape.require_rank(4, "filter")?;
    output_shape.require_rank(4, "output")?;

    let batches = input_shape.matching_dim(0, output_shape, 0)?;
    let output_depth = filter_shape.matching_dim(0, output_shape, 3)?;
    if let Some(len) = bias_len {
      if len != output_depth {
        return Err(shape_mismatch(format!(
          "bias has {} entries for {} output channels",
          len, output_depth
        )));
      }
    }

    let input_depth = input_shape.dims(3);
    let filter_input_depth = filter_shape.dims(3);
    if filter_input_depth == 0 || input_depth % filter_input_depth != 0 {
      return Err(shape_mismatch(format!(
        "input depth {} is not a multiple of filter depth {}",
        input_depth, filter_input_depth
      )));
    }
    let groups = input_depth / filter_input_depth;
    if output_depth % groups != 0 {
      return Err(shape_mismatch(format!(
        "output depth {} is not a multiple of group count {}",
        output_depth, groups
      )));
    }

    Ok(Self {
      batches,
      input_height: input_shape.dims(1),
      input_width: input_shape.dims(2),
      input_depth,
      filter_height: filter_shape.dims(1),
      filter_width: filter_shape.dims(2),
      filter_input_depth,
      output_height: output_shape.dims(1),
      output_width: output_shape.dims(2),
      output_depth,
      groups,
      filters_per_group: output_depth / groups,
      stride_height: params.stride_height,
      stride_width: params.stride_width,
      dilation_height: params.dilation_height_factor,
      dilation_width: params.dilation_width_factor,
      pad_height: params.padding_values.height,
      pad_width: params.padding_values.width,
    })
  }

  /// Length of one flattened (input channel, kernel row, kernel col) window.
  pub fn kernel_volume(&self) -> usize {
    self.filter_input_depth * self.filter_height * self.filter_width
  }

  pub fn output_positions(&self) -> usize {
    self.output_height * self.output_width
  }

  pub fn group_of(&self, out_channel: usize) -> usize {
    out_channel / self.filters_per_group
  }

  /// Every output channel needs a multiplier and a shift in `shifts`.
  pub fn check_quant(&self, quant: &PerChannelQuant, shifts: RangeInclusive<i32>) -> Result<()> {
    let channels = self.output_depth;
    if quant.output_multiplier.len() < channels || quant.output_shift.len() < channels {
      return Err(shape_mismatch(format!(
        "{} multipliers / {} shifts for {} output channels",
        quant.output_multiplier.len(),
        quant.output_shift.len(),
        channels
      )));
    }
    if let Some(bad) = quant.output_multiplier[..channels].iter().find(|m| **m < 0) {
      return Err(shape_mismatch(format!("output multiplier {} is negative", bad)));
    }
    if let Some(bad) = quant.output_shift[..channels].iter().find(|s| !shifts.contains(*s)) {
      return Err(shape_mismatch(format!("output shift {} outside {:?}", bad, shifts)));
    }
    Ok(())
  }

  /// Rejects problems whose worst-case dot product plus bias exceeds `limit`.
  pub fn check_accumulation(&self, max_term: i64, max_bias: i64, limit: i64) -> Result<()> {
    let worst = (self.kernel_volume() as i64)
      .saturating_mul(max_term)
      .saturating_add(max_bias);
    if worst > limit {
      return Err(ConvError::AccumulatorOverflow(format!(
        "kernel volume {} with per-term bound {} and bias bound {} can reach {}, limit is {}",
        self.kernel_volume(),
        max_term,
        max_bias,
        worst,
        limit
      )));
    }
    Ok(())
  }
}
