// Requantization and writeback, shared by every element width and backend.

use super::geometry::ConvGeometry;
use super::params::{ConvParams, PerChannelQuant};
use crate::backend::{Accumulator, ResultMatrix};
use crate::error::{shape_mismatch, Result};
use crate::tensor::TensorMut;

/// Narrow quantized element an output tensor is stored in.
pub trait OutputElement: Copy {
  const MIN: i32;
  const MAX: i32;

  /// Caller guarantees `value` already lies in `MIN..=MAX`.
  fn narrow(value: i32) -> Self;
}

impl OutputElement for i8 {
  const MIN: i32 = i8::MIN as i32;
  const MAX: i32 = i8::MAX as i32;

  fn narrow(value: i32) -> Self {
    value as i8
  }
}

impl OutputElement for i16 {
  const MIN: i32 = i16::MIN as i32;
  const MAX: i32 = i16::MAX as i32;

  fn narrow(value: i32) -> Self {
    value as i16
  }
}

/// Output stage of one layer: zero-point plus activation clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStage {
  pub output_offset: i32,
  pub activation_min: i32,
  pub activation_max: i32,
}

impl OutputStage {
  /// Builds the stage and checks the clamp range fits the element type `O`.
  pub fn new<O: OutputElement>(output_offset: i32, activation_min: i32, activation_max: i32) -> Result<Self> {
    if activation_min > activation_max || activation_min < O::MIN || activation_max > O::MAX {
      return Err(shape_mismatch(format!(
        "activation range [{}, {}] does not fit output range [{}, {}]",
        activation_min,
        activation_max,
        O::MIN,
        O::MAX
      )));
    }
    Ok(Self {
      output_offset,
      activation_min,
      activation_max,
    })
  }

  pub fn from_params<O: OutputElement>(params: &ConvParams) -> Result<Self> {
    Self::new::<O>(
      params.output_offset,
      params.quantized_activation_min,
      params.quantized_activation_max,
    )
  }

  /// Accumulator to stored value for one channel.
  pub fn apply<A: Accumulator>(&self, acc: A, bias: Option<A>, multiplier: i32, shift: i32) -> i32 {
    let acc = match bias {
      Some(b) => acc.add_bias(b),
      None => acc,
    };
    acc
      .requantize(multiplier, shift)
      .saturating_add(self.output_offset)
      .clamp(self.activation_min, self.activation_max)
  }
}

/// Writes one batch element's result matrix into `output`.
pub fn writeback<A, O>(
  geom: &ConvGeometry,
  stage: &OutputStage,
  quant: &PerChannelQuant,
  bias: Option<&[A]>,
  result: &ResultMatrix<A>,
  batch: usize,
  output: &mut TensorMut<O>,
) where
  A: Accumulator,
  O: OutputElement,
{
  for out_y in 0..geom.output_height {
    for out_x in 0..geom.output_width {
      let pos = out_y * geom.output_width + out_x;
      for channel in 0..geom.output_depth {
        let value = stage.apply(
          result.get(channel, pos),
          bias.map(|b| b[channel]),
          quant.output_multiplier[channel],
          quant.output_shift[channel],
        );
        output.set(batch, out_y, out_x, channel, O::narrow(value));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HALF: i32 = 1 << 30;

  #[test]
  fn test_stage_rejects_range_wider_than_element() {
    assert!(OutputStage::new::<i8>(0, -200, 100).is_err());
    assert!(OutputStage::new::<i8>(0, 10, 5).is_err());
    assert!(OutputStage::new::<i16>(0, -200, 100).is_ok());
  }

  #[test]
  fn test_clamp_saturates_at_bounds() {
    let stage = OutputStage::new::<i8>(0, -10, 20).unwrap();
    // identity multiplier
    assert_eq!(stage.apply(1_000i32, None, HALF, 1), 20);
    assert_eq!(stage.apply(-1_000i32, None, HALF, 1), -10);
    assert_eq!(stage.apply(20i32, None, HALF, 1), 20);
    assert_eq!(stage.apply(21i32, None, HALF, 1), 20);
    assert_eq!(stage.apply(-11i32, None, HALF, 1), -10);
  }

  #[test]
  fn test_bias_then_offset() {
    let stage = OutputStage::new::<i8>(-3, -128, 127).unwrap();
    // (40 + 60) / 2 - 3
    assert_eq!(stage.apply(40i32, Some(60), HALF, 0), 47);
    assert_eq!(stage.apply(40i64, Some(60), HALF, 0), 47);
  }

  #[test]
  fn test_deterministic_across_calls() {
    let stage = OutputStage::new::<i16>(0, i16::MIN as i32, i16::MAX as i32).unwrap();
    let first = stage.apply(123_456_789i64, Some(-42), 1_518_500_250, -9);
    for _ in 0..8 {
      assert_eq!(stage.apply(123_456_789i64, Some(-42), 1_518_500_250, -9), first);
    }
  }
}
