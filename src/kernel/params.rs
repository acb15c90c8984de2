use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaddingValues {
  pub width: usize,
  pub height: usize,
}

/// Per-layer convolution parameters.
///
/// `input_offset` is added to every in-image input sample, so a layer with
/// input zero-point `z` uses `input_offset = -z`. Out-of-image samples
/// always contribute zero after the offset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
  #[serde(default = "one")]
  pub stride_width: usize,
  #[serde(default = "one")]
  pub stride_height: usize,
  #[serde(default = "one")]
  pub dilation_width_factor: usize,
  #[serde(default = "one")]
  pub dilation_height_factor: usize,
  #[serde(default)]
  pub padding_values: PaddingValues,
  #[serde(default)]
  pub input_offset: i32,
  #[serde(default)]
  pub output_offset: i32,
  #[serde(default = "activation_min")]
  pub quantized_activation_min: i32,
  #[serde(default = "activation_max")]
  pub quantized_activation_max: i32,
}

fn one() -> usize {
  1
}

fn activation_min() -> i32 {
  i8::MIN as i32
}

fn activation_max() -> i32 {
  i8::MAX as i32
}

impl Default for ConvParams {
  fn default() -> Self {
    Self {
      stride_width: 1,
      stride_height: 1,
      dilation_width_factor: 1,
      dilation_height_factor: 1,
      padding_values: PaddingValues::default(),
      input_offset: 0,
      output_offset: 0,
      quantized_activation_min: activation_min(),
      quantized_activation_max: activation_max(),
    }
  }
}

impl ConvParams {
  pub fn with_stride(mut self, height: usize, width: usize) -> Self {
    self.stride_height = height;
    self.stride_width = width;
    self
  }

  pub fn with_dilation(mut self, height: usize, width: usize) -> Self {
    self.dilation_height_factor = height;
    self.dilation_width_factor = width;
    self
  }

  pub fn with_padding(mut self, height: usize, width: usize) -> Self {
    self.padding_values = PaddingValues { width, height };
    self
  }

  pub fn with_offsets(mut self, input_offset: i32, output_offset: i32) -> Self {
    self.input_offset = input_offset;
    self.output_offset = output_offset;
    self
  }

  pub fn with_activation_range(mut self, min: i32, max: i32) -> Self {
    self.quantized_activation_min = min;
    self.quantized_activation_max = max;
    self
  }
}

/// Per-output-channel requantization multipliers and shifts.
#[derive(Debug, Clone, Copy)]
pub struct PerChannelQuant<'a> {
  pub output_multiplier: &'a [i32],
  pub output_shift: &'a [i32],
}

impl<'a> PerChannelQuant<'a> {
  pub fn new(output_multiplier: &'a [i32], output_shift: &'a [i32]) -> Self {
    Self {
      output_multiplier,
      output_shift,
    }
  }
}
