pub mod accelerator;
pub mod software;

pub use accelerator::AcceleratorBackend;
pub use software::SoftwareBackend;

use crate::error::{shape_mismatch, Result};
use crate::kernel::im2col::{FilterMatrix, LoweredInput};
use crate::profile::CycleCounter;
use crate::quant::{multiply_by_quantized_multiplier, multiply_by_quantized_multiplier_i64};
use std::fmt::Debug;
use std::ops::{Add, Mul};

/// Integer type the dot products are accumulated in.
pub trait Accumulator:
  Copy + Default + PartialEq + Debug + Add<Output = Self> + Mul<Output = Self> + From<i32>
{
  fn add_bias(self, bias: Self) -> Self;

  /// Applies the fixed-point multiplier matching this accumulator width.
  fn requantize(self, multiplier: i32, shift: i32) -> i32;
}

impl Accumulator for i32 {
  fn add_bias(self, bias: Self) -> Self {
    self.saturating_add(bias)
  }

  fn requantize(self, multiplier: i32, shift: i32) -> i32 {
    multiply_by_quantized_multiplier(self, multiplier, shift)
  }
}

impl Accumulator for i64 {
  fn add_bias(self, bias: Self) -> Self {
    self.saturating_add(bias)
  }

  fn requantize(self, multiplier: i32, shift: i32) -> i32 {
    multiply_by_quantized_multiplier_i64(self, multiplier, shift)
  }
}

/// Raw accumulators, one row per output channel and one column per output
/// position of a single batch element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMatrix<A> {
  rows: usize,
  cols: usize,
  data: Vec<A>,
}

impl<A: Accumulator> ResultMatrix<A> {
  pub fn zeros(rows: usize, cols: usize) -> Self {
    Self {
      rows,
      cols,
      data: vec![A::default(); rows * cols],
    }
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn get(&self, channel: usize, pos: usize) -> A {
    self.data[channel * self.cols + pos]
  }

  pub fn set(&mut self, channel: usize, pos: usize, value: A) {
    self.data[channel * self.cols + pos] = value;
  }

  pub fn as_slice(&self) -> &[A] {
    &self.data
  }

  /// First differing `(channel, pos)`, if any.
  pub fn first_mismatch(&self, other: &Self) -> Option<(usize, usize)> {
    if self.rows != other.rows || self.cols != other.cols {
      return Some((0, 0));
    }
    self
      .data
      .iter()
      .zip(other.data.iter())
      .position(|(a, b)| a != b)
      .map(|idx| (idx / self.cols, idx % self.cols))
  }
}

/// Engine producing the result matrix of the 8-bit path.
pub trait MatmulBackend {
  fn name(&self) -> &'static str;

  /// `result[c][p] = sum_k input(group(c), p, k) * filter[k][c]`, where
  /// in-image samples carry `input_offset` and padding contributes zero.
  fn matmul(
    &mut self,
    filter: &FilterMatrix,
    input: &LoweredInput,
    input_offset: i32,
    cycles: &mut CycleCounter,
  ) -> Result<ResultMatrix<i32>>;
}

pub(crate) fn check_operands(filter: &FilterMatrix, input: &LoweredInput) -> Result<()> {
  if filter.rows() != input.cols() {
    return Err(shape_mismatch(format!(
      "filter matrix has {} rows, input windows have {} columns",
      filter.rows(),
      input.cols()
    )));
  }
  if input.groups() == 0 || filter.cols() % input.groups() != 0 {
    return Err(shape_mismatch(format!(
      "{} output channels cannot be split into {} groups",
      filter.cols(),
      input.groups()
    )));
  }
  Ok(())
}

/// Which backend the engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
  Software,
  Accelerator,
}

impl BackendKind {
  pub fn parse(name: &str) -> Option<Self> {
    match name.to_lowercase().as_str() {
      "software" | "sw" => Some(BackendKind::Software),
      "accelerator" | "cfu" | "hw" => Some(BackendKind::Accelerator),
      _ => None,
    }
  }
}
