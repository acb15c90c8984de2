// Reference matrix multiply, the oracle for the accelerator path.

use super::{check_operands, Accumulator, MatmulBackend, ResultMatrix};
use crate::error::Result;
use crate::kernel::im2col::{FilterMatrix, LoweredInput};
use crate::profile::CycleCounter;

#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl SoftwareBackend {
  pub fn new() -> Self {
    Self
  }

  /// Dot products accumulated in `A`; one estimated cycle per MAC.
  pub fn multiply<A: Accumulator>(
    filter: &FilterMatrix,
    input: &LoweredInput,
    input_offset: i32,
    cycles: &mut CycleCounter,
  ) -> Result<ResultMatrix<A>> {
    check_operands(filter, input)?;

    let channels = filter.cols();
    let positions = input.rows();
    let kernel_volume = filter.rows();
    let filters_per_group = channels / input.groups();

    let mut result = ResultMatrix::zeros(channels, positions);
    for channel in 0..channels {
      let group = channel / filters_per_group;
      for pos in 0..positions {
        let mut acc = A::default();
        for k in 0..kernel_volume {
          let sample = A::from(input.value(group, pos, k, input_offset));
          acc = acc + sample * A::from(filter.get(k, channel));
        }
        result.set(channel, pos, acc);
      }
    }

    cycles.add((channels * positions * kernel_volume) as u64);
    Ok(result)
  }
}

impl MatmulBackend for SoftwareBackend {
  fn name(&self) -> &'static str {
    "software"
  }

  fn matmul(
    &mut self,
    filter: &FilterMatrix,
    input: &LoweredInput,
    input_offset: i32,
    cycles: &mut CycleCounter,
  ) -> Result<ResultMatrix<i32>> {
    Self::multiply(filter, input, input_offset, cycles)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::geometry::ConvGeometry;
  use crate::kernel::im2col::{lower_filter, lower_input};
  use crate::kernel::params::ConvParams;
  use crate::tensor::{RuntimeShape, Tensor};

  #[test]
  fn test_textbook_2x2_convolution() {
    let in_shape = RuntimeShape::new(vec![1, 4, 4, 1]);
    let f_shape = RuntimeShape::new(vec![1, 2, 2, 1]);
    let out_shape = RuntimeShape::new(vec![1, 3, 3, 1]);
    let input: Vec<i8> = (1..=16).collect();
    let filter = [1i8, 2, 3, 4];
    let geom = ConvGeometry::new(&ConvParams::default(), &in_shape, &f_shape, None, &out_shape).unwrap();

    let lowered_filter = lower_filter(&geom, &Tensor::new(&f_shape, &filter).unwrap());
    let lowered_input = lower_input(&geom, &Tensor::new(&in_shape, &input).unwrap(), 0);
    let mut cycles = CycleCounter::default();
    let result = SoftwareBackend::new()
      .matmul(&lowered_filter, &lowered_input, 0, &mut cycles)
      .unwrap();

    // out(y, x) = in(y,x) + 2 in(y,x+1) + 3 in(y+1,x) + 4 in(y+1,x+1)
    let expected = [44, 54, 64, 84, 94, 104, 124, 134, 144];
    assert_eq!(result.as_slice(), &expected);
    assert_eq!(cycles.cycles(), 9 * 4);
  }

  #[test]
  fn test_wide_accumulator_for_16_bit_samples() {
    let in_shape = RuntimeShape::new(vec![1, 1, 1, 2]);
    let f_shape = RuntimeShape::new(vec![1, 1, 1, 2]);
    let out_shape = RuntimeShape::new(vec![1, 1, 1, 1]);
    let input = [i16::MIN, i16::MIN];
    let filter = [-128i8, -128];
    let geom = ConvGeometry::new(&ConvParams::default(), &in_shape, &f_shape, None, &out_shape).unwrap();

    let lowered_filter = lower_filter(&geom, &Tensor::new(&f_shape, &filter).unwrap());
    let lowered_input = lower_input(&geom, &Tensor::new(&in_shape, &input).unwrap(), 0);
    let result: ResultMatrix<i64> =
      SoftwareBackend::multiply(&lowered_filter, &lowered_input, 0, &mut CycleCounter::default()).unwrap();
    assert_eq!(result.get(0, 0), 2 * 32768 * 128);
  }
}
