// Drives a CFU through the load / compute / drain sequence.
//
// Output channels are tiled in fours inside each group, output positions in
// fours across the whole output plane. Tiles never straddle a group, so every
// channel of a tile reads the same input slab. Short tiles are filled with
// zero filters and padding-flagged inputs; all 16 results are still drained
// and only the in-range ones are stored.

use super::{check_operands, MatmulBackend, ResultMatrix};
use crate::arch::cfu::{Accelerator, Command, PaddingOpcode, TILE};
use crate::error::{shape_mismatch, Result};
use crate::kernel::im2col::{FilterMatrix, LoweredInput};
use crate::profile::CycleCounter;

pub struct AcceleratorBackend<A: Accelerator> {
  device: A,
  commands: u64,
}

impl<A: Accelerator> AcceleratorBackend<A> {
  pub fn new(device: A) -> Self {
    Self { device, commands: 0 }
  }

  pub fn device(&self) -> &A {
    &self.device
  }

  pub fn device_mut(&mut self) -> &mut A {
    &mut self.device
  }

  pub fn into_inner(self) -> A {
    self.device
  }

  /// Commands issued over the lifetime of this backend.
  pub fn commands(&self) -> u64 {
    self.commands
  }

  fn issue(&mut self, cmd: Command, cycles: &mut CycleCounter) -> Result<i32> {
    self.commands += 1;
    cycles.add(1);
    self.device.execute(cmd)
  }

  /// Filter rows for channels `first..first + TILE`, clipped at `end`.
  fn load_filter_tile(
    &mut self,
    filter: &FilterMatrix,
    first: usize,
    end: usize,
    cycles: &mut CycleCounter,
  ) -> Result<()> {
    let value = |channel: usize, k: usize| if channel < end { filter.get(k, channel) } else { 0 };
    for k in 0..filter.rows() {
      for pair in (0..TILE).step_by(2) {
        let values = [value(first + pair, k), value(first + pair + 1, k)];
        self.issue(Command::LoadFilterPair { values }, cycles)?;
      }
    }
    Ok(())
  }

  /// Input columns for positions `first..first + TILE` of one group.
  fn load_input_tile(
    &mut self,
    input: &LoweredInput,
    group: usize,
    first: usize,
    cycles: &mut CycleCounter,
  ) -> Result<()> {
    let positions = input.rows();
    let sample = |pos: usize, k: usize| {
      if pos < positions {
        (input.raw(group, pos, k), input.is_inside(group, pos, k))
      } else {
        (0, false)
      }
    };
    for k in 0..input.cols() {
      for pair in (0..TILE).step_by(2) {
        let (v0, in0) = sample(first + pair, k);
        let (v1, in1) = sample(first + pair + 1, k);
        let cmd = Command::LoadInputPair {
          padding: PaddingOpcode::from_flags(in0, in1),
          values: [v0, v1],
        };
        self.issue(cmd, cycles)?;
      }
    }
    Ok(())
  }
}

impl<A: Accelerator> MatmulBackend for AcceleratorBackend<A> {
  fn name(&self) -> &'static str {
    "accelerator"
  }

  fn matmul(
    &mut self,
    filter: &FilterMatrix,
    input: &LoweredInput,
    input_offset: i32,
    cycles: &mut CycleCounter,
  ) -> Result<ResultMatrix<i32>> {
    check_operands(filter, input)?;

    let kernel_volume = filter.rows();
    let kernel_volume_reg = u32::try_from(kernel_volume)
      .map_err(|_| shape_mismatch(format!("kernel volume {} exceeds the CFU counter", kernel_volume)))?;
    let channels = filter.cols();
    let positions = input.rows();
    let filters_per_group = channels / input.groups();

    let mut result = ResultMatrix::zeros(channels, positions);
    if kernel_volume == 0 || positions == 0 || channels == 0 {
      return Ok(result);
    }

    for group in 0..input.groups() {
      let group_base = group * filters_per_group;
      let group_end = group_base + filters_per_group;

      for first_channel in (group_base..group_end).step_by(TILE) {
        self.load_filter_tile(filter, first_channel, group_end, cycles)?;

        for first_pos in (0..positions).step_by(TILE) {
          self.load_input_tile(input, group, first_pos, cycles)?;
          self.issue(
            Command::StartCompute {
              kernel_volume: kernel_volume_reg,
              input_offset,
            },
            cycles,
          )?;
          cycles.add(kernel_volume as u64);

          for y in 0..TILE {
            for x in 0..TILE {
              let value = self.issue(Command::ReadResult, cycles)?;
              let (channel, pos) = (first_channel + y, first_pos + x);
              if channel < group_end && pos < positions {
                result.set(channel, pos, value);
              }
            }
          }
        }
      }
    }

    log::debug!(
      "accelerator matmul: {} channels x {} positions over {} rows, {} commands so far",
      channels,
      positions,
      kernel_volume,
      self.commands
    );
    Ok(result)
  }
}
