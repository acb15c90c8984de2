// CFU command set and its register encoding.
//
// Every command is a custom instruction `(funct7, rs1, rs2)` with a 3-bit
// opcode; on the wire it travels as `funct = (funct7 << 3) | op` and two
// sign-extended 64-bit operands.

use crate::error::{protocol_violation, Result};
use crate::arch::cfu::cfu::RegT;

pub const OP_LOAD_INPUT_PAIR: u32 = 0;
pub const OP_LOAD_FILTER_PAIR: u32 = 1;
pub const OP_START_COMPUTE: u32 = 2;
pub const OP_READ_RESULT: u32 = 3;

/// Which operands of an input pair lie inside the real image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingOpcode {
  Neither = 0,
  First = 1,
  Second = 2,
  Both = 3,
}

impl PaddingOpcode {
  pub fn from_flags(first_inside: bool, second_inside: bool) -> Self {
    match (first_inside, second_inside) {
      (false, false) => PaddingOpcode::Neither,
      (true, false) => PaddingOpcode::First,
      (false, true) => PaddingOpcode::Second,
      (true, true) => PaddingOpcode::Both,
    }
  }

  pub fn from_bits(bits: u32) -> Option<Self> {
    match bits {
      0 => Some(PaddingOpcode::Neither),
      1 => Some(PaddingOpcode::First),
      2 => Some(PaddingOpcode::Second),
      3 => Some(PaddingOpcode::Both),
      _ => None,
    }
  }

  pub fn bits(self) -> u32 {
    self as u32
  }

  pub fn first_inside(self) -> bool {
    matches!(self, PaddingOpcode::First | PaddingOpcode::Both)
  }

  pub fn second_inside(self) -> bool {
    matches!(self, PaddingOpcode::Second | PaddingOpcode::Both)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  /// Two elements of one filter-matrix row, consecutive output channels.
  LoadFilterPair { values: [i32; 2] },
  /// Two elements of one input-matrix column, consecutive output positions.
  LoadInputPair { padding: PaddingOpcode, values: [i32; 2] },
  /// Accumulate one 4x4 tile over `kernel_volume` loaded rows.
  StartCompute { kernel_volume: u32, input_offset: i32 },
  /// Drain the next tile accumulator, row-major.
  ReadResult,
}

impl Command {
  /// Register-level form: `(funct, xs1, xs2)`.
  pub fn encode(&self) -> (u32, RegT, RegT) {
    match *self {
      Command::LoadInputPair { padding, values } => (
        (padding.bits() << 3) | OP_LOAD_INPUT_PAIR,
        sign_extend(values[0]),
        sign_extend(values[1]),
      ),
      Command::LoadFilterPair { values } => (OP_LOAD_FILTER_PAIR, sign_extend(values[0]), sign_extend(values[1])),
      Command::StartCompute {
        kernel_volume,
        input_offset,
      } => (OP_START_COMPUTE, kernel_volume as RegT, sign_extend(input_offset)),
      Command::ReadResult => (OP_READ_RESULT, 0, 0),
    }
  }

  pub fn decode(funct: u32, xs1: RegT, xs2: RegT) -> Result<Self> {
    let op = funct & 0b111;
    let funct7 = funct >> 3;
    match op {
      OP_LOAD_INPUT_PAIR => {
        let padding = PaddingOpcode::from_bits(funct7)
          .ok_or_else(|| protocol_violation(format!("padding opcode {} out of range", funct7)))?;
        Ok(Command::LoadInputPair {
          padding,
          values: [truncate(xs1), truncate(xs2)],
        })
      },
      OP_LOAD_FILTER_PAIR => Ok(Command::LoadFilterPair {
        values: [truncate(xs1), truncate(xs2)],
      }),
      OP_START_COMPUTE => {
        let kernel_volume = u32::try_from(xs1)
          .map_err(|_| protocol_violation(format!("kernel volume {} out of range", xs1)))?;
        Ok(Command::StartCompute {
          kernel_volume,
          input_offset: truncate(xs2),
        })
      },
      OP_READ_RESULT => Ok(Command::ReadResult),
      other => Err(protocol_violation(format!("unknown CFU op {}", other))),
    }
  }
}

fn sign_extend(value: i32) -> RegT {
  value as i64 as RegT
}

fn truncate(reg: RegT) -> i32 {
  reg as i64 as i32
}
