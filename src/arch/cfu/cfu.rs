use super::command::Command;
use super::Accelerator;
use crate::error::{protocol_violation, ConvError, Result};

// CFU parameters
pub const TILE: usize = 4;
pub const PORT_WIDTH: usize = 2;
pub const TILE_RESULTS: usize = TILE * TILE;
// Largest kernel volume any valid 8-bit problem can reach (128 * 128 * K <= i32::MAX)
pub const DEFAULT_MAX_KERNEL_VOLUME: usize = 1 << 17;

// Type aliases
pub type ElemT = i32;
pub type AccT = i32;
pub type RegT = u64;

pub struct CfuState {
  // Operand buffers, one row of TILE values per kernel-window element
  pub filter_buf: Vec<ElemT>,
  pub input_buf: Vec<ElemT>,
  pub input_inside: Vec<bool>,
  // Set by start-compute; the next filter load begins a new filter set
  pub filters_sealed: bool,

  pub tile: [[AccT; TILE]; TILE],
  pub pending_reads: usize,

  pub computes: u64,
}

impl CfuState {
  pub fn new() -> Self {
    Self {
      filter_buf: Vec::new(),
      input_buf: Vec::new(),
      input_inside: Vec::new(),
      filters_sealed: false,
      tile: [[0; TILE]; TILE],
      pending_reads: 0,
      computes: 0,
    }
  }

  pub fn reset(&mut self) {
    self.filter_buf.clear();
    self.input_buf.clear();
    self.input_inside.clear();
    self.filters_sealed = false;
    self.tile = [[0; TILE]; TILE];
    self.pending_reads = 0;
  }
}

impl Default for CfuState {
  fn default() -> Self {
    Self::new()
  }
}

/// Functional model of the 4x4 tile matrix-multiply unit.
pub struct Cfu {
  pub state: CfuState,
  max_kernel_volume: usize,
}

impl Cfu {
  pub fn new() -> Self {
    Self::with_max_kernel_volume(DEFAULT_MAX_KERNEL_VOLUME)
  }

  /// Operand buffers hold at most `max_kernel_volume` rows of TILE values.
  pub fn with_max_kernel_volume(max_kernel_volume: usize) -> Self {
    log::debug!(
      "CFU configured with tile = {}x{}, port width = {}, max kernel volume = {}",
      TILE,
      TILE,
      PORT_WIDTH,
      max_kernel_volume
    );
    Self {
      state: CfuState::new(),
      max_kernel_volume,
    }
  }

  pub fn max_kernel_volume(&self) -> usize {
    self.max_kernel_volume
  }

  fn require_room(&self, loaded: usize, what: &str) -> Result<()> {
    let capacity = self.max_kernel_volume * TILE;
    if loaded + PORT_WIDTH > capacity {
      return Err(protocol_violation(format!(
        "{} overflows the {}-value operand buffer",
        what, capacity
      )));
    }
    Ok(())
  }

  pub fn reset(&mut self) {
    self.state.reset();
  }

  /// Register-level entry point, as seen by a host issuing raw instructions.
  pub fn execute_raw(&mut self, funct: u32, xs1: RegT, xs2: RegT) -> Result<RegT> {
    let cmd = Command::decode(funct, xs1, xs2)?;
    let value = self.dispatch(cmd)?;
    Ok(value as i64 as RegT)
  }

  fn dispatch(&mut self, cmd: Command) -> Result<i32> {
    let result = match cmd {
      Command::LoadFilterPair { values } => self.load_filter_pair(values).map(|_| 0),
      Command::LoadInputPair { padding, values } => self
        .load_input_pair([padding.first_inside(), padding.second_inside()], values)
        .map(|_| 0),
      Command::StartCompute {
        kernel_volume,
        input_offset,
      } => self.start_compute(kernel_volume as usize, input_offset).map(|_| 0),
      Command::ReadResult => self.read_result(),
    };

    // A broken sequence leaves the unit idle for the next invocation
    if let Err(ConvError::ProtocolViolation(ref msg)) = result {
      log::warn!("CFU: {}; resetting", msg);
      self.state.reset();
    }
    result
  }

  fn require_drained(&self, what: &str) -> Result<()> {
    if self.state.pending_reads != 0 {
      return Err(protocol_violation(format!(
        "{} issued with {} results still undrained",
        what, self.state.pending_reads
      )));
    }
    Ok(())
  }

  pub fn load_filter_pair(&mut self, values: [i32; PORT_WIDTH]) -> Result<()> {
    self.require_drained("load-filter-pair")?;
    if !self.state.input_buf.is_empty() {
      return Err(protocol_violation("load-filter-pair issued while an input tile is half loaded"));
    }
    if self.state.filters_sealed {
      self.state.filter_buf.clear();
      self.state.filters_sealed = false;
    }
    self.require_room(self.state.filter_buf.len(), "load-filter-pair")?;
    self.state.filter_buf.extend_from_slice(&values);
    Ok(())
  }

  pub fn load_input_pair(&mut self, inside: [bool; PORT_WIDTH], values: [i32; PORT_WIDTH]) -> Result<()> {
    self.require_drained("load-input-pair")?;
    self.require_room(self.state.input_buf.len(), "load-input-pair")?;
    self.state.input_buf.extend_from_slice(&values);
    self.state.input_inside.extend_from_slice(&inside);
    Ok(())
  }

  pub fn start_compute(&mut self, kernel_volume: usize, input_offset: i32) -> Result<()> {
    self.require_drained("start-compute")?;
    let expected = kernel_volume * TILE;
    if kernel_volume == 0 || self.state.filter_buf.len() != expected {
      return Err(protocol_violation(format!(
        "start-compute over {} rows needs {} filter values, {} loaded",
        kernel_volume,
        expected,
        self.state.filter_buf.len()
      )));
    }
    if self.state.input_buf.len() != expected {
      return Err(protocol_violation(format!(
        "start-compute over {} rows needs {} input values, {} loaded",
        kernel_volume,
        expected,
        self.state.input_buf.len()
      )));
    }

    let mut tile = [[0 as AccT; TILE]; TILE];
    for r in 0..kernel_volume {
      let row = r * TILE;
      for (y, acc_row) in tile.iter_mut().enumerate() {
        let weight = self.state.filter_buf[row + y];
        for (x, acc) in acc_row.iter_mut().enumerate() {
          // Samples outside the image reconstruct to the zero-point, i.e. 0 after offset
          let sample = if self.state.input_inside[row + x] {
            let raw = self.state.input_buf[row + x];
            raw.checked_add(input_offset).ok_or_else(|| {
              protocol_violation(format!("input sample {} with offset {} overflows", raw, input_offset))
            })?
          } else {
            0
          };
          *acc = acc.wrapping_add(weight.wrapping_mul(sample));
        }
      }
    }

    self.state.tile = tile;
    self.state.pending_reads = TILE_RESULTS;
    self.state.input_buf.clear();
    self.state.input_inside.clear();
    self.state.filters_sealed = true;
    self.state.computes += 1;
    Ok(())
  }

  pub fn read_result(&mut self) -> Result<i32> {
    if self.state.pending_reads == 0 {
      return Err(protocol_violation("read-result issued with no computed tile pending"));
    }
    let idx = TILE_RESULTS - self.state.pending_reads;
    self.state.pending_reads -= 1;
    Ok(self.state.tile[idx / TILE][idx % TILE])
  }
}

impl Default for Cfu {
  fn default() -> Self {
    Self::new()
  }
}

impl Accelerator for Cfu {
  fn execute(&mut self, cmd: Command) -> Result<i32> {
    self.dispatch(cmd)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::cfu::command::PaddingOpcode;

  fn load_identity_filters(cfu: &mut Cfu, rows: usize) {
    for _ in 0..rows {
      cfu.load_filter_pair([1, 2]).unwrap();
      cfu.load_filter_pair([3, 4]).unwrap();
    }
  }

  #[test]
  fn test_single_row_tile() {
    let mut cfu = Cfu::new();
    load_identity_filters(&mut cfu, 1);
    cfu.load_input_pair([true, true], [10, 20]).unwrap();
    cfu.load_input_pair([true, false], [30, 0]).unwrap();
    cfu.start_compute(1, 0).unwrap();

    let drained: Vec<i32> = (0..TILE_RESULTS).map(|_| cfu.read_result().unwrap()).collect();
    // row y = channel weight (y + 1), column x = sample
    assert_eq!(&drained[0..4], &[10, 20, 30, 0]);
    assert_eq!(&drained[12..16], &[40, 80, 120, 0]);
  }

  #[test]
  fn test_offset_only_applies_inside_image() {
    let mut cfu = Cfu::new();
    load_identity_filters(&mut cfu, 1);
    cfu.load_input_pair([true, false], [5, 0]).unwrap();
    cfu.load_input_pair([false, true], [0, -5]).unwrap();
    cfu.start_compute(1, 3).unwrap();
    let row0: Vec<i32> = (0..4).map(|_| cfu.read_result().unwrap()).collect();
    assert_eq!(row0, vec![8, 0, 0, -2]);
  }

  #[test]
  fn test_filters_survive_multiple_tiles() {
    let mut cfu = Cfu::new();
    load_identity_filters(&mut cfu, 2);
    for tile in 0..2 {
      for _ in 0..2 {
        cfu.load_input_pair([true, true], [1, 1]).unwrap();
        cfu.load_input_pair([true, true], [1, 1]).unwrap();
      }
      cfu.start_compute(2, tile).unwrap();
      let first = cfu.read_result().unwrap();
      assert_eq!(first, 2 * (1 + tile));
      for _ in 1..TILE_RESULTS {
        cfu.read_result().unwrap();
      }
    }
    assert_eq!(cfu.state.computes, 2);
  }

  #[test]
  fn test_sequencing_violations() {
    let mut cfu = Cfu::new();
    assert!(matches!(cfu.read_result(), Err(ConvError::ProtocolViolation(_))));

    // compute without a full operand set
    load_identity_filters(&mut cfu, 1);
    cfu.load_input_pair([true, true], [1, 1]).unwrap();
    assert!(cfu.execute(Command::StartCompute { kernel_volume: 1, input_offset: 0 }).is_err());
    // the violation left the unit idle
    assert!(cfu.state.filter_buf.is_empty());

    // loads are refused until the tile is drained
    load_identity_filters(&mut cfu, 1);
    cfu.load_input_pair([true, true], [1, 1]).unwrap();
    cfu.load_input_pair([true, true], [1, 1]).unwrap();
    cfu.start_compute(1, 0).unwrap();
    let cmd = Command::LoadInputPair {
      padding: PaddingOpcode::Both,
      values: [1, 1],
    };
    assert!(matches!(cfu.execute(cmd), Err(ConvError::ProtocolViolation(_))));
  }

  #[test]
  fn test_offset_overflow_is_a_violation() {
    let mut cfu = Cfu::new();
    load_identity_filters(&mut cfu, 1);
    cfu.load_input_pair([true, true], [i32::MAX, 0]).unwrap();
    cfu.load_input_pair([false, false], [0, 0]).unwrap();
    let cmd = Command::StartCompute {
      kernel_volume: 1,
      input_offset: 1,
    };
    assert!(matches!(cfu.execute(cmd), Err(ConvError::ProtocolViolation(_))));
    assert_eq!(cfu.state.pending_reads, 0);
    assert_eq!(cfu.state.computes, 0);
    assert!(cfu.state.input_buf.is_empty());
  }

  #[test]
  fn test_operand_buffers_are_capped() {
    let mut cfu = Cfu::with_max_kernel_volume(2);
    assert_eq!(cfu.max_kernel_volume(), 2);
    load_identity_filters(&mut cfu, 2);
    let extra = Command::LoadFilterPair { values: [1, 1] };
    assert!(matches!(cfu.execute(extra), Err(ConvError::ProtocolViolation(_))));
    assert!(cfu.state.filter_buf.is_empty());

    load_identity_filters(&mut cfu, 2);
    for _ in 0..4 {
      cfu.load_input_pair([true, true], [1, 1]).unwrap();
    }
    let extra = Command::LoadInputPair {
      padding: PaddingOpcode::Both,
      values: [1, 1],
    };
    assert!(matches!(cfu.execute(extra), Err(ConvError::ProtocolViolation(_))));
    assert!(cfu.state.input_buf.is_empty());
  }

  #[test]
  fn test_execute_raw_sign_extends() {
    let mut cfu = Cfu::new();
    for cmd in [
      Command::LoadFilterPair { values: [-1, 0] },
      Command::LoadFilterPair { values: [0, 0] },
      Command::LoadInputPair {
        padding: PaddingOpcode::First,
        values: [7, 0],
      },
      Command::LoadInputPair {
        padding: PaddingOpcode::Neither,
        values: [0, 0],
      },
      Command::StartCompute {
        kernel_volume: 1,
        input_offset: 0,
      },
    ] {
      let (funct, xs1, xs2) = cmd.encode();
      assert_eq!(cfu.execute_raw(funct, xs1, xs2).unwrap(), 0);
    }
    let (funct, xs1, xs2) = Command::ReadResult.encode();
    assert_eq!(cfu.execute_raw(funct, xs1, xs2).unwrap(), (-7i64) as u64);
  }
}
