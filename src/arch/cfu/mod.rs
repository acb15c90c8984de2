pub mod cfu;
pub mod command;

pub use cfu::{Cfu, RegT, TILE};
pub use command::{Command, PaddingOpcode};

use crate::error::Result;

/// Anything that accepts CFU commands: the in-process model or a remote unit.
///
/// Loads and start-compute return 0; read-result returns the drained value.
pub trait Accelerator {
  fn execute(&mut self, cmd: Command) -> Result<i32>;
}

impl<A: Accelerator + ?Sized> Accelerator for Box<A> {
  fn execute(&mut self, cmd: Command) -> Result<i32> {
    (**self).execute(cmd)
  }
}
