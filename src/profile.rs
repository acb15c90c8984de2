use serde::Serialize;
use std::time::{Duration, Instant};

/// Cycle tally of a single matrix-multiply phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounter {
  cycles: u64,
}

impl CycleCounter {
  pub fn add(&mut self, cycles: u64) {
    self.cycles += cycles;
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }
}

/// Profiling context owned by the caller of a convolution.
///
/// Records one entry per matrix-multiply phase, whichever backend ran it.
#[derive(Debug, Default, Clone)]
pub struct Profiler {
  phases: u64,
  cycles: u64,
  elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
  pub phases: u64,
  pub cycles: u64,
  pub elapsed_us: u64,
}

impl Profiler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Runs one multiply phase and records it exactly once, success or not.
  pub fn measure<T, E>(&mut self, phase: impl FnOnce(&mut CycleCounter) -> Result<T, E>) -> Result<T, E> {
    let mut counter = CycleCounter::default();
    let start = Instant::now();
    let result = phase(&mut counter);
    self.elapsed += start.elapsed();
    self.phases += 1;
    self.cycles += counter.cycles();
    log::trace!("multiply phase {}: {} cycles", self.phases, counter.cycles());
    result
  }

  pub fn phases(&self) -> u64 {
    self.phases
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }

  pub fn report(&self) -> ProfileReport {
    ProfileReport {
      phases: self.phases,
      cycles: self.cycles,
      elapsed_us: self.elapsed.as_micros() as u64,
    }
  }
}
