use crate::error::{shape_mismatch, Result};
use serde::{Deserialize, Serialize};

/// Dimensions of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeShape {
  dims: Vec<usize>,
}

impl RuntimeShape {
  pub fn new(dims: Vec<usize>) -> Self {
    Self { dims }
  }

  pub fn from_slice(dims: &[usize]) -> Self {
    Self { dims: dims.to_vec() }
  }

  pub fn dimensions_count(&self) -> usize {
    self.dims.len()
  }

  /// Panics if `axis` is out of range; callers check `dimensions_count` first.
  pub fn dims(&self, axis: usize) -> usize {
    self.dims[axis]
  }

  pub fn flat_size(&self) -> usize {
    self.dims.iter().product()
  }

  /// Flat index of `(b, y, x, c)` in a row-major, channel-innermost 4-D buffer.
  pub fn offset(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
    debug_assert_eq!(self.dims.len(), 4);
    debug_assert!(b < self.dims[0] && y < self.dims[1] && x < self.dims[2] && c < self.dims[3]);
    ((b * self.dims[1] + y) * self.dims[2] + x) * self.dims[3] + c
  }

  /// Returns the shared extent of `self[axis]` and `other[other_axis]`.
  pub fn matching_dim(&self, axis: usize, other: &RuntimeShape, other_axis: usize) -> Result<usize> {
    let a = self.dims(axis);
    let b = other.dims(other_axis);
    if a != b {
      return Err(shape_mismatch(format!(
        "dim {} of {:?} is {}, but dim {} of {:?} is {}",
        axis, self.dims, a, other_axis, other.dims, b
      )));
    }
    Ok(a)
  }

  pub fn require_rank(&self, rank: usize, what: &str) -> Result<()> {
    if self.dims.len() != rank {
      return Err(shape_mismatch(format!(
        "{} must be {}-D, got {:?}",
        what, rank, self.dims
      )));
    }
    Ok(())
  }
}
