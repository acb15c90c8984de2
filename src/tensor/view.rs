use super::shape::RuntimeShape;
use crate::error::{shape_mismatch, Result};

/// Read-only view over a flat tensor buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tensor<'a, T> {
  shape: &'a RuntimeShape,
  data: &'a [T],
}

impl<'a, T: Copy> Tensor<'a, T> {
  pub fn new(shape: &'a RuntimeShape, data: &'a [T]) -> Result<Self> {
    check_len(shape, data.len())?;
    Ok(Self { shape, data })
  }

  pub fn shape(&self) -> &'a RuntimeShape {
    self.shape
  }

  pub fn data(&self) -> &'a [T] {
    self.data
  }

  pub fn at(&self, b: usize, y: usize, x: usize, c: usize) -> T {
    self.data[self.shape.offset(b, y, x, c)]
  }
}

/// Mutable view over a flat tensor buffer.
#[derive(Debug)]
pub struct TensorMut<'a, T> {
  shape: &'a RuntimeShape,
  data: &'a mut [T],
}

impl<'a, T: Copy> TensorMut<'a, T> {
  pub fn new(shape: &'a RuntimeShape, data: &'a mut [T]) -> Result<Self> {
    check_len(shape, data.len())?;
    Ok(Self { shape, data })
  }

  pub fn shape(&self) -> &RuntimeShape {
    self.shape
  }

  pub fn data(&self) -> &[T] {
    self.data
  }

  pub fn set(&mut self, b: usize, y: usize, x: usize, c: usize, value: T) {
    let idx = self.shape.offset(b, y, x, c);
    self.data[idx] = value;
  }
}

fn check_len(shape: &RuntimeShape, len: usize) -> Result<()> {
  if shape.flat_size() != len {
    return Err(shape_mismatch(format!(
      "buffer holds {} elements, shape {:?} needs {}",
      len,
      shape,
      shape.flat_size()
    )));
  }
  Ok(())
}
