use crate::error::{shape_mismatch, Result};

/// Expands densely packed signed 4-bit values, two per byte with the low
/// nibble first, into one `i8` per element.
pub fn unpack_dense_int4_into_int8(packed: &[i8], num_elements: usize) -> Result<Vec<i8>> {
  let needed = num_elements.div_ceil(2);
  if packed.len() < needed {
    return Err(shape_mismatch(format!(
      "{} packed bytes cannot hold {} int4 elements",
      packed.len(),
      num_elements
    )));
  }

  let mut unpacked = Vec::with_capacity(num_elements);
  for &byte in &packed[..num_elements / 2] {
    unpacked.push(low_nibble(byte));
    unpacked.push(byte >> 4);
  }
  if num_elements % 2 != 0 {
    unpacked.push(low_nibble(packed[num_elements / 2]));
  }
  Ok(unpacked)
}

fn low_nibble(byte: i8) -> i8 {
  ((byte as u8) << 4) as i8 >> 4
}
