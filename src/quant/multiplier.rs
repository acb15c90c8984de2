// Fixed-point requantization primitives (gemmlowp rounding semantics).

/// High 32 bits of `2 * a * b`, rounded to nearest, saturating the single
/// overflowing case `a == b == i32::MIN`.
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
  if a == b && a == i32::MIN {
    return i32::MAX;
  }
  let ab = a as i64 * b as i64;
  let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
  // i64 division truncates toward zero
  ((ab + nudge) / (1i64 << 31)) as i32
}

/// `x / 2^exponent`, rounding half away from zero.
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
  debug_assert!((0..=31).contains(&exponent));
  let mask = ((1i64 << exponent) - 1) as i32;
  let remainder = x & mask;
  let threshold = (mask >> 1) + i32::from(x < 0);
  (x >> exponent) + i32::from(remainder > threshold)
}

/// Scales a 32-bit accumulator by `multiplier * 2^(shift - 31)`.
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
  let left_shift = shift.max(0);
  let right_shift = (-shift).max(0);
  rounding_divide_by_pot(
    saturating_rounding_doubling_high_mul(x.wrapping_shl(left_shift as u32), multiplier),
    right_shift,
  )
}

/// 64-bit accumulator variant. The multiplier is reduced to Q0.15 before
/// the multiply so the product stays inside i64 for |x| < 2^47.
pub fn multiply_by_quantized_multiplier_i64(x: i64, multiplier: i32, shift: i32) -> i32 {
  debug_assert!(multiplier >= 0);
  debug_assert!((-31..8).contains(&shift));
  let reduced: i64 = if multiplier < 0x7FFF_0000 {
    (multiplier as i64 + (1 << 15)) >> 16
  } else {
    0x7FFF
  };
  let total_shift = 15 - shift as i64;
  let round = 1i64 << (total_shift - 1);
  let result = x.wrapping_mul(reduced).wrapping_add(round) >> total_shift;
  result.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}
