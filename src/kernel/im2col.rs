// im2col lowering of a convolution into two dense matrices.
//
// Both matrices flatten the kernel window in the same order:
//   k = (in_channel * filter_height + filter_y) * filter_width + filter_x

use super::geometry::ConvGeometry;
use crate::tensor::Tensor;

/// Filter lowered to `kernel_volume` rows by `output_depth` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatrix {
  rows: usize,
  cols: usize,
  data: Vec<i32>,
}

impl FilterMatrix {
  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn get(&self, k: usize, channel: usize) -> i32 {
    self.data[k * self.cols + channel]
  }
}

/// Input windows of one batch element, one slab per channel group.
///
/// Each slab has a row per output position (row-major over y, x) and a
/// column per kernel-window element. `inside` is the padding indicator
/// map: false where the source coordinate falls outside the image, in
/// which case `raw` holds 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredInput {
  groups: usize,
  rows: usize,
  cols: usize,
  raw: Vec<i32>,
  inside: Vec<bool>,
}

impl LoweredInput {
  pub fn groups(&self) -> usize {
    self.groups
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  fn index(&self, group: usize, pos: usize, k: usize) -> usize {
    (group * self.rows + pos) * self.cols + k
  }

  /// Sample as read from the input tensor, without any offset.
  pub fn raw(&self, group: usize, pos: usize, k: usize) -> i32 {
    self.raw[self.index(group, pos, k)]
  }

  pub fn is_inside(&self, group: usize, pos: usize, k: usize) -> bool {
    self.inside[self.index(group, pos, k)]
  }

  /// Effective operand: `raw + input_offset` inside the image, 0 outside.
  pub fn value(&self, group: usize, pos: usize, k: usize, input_offset: i32) -> i32 {
    let idx = self.index(group, pos, k);
    if self.inside[idx] {
      self.raw[idx] + input_offset
    } else {
      0
    }
  }

  /// Padding indicator map of one group, `rows * cols` entries.
  pub fn padding_map(&self, group: usize) -> &[bool] {
    let slab = self.rows * self.cols;
    &self.inside[group * slab..(group + 1) * slab]
  }
}

pub fn lower_filter(geom: &ConvGeometry, filter: &Tensor<i8>) -> FilterMatrix {
  let rows = geom.kernel_volume();
  let cols = geom.output_depth;
  let mut data = vec![0i32; rows * cols];

  for out_channel in 0..cols {
    let mut k = 0;
    for in_channel in 0..geom.filter_input_depth {
      for filter_y in 0..geom.filter_height {
        for filter_x in 0..geom.filter_width {
          data[k * cols + out_channel] = filter.at(out_channel, filter_y, filter_x, in_channel) as i32;
          k += 1;
        }
      }
    }
  }

  FilterMatrix { rows, cols, data }
}

pub fn lower_input<T>(geom: &ConvGeometry, input: &Tensor<T>, batch: usize) -> LoweredInput
where
  T: Copy + Into<i32>,
{
  let rows = geom.output_positions();
  let cols = geom.kernel_volume();
  let total = geom.groups * rows * cols;
  let mut raw = Vec::with_capacity(total);
  let mut inside = Vec::with_capacity(total);

  let input_height = geom.input_height as isize;
  let input_width = geom.input_width as isize;

  for group in 0..geom.groups {
    let channel_base = group * geom.filter_input_depth;
    for out_y in 0..geom.output_height {
      let in_y_origin = (out_y * geom.stride_height) as isize - geom.pad_height as isize;
      for out_x in 0..geom.output_width {
        let in_x_origin = (out_x * geom.stride_width) as isize - geom.pad_width as isize;
        for in_channel in 0..geom.filter_input_depth {
          for filter_y in 0..geom.filter_height {
            let in_y = in_y_origin + (geom.dilation_height * filter_y) as isize;
            for filter_x in 0..geom.filter_width {
              let in_x = in_x_origin + (geom.dilation_width * filter_x) as isize;
              let is_inside = in_y >= 0 && in_y < input_height && in_x >= 0 && in_x < input_width;
              let sample = if is_inside {
                input
                  .at(batch, in_y as usize, in_x as usize, channel_base + in_channel)
                  .into()
              } else {
                0
              };
              raw.push(sample);
              inside.push(is_inside);
            }
          }
        }
      }
    }
  }

  LoweredInput {
    groups: geom.groups,
    rows,
    cols,
    raw,
    inside,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::kernel::params::ConvParams;
  use crate::tensor::RuntimeShape;

  fn geometry(params: &ConvParams, input: &[usize], filter: &[usize], output: &[usize]) -> ConvGeometry {
    ConvGeometry::new(
      params,
      &RuntimeShape::from_slice(input),
      &RuntimeShape::from_slice(filter),
      None,
      &RuntimeShape::from_slice(output),
    )
    .unwrap()
  }

  #[test]
  fn test_filter_row_order_matches_window_order() {
    // 2 output channels, 2x2 kernel, 2 input channels
    let shape = RuntimeShape::new(vec![2, 2, 2, 2]);
    let data: Vec<i8> = (0..16).collect();
    let filter = Tensor::new(&shape, &data).unwrap();
    let geom = geometry(&ConvParams::default(), &[1, 3, 3, 2], &[2, 2, 2, 2], &[1, 2, 2, 2]);

    let lowered = lower_filter(&geom, &filter);
    assert_eq!(lowered.rows(), 8);
    assert_eq!(lowered.cols(), 2);
    // k = 1 is (in_channel 0, y 0, x 1)
    assert_eq!(lowered.get(1, 0), filter.at(0, 0, 1, 0) as i32);
    // k = 4 is (in_channel 1, y 0, x 0)
    assert_eq!(lowered.get(4, 1), filter.at(1, 0, 0, 1) as i32);
  }

  #[test]
  fn test_padding_map_marks_border() {
    let params = ConvParams::default().with_padding(1, 1);
    let geom = geometry(&params, &[1, 3, 3, 1], &[1, 3, 3, 1], &[1, 3, 3, 1]);
    let shape = RuntimeShape::new(vec![1, 3, 3, 1]);
    let data: Vec<i8> = (1..=9).collect();
    let input = Tensor::new(&shape, &data).unwrap();

    let lowered = lower_input(&geom, &input, 0);
    assert_eq!(lowered.rows(), 9);
    assert_eq!(lowered.cols(), 9);

    for pos in 0..9 {
      let (out_y, out_x) = (pos / 3, pos % 3);
      for k in 0..9 {
        let in_y = out_y as isize - 1 + (k / 3) as isize;
        let in_x = out_x as isize - 1 + (k % 3) as isize;
        let expected = (0..3).contains(&in_y) && (0..3).contains(&in_x);
        assert_eq!(lowered.is_inside(0, pos, k), expected, "pos {} k {}", pos, k);
        if !expected {
          assert_eq!(lowered.raw(0, pos, k), 0);
          assert_eq!(lowered.value(0, pos, k, 7), 0);
        }
      }
    }
    // the centre output sees the whole image
    assert!(lowered.padding_map(0)[4 * 9..5 * 9].iter().all(|&b| b));
    assert_eq!(lowered.padding_map(0).iter().filter(|&&b| !b).count(), 32);
  }

  #[test]
  fn test_offset_applies_only_inside() {
    let geom = geometry(&ConvParams::default(), &[1, 2, 2, 1], &[1, 1, 1, 1], &[1, 2, 2, 1]);
    let shape = RuntimeShape::new(vec![1, 2, 2, 1]);
    let data = [10i8, -20, 30, -40];
    let input = Tensor::new(&shape, &data).unwrap();
    let lowered = lower_input(&geom, &input, 0);
    assert_eq!(lowered.value(0, 1, 0, 5), -15);
    assert_eq!(lowered.raw(0, 3, 0), -40);
  }

  #[test]
  fn test_stride_and_dilation_coordinates() {
    let params = ConvParams::default().with_stride(2, 2).with_dilation(2, 2);
    let geom = geometry(&params, &[1, 5, 5, 1], &[1, 2, 2, 1], &[1, 2, 2, 1]);
    let shape = RuntimeShape::new(vec![1, 5, 5, 1]);
    let data: Vec<i8> = (0..25).collect();
    let input = Tensor::new(&shape, &data).unwrap();
    let lowered = lower_input(&geom, &input, 0);
    // position (1, 1) reads (2, 2), (2, 4), (4, 2), (4, 4)
    let window: Vec<i32> = (0..4).map(|k| lowered.raw(0, 3, k)).collect();
    assert_eq!(window, vec![12, 14, 22, 24]);
  }

  #[test]
  fn test_groups_read_their_own_channel_slice() {
    let geom = geometry(&ConvParams::default(), &[1, 1, 1, 4], &[2, 1, 1, 2], &[1, 1, 1, 2]);
    let shape = RuntimeShape::new(vec![1, 1, 1, 4]);
    let data = [1i16, 2, 300, 400];
    let input = Tensor::new(&shape, &data).unwrap();
    let lowered = lower_input(&geom, &input, 0);
    assert_eq!(lowered.groups(), 2);
    assert_eq!((lowered.raw(0, 0, 0), lowered.raw(0, 0, 1)), (1, 2));
    assert_eq!((lowered.raw(1, 0, 0), lowered.raw(1, 0, 1)), (300, 400));
  }
}
