// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tile.rs - 切片窗口生成
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// 重叠率上限（不含）
pub const MAX_OVERLAP_RATIO: f32 = 0.95;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TilingError {
  #[error("切片尺寸无效: {0}")]
  InvalidSliceSize(u32),
  #[error("重叠率无效: {0}")]
  InvalidOverlapRatio(f32),
  #[error("阈值 {name} 无效: {value}, 必须位于 [0, 1]")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("边缘阈值无效: {0}")]
  InvalidBorderThreshold(f32),
  #[error("输入长度不一致: 边界框 {boxes}, 分数 {scores}, 掩码 {payloads}")]
  LengthMismatch {
    boxes: usize,
    scores: usize,
    payloads: usize,
  },
}

/// 单个切片窗口，像素范围为 `[x0, x1) × [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceWindow {
  pub row: usize,
  pub col: usize,
  pub x0: u32,
  pub y0: u32,
  pub x1: u32,
  pub y1: u32,
}

impl SliceWindow {
  pub fn width(&self) -> u32 {
    self.x1 - self.x0
  }

  pub fn height(&self) -> u32 {
    self.y1 - self.y0
  }

  pub fn origin(&self) -> (f32, f32) {
    (self.x0 as f32, self.y0 as f32)
  }
}

/// 切片各边是否与原图边缘重合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEdgeFlags {
  pub left: bool,
  pub top: bool,
  pub right: bool,
  pub bottom: bool,
}

impl TileEdgeFlags {
  pub fn all() -> Self {
    Self {
      left: true,
      top: true,
      right: true,
      bottom: true,
    }
  }
}

fn axis_starts(full_size: u32, slice_size: u32, stride: u32) -> Vec<u32> {
  if full_size <= slice_size {
    return vec![0];
  }
  let last_start = full_size - slice_size;
  let mut starts = (0..last_start).step_by(stride as usize).collect::<Vec<_>>();
  starts.push(last_start);
  starts
}

/// 计算切片步长，`overlap_ratio` 会被截断到 `[0, 0.95)`
pub fn slice_stride(slice_size: u32, overlap_ratio: f32) -> Result<u32, TilingError> {
  if slice_size == 0 {
    return Err(TilingError::InvalidSliceSize(slice_size));
  }
  if overlap_ratio.is_nan() {
    return Err(TilingError::InvalidOverlapRatio(overlap_ratio));
  }
  let overlap_ratio = overlap_ratio.clamp(0.0, MAX_OVERLAP_RATIO);
  let stride = (slice_size as f64 * (1.0 - overlap_ratio as f64)).floor() as u32;
  Ok(stride.max(1))
}

/// 生成覆盖整幅图像的重叠切片窗口（行优先顺序）
///
/// 每个轴上的最后一个窗口会回退到恰好贴合图像边缘，从而保证除整轴小于
/// 一个切片的情况外，所有切片尺寸一致。
pub fn generate_windows(
  image_width: u32,
  image_height: u32,
  slice_size: u32,
  overlap_ratio: f32,
) -> Result<Vec<(SliceWindow, TileEdgeFlags)>, TilingError> {
  let stride = slice_stride(slice_size, overlap_ratio)?;
  if image_width == 0 || image_height == 0 {
    return Ok(Vec::new());
  }

  let x_starts = axis_starts(image_width, slice_size, stride);
  let y_starts = axis_starts(image_height, slice_size, stride);
  debug!(
    "切片网格: {} 行 x {} 列, 步长 {}",
    y_starts.len(),
    x_starts.len(),
    stride
  );

  let mut windows = Vec::with_capacity(x_starts.len() * y_starts.len());
  for (row, &y0) in y_starts.iter().enumerate() {
    for (col, &x0) in x_starts.iter().enumerate() {
      let window = SliceWindow {
        row,
        col,
        x0,
        y0,
        x1: image_width.min(x0 + slice_size),
        y1: image_height.min(y0 + slice_size),
      };
      let flags = TileEdgeFlags {
        left: window.x0 == 0,
        top: window.y0 == 0,
        right: window.x1 == image_width,
        bottom: window.y1 == image_height,
      };
      windows.push((window, flags));
    }
  }
  Ok(windows)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grid_for_square_image_with_half_overlap() {
    let windows = generate_windows(1000, 1000, 400, 0.5).unwrap();
    assert_eq!(windows.len(), 16);

    let xs: Vec<u32> = windows.iter().take(4).map(|(w, _)| w.x0).collect();
    assert_eq!(xs, vec![0, 200, 400, 600]);

    let (first, first_flags) = windows[0];
    assert_eq!((first.x0, first.y0, first.x1, first.y1), (0, 0, 400, 400));
    assert!(first_flags.left && first_flags.top);
    assert!(!first_flags.right && !first_flags.bottom);

    let (last, last_flags) = windows[15];
    assert_eq!((last.row, last.col), (3, 3));
    assert_eq!((last.x0, last.y0, last.x1, last.y1), (600, 600, 1000, 1000));
    assert!(last_flags.right && last_flags.bottom);
  }

  #[test]
  fn windows_are_row_major() {
    let windows = generate_windows(900, 500, 400, 0.2).unwrap();
    let order: Vec<(usize, usize)> = windows.iter().map(|(w, _)| (w.row, w.col)).collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
  }

  #[test]
  fn last_window_is_shifted_back_not_shrunk() {
    let windows = generate_windows(1050, 400, 400, 0.0).unwrap();
    let xs: Vec<(u32, u32)> = windows.iter().map(|(w, _)| (w.x0, w.x1)).collect();
    assert_eq!(xs, vec![(0, 400), (400, 800), (650, 1050)]);
    assert!(windows.iter().all(|(w, _)| w.width() == 400));
  }

  #[test]
  fn axis_smaller_than_slice_gets_single_window() {
    let windows = generate_windows(120, 90, 640, 0.2).unwrap();
    assert_eq!(windows.len(), 1);
    let (window, flags) = windows[0];
    assert_eq!((window.x1, window.y1), (120, 90));
    assert_eq!(flags, TileEdgeFlags::all());
  }

  #[test]
  fn windows_cover_image_exactly() {
    for &(w, h, size, ratio) in &[
      (1000u32, 1000u32, 400u32, 0.5f32),
      (1337, 421, 256, 0.2),
      (97, 2048, 64, 0.9),
      (640, 640, 640, 0.3),
      (333, 777, 100, 0.0),
    ] {
      let windows = generate_windows(w, h, size, ratio).unwrap();
      let mut covered = vec![false; (w * h) as usize];
      for (win, _) in &windows {
        assert!(win.x1 <= w && win.y1 <= h);
        assert!(win.width() <= size && win.height() <= size);
        for y in win.y0..win.y1 {
          for x in win.x0..win.x1 {
            covered[(y * w + x) as usize] = true;
          }
        }
      }
      assert!(covered.iter().all(|&c| c), "{}x{} 未完全覆盖", w, h);

      let last_col = windows.iter().map(|(w, _)| w.col).max().unwrap();
      let last_row = windows.iter().map(|(w, _)| w.row).max().unwrap();
      for (win, flags) in &windows {
        if win.col == last_col {
          assert_eq!(win.x1, w);
          assert!(flags.right);
        }
        if win.row == last_row {
          assert_eq!(win.y1, h);
          assert!(flags.bottom);
        }
      }
    }
  }

  #[test]
  fn overlap_ratio_is_clamped() {
    assert_eq!(slice_stride(400, -1.0).unwrap(), 400);
    assert_eq!(slice_stride(400, 2.0).unwrap(), 20);
    assert_eq!(slice_stride(10, 0.95).unwrap(), 1);
  }

  #[test]
  fn invalid_parameters_are_rejected() {
    assert_eq!(
      generate_windows(100, 100, 0, 0.2),
      Err(TilingError::InvalidSliceSize(0))
    );
    assert!(matches!(
      generate_windows(100, 100, 32, f32::NAN),
      Err(TilingError::InvalidOverlapRatio(_))
    ));
  }

  #[test]
  fn empty_raster_has_no_windows() {
    assert!(generate_windows(0, 100, 32, 0.2).unwrap().is_empty());
    assert!(generate_windows(100, 0, 32, 0.2).unwrap().is_empty());
  }
}
