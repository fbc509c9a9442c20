// 该文件是 Shanan （山南西风） 项目的一部分。
// src/merge/remap.rs - 切片坐标到全图坐标的映射
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

/// 切片局部边界框平移到全图像素坐标
pub fn remap_to_global(bbox: &[f32; 4], origin_x: f32, origin_y: f32) -> [f32; 4] {
  [
    bbox[0] + origin_x,
    bbox[1] + origin_y,
    bbox[2] + origin_x,
    bbox[3] + origin_y,
  ]
}

/// 将边界框截断到 `[0, width] × [0, height]`
pub fn clamp_box(bbox: &[f32; 4], width: u32, height: u32) -> [f32; 4] {
  let (w, h) = (width as f32, height as f32);
  [
    bbox[0].clamp(0.0, w),
    bbox[1].clamp(0.0, h),
    bbox[2].clamp(0.0, w),
    bbox[3].clamp(0.0, h),
  ]
}

/// 边界框中心点 `[cx, cy]`
pub fn box_centers(boxes: &[[f32; 4]]) -> Vec<[f32; 2]> {
  boxes
    .iter()
    .map(|b| [(b[0] + b[2]) * 0.5, (b[1] + b[3]) * 0.5])
    .collect()
}

/// 像素坐标 `(col, row)` 到地理坐标 `(x, y)` 的仿射变换
///
/// `x = a * col + b * row + c`，`y = d * col + e * row + f`，由栅格读取方提供。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
  pub a: f64,
  pub b: f64,
  pub c: f64,
  pub d: f64,
  pub e: f64,
  pub f: f64,
}

impl GeoTransform {
  pub fn identity() -> Self {
    Self {
      a: 1.0,
      b: 0.0,
      c: 0.0,
      d: 0.0,
      e: 1.0,
      f: 0.0,
    }
  }

  /// 北向上栅格常见的形式：左上角坐标与像元大小（`pixel_height` 为正数）
  pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
    Self {
      a: pixel_width,
      b: 0.0,
      c: origin_x,
      d: 0.0,
      e: -pixel_height,
      f: origin_y,
    }
  }

  pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
    (
      self.a * col + self.b * row + self.c,
      self.d * col + self.e * row + self.f,
    )
  }

  /// 变换边界框两个角点，并重新排列为 `[x_min, y_min, x_max, y_max]`
  pub fn box_to_geo(&self, bbox: &[f32; 4]) -> [f64; 4] {
    let (gx0, gy0) = self.apply(bbox[0] as f64, bbox[1] as f64);
    let (gx1, gy1) = self.apply(bbox[2] as f64, bbox[3] as f64);
    [gx0.min(gx1), gy0.min(gy1), gx0.max(gx1), gy0.max(gy1)]
  }
}

pub fn boxes_to_geo(boxes: &[[f32; 4]], transform: &GeoTransform) -> Vec<[f64; 4]> {
  boxes.iter().map(|b| transform.box_to_geo(b)).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn remap_translates_both_corners() {
    assert_eq!(
      remap_to_global(&[10.0, 20.0, 30.5, 40.5], 200.0, 600.0),
      [210.0, 620.0, 230.5, 640.5]
    );
  }

  #[test]
  fn clamp_box_limits_to_extent() {
    assert_eq!(
      clamp_box(&[-3.0, 5.0, 410.0, 420.0], 400, 400),
      [0.0, 5.0, 400.0, 400.0]
    );
  }

  #[test]
  fn centers_of_boxes() {
    let centers = box_centers(&[[0.0, 0.0, 4.0, 2.0], [2.0, 2.0, 6.0, 6.0]]);
    assert_eq!(centers, vec![[2.0, 1.0], [4.0, 4.0]]);
    assert!(box_centers(&[]).is_empty());
  }

  #[test]
  fn north_up_transform_reorders_corners() {
    let transform = GeoTransform::north_up(500_000.0, 4_000_000.0, 0.01, 0.01);
    let geo = transform.box_to_geo(&[100.0, 200.0, 300.0, 400.0]);
    let expected = [500_001.0, 3_999_996.0, 500_003.0, 3_999_998.0];
    for (g, e) in geo.iter().zip(expected) {
      assert!((g - e).abs() < 1e-6, "{} != {}", g, e);
    }
  }

  #[test]
  fn identity_transform_keeps_pixels() {
    let boxes = [[1.0, 2.0, 3.0, 4.0]];
    assert_eq!(
      boxes_to_geo(&boxes, &GeoTransform::identity()),
      vec![[1.0, 2.0, 3.0, 4.0]]
    );
  }
}
