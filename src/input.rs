// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 栅格输入
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

use image::RgbImage;
use thiserror::Error;

use crate::{merge::GeoTransform, tile::SliceWindow};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileRaster, ImageFileRasterError};

#[derive(Error, Debug)]
pub enum RasterError {
  #[error("窗口越界: {window:?}, 栅格尺寸 {width}x{height}")]
  WindowOutOfBounds {
    window: SliceWindow,
    width: u32,
    height: u32,
  },
}

/// 可按窗口读取的栅格
///
/// 读取失败只影响对应切片，不会终止整个任务。
pub trait RasterSource {
  type Error;

  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn read_window(&self, window: &SliceWindow) -> Result<RgbImage, Self::Error>;

  /// 像素坐标到地理坐标的仿射变换，没有地理参考时为 `None`
  fn geo_transform(&self) -> Option<GeoTransform> {
    None
  }
}

pub(crate) fn crop_window(image: &RgbImage, window: &SliceWindow) -> Result<RgbImage, RasterError> {
  if window.x0 > window.x1
    || window.y0 > window.y1
    || window.x1 > image.width()
    || window.y1 > image.height()
  {
    return Err(RasterError::WindowOutOfBounds {
      window: *window,
      width: image.width(),
      height: image.height(),
    });
  }
  Ok(
    image::imageops::crop_imm(image, window.x0, window.y0, window.width(), window.height())
      .to_image(),
  )
}

impl RasterSource for RgbImage {
  type Error = RasterError;

  fn width(&self) -> u32 {
    self.width()
  }

  fn height(&self) -> u32 {
    self.height()
  }

  fn read_window(&self, window: &SliceWindow) -> Result<RgbImage, Self::Error> {
    crop_window(self, window)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]))
  }

  #[test]
  fn in_memory_window_read() {
    let image = gradient(64, 48);
    let window = SliceWindow {
      row: 0,
      col: 1,
      x0: 16,
      y0: 8,
      x1: 48,
      y1: 40,
    };
    let tile = RasterSource::read_window(&image, &window).unwrap();
    assert_eq!(tile.dimensions(), (32, 32));
    assert_eq!(tile.get_pixel(0, 0), &Rgb([16, 8, 0]));
    assert_eq!(tile.get_pixel(31, 31), &Rgb([47, 39, 0]));
    assert!(RasterSource::geo_transform(&image).is_none());
  }

  #[test]
  fn out_of_bounds_window_is_an_error() {
    let image = gradient(10, 10);
    let window = SliceWindow {
      row: 0,
      col: 0,
      x0: 0,
      y0: 0,
      x1: 11,
      y1: 10,
    };
    assert!(matches!(
      RasterSource::read_window(&image, &window),
      Err(RasterError::WindowOutOfBounds { .. })
    ));
  }
}
