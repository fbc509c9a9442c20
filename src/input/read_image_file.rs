// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件栅格输入
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

use std::collections::HashMap;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{RasterError, RasterSource, crop_window},
  merge::GeoTransform,
  tile::SliceWindow,
};

#[derive(Error, Debug)]
pub enum ImageFileRasterError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("地理参考参数无效: {0}")]
  InvalidGeo(String),
}

/// 整幅读入内存的图像文件
///
/// URL 形如 `image:///data/dom.png?geo=origin_x,origin_y,pixel_width,pixel_height`，
/// `geo` 可选，给出北向上栅格的地理参考。
pub struct ImageFileRaster {
  image: RgbImage,
  geo: Option<GeoTransform>,
}

impl FromUrlWithScheme for ImageFileRaster {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileRaster {
  type Error = ImageFileRasterError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileRasterError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    let geo = query.get("geo").map(|v| parse_geo(v)).transpose()?;

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.into_rgb8();
    info!(
      "读取栅格 {}: {}x{}",
      path,
      image.width(),
      image.height()
    );

    Ok(Self { image, geo })
  }
}

fn parse_geo(value: &str) -> Result<GeoTransform, ImageFileRasterError> {
  let parts = value
    .split(',')
    .map(|s| s.trim().parse::<f64>())
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| ImageFileRasterError::InvalidGeo(format!("{}: {}", value, e)))?;
  match parts.as_slice() {
    &[origin_x, origin_y, pixel_width, pixel_height] => Ok(GeoTransform::north_up(
      origin_x,
      origin_y,
      pixel_width,
      pixel_height,
    )),
    _ => Err(ImageFileRasterError::InvalidGeo(format!(
      "需要 4 个数值, 实际 {}",
      parts.len()
    ))),
  }
}

impl ImageFileRaster {
  pub fn new(image: RgbImage) -> Self {
    Self { image, geo: None }
  }

  pub fn with_geo_transform(mut self, geo: Option<GeoTransform>) -> Self {
    self.geo = geo;
    self
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }
}

impl RasterSource for ImageFileRaster {
  type Error = RasterError;

  fn width(&self) -> u32 {
    self.image.width()
  }

  fn height(&self) -> u32 {
    self.image.height()
  }

  fn read_window(&self, window: &SliceWindow) -> Result<RgbImage, Self::Error> {
    crop_window(&self.image, window)
  }

  fn geo_transform(&self) -> Option<GeoTransform> {
    self.geo
  }
}
