// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_overlay.rs - 保存叠加结果图像
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  merge::MergedResult,
  output::{Render, draw::Draw},
};

pub struct OverlayOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum OverlayOutputError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像尺寸 {image:?} 与结果尺寸 {result:?} 不符")]
  SizeMismatch { image: (u32, u32), result: (u32, u32) },
}

impl FromUrlWithScheme for OverlayOutput {
  const SCHEME: &'static str = "overlay";
}

impl FromUrl for OverlayOutput {
  type Error = OverlayOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OverlayOutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(OverlayOutput {
      path: uri.path().to_string(),
      draw: Draw::default(),
    })
  }
}

impl OverlayOutput {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  fn save_image(&self, image: RgbImage) -> Result<(), OverlayOutputError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(OverlayOutputError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(OverlayOutputError::ImageError)?;

    warn!("保存叠加图像到文件: {}", self.path);

    Ok(())
  }
}

impl Render<RgbImage, MergedResult> for OverlayOutput {
  type Error = OverlayOutputError;

  fn render_result(&self, frame: &RgbImage, result: &MergedResult) -> Result<(), Self::Error> {
    if frame.dimensions() != (result.original_width, result.original_height) {
      return Err(OverlayOutputError::SizeMismatch {
        image: frame.dimensions(),
        result: (result.original_width, result.original_height),
      });
    }
    let mut image = frame.clone();
    self.draw.draw_result(&mut image, result);
    self.save_image(image)
  }
}
