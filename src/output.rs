// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, merge::MergedResult};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod result_file;
pub use self::result_file::{ResultFile, ResultFileError, RunMeta, StoredResult};

#[cfg(feature = "save_overlay")]
pub mod draw;
#[cfg(feature = "save_overlay")]
mod save_overlay;
#[cfg(feature = "save_overlay")]
pub use self::save_overlay::{OverlayOutput, OverlayOutputError};

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("结果文件错误: {0}")]
  ResultFileError(#[from] ResultFileError),
  #[cfg(feature = "save_overlay")]
  #[error("叠加图像输出错误: {0}")]
  OverlayOutputError(#[from] OverlayOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 按 URL 方案选择的输出
///
/// `result://` 只保存结果记录，`overlay://` 把结果画在原图上。
pub enum OutputWrapper {
  ResultFile(ResultFile, RunMeta),
  #[cfg(feature = "save_overlay")]
  Overlay(OverlayOutput),
}

impl OutputWrapper {
  pub fn from_url_with_meta(url: &Url, meta: RunMeta) -> Result<Self, RenderError> {
    match url.scheme() {
      ResultFile::SCHEME => Ok(OutputWrapper::ResultFile(ResultFile::from_url(url)?, meta)),
      #[cfg(feature = "save_overlay")]
      OverlayOutput::SCHEME => Ok(OutputWrapper::Overlay(OverlayOutput::from_url(url)?)),
      _ => Err(RenderError::SchemeMismatch),
    }
  }
}

impl Render<RgbImage, MergedResult> for OutputWrapper {
  type Error = RenderError;

  fn render_result(&self, frame: &RgbImage, result: &MergedResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::ResultFile(file, meta) => file.save(result, meta).map_err(RenderError::from),
      #[cfg(feature = "save_overlay")]
      OutputWrapper::Overlay(output) => output
        .render_result(frame, result)
        .map_err(RenderError::from),
    }
  }
}
