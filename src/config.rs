// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 切片推理参数
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  merge::{
    border::DEFAULT_BORDER_THRESHOLD_PX,
    dedup::{DEFAULT_IOS_THRESHOLD, DEFAULT_IOU_THRESHOLD, check_threshold},
  },
  tile::{TilingError, slice_stride},
};

pub const DEFAULT_SLICE_SIZE: u32 = 640;
pub const DEFAULT_OVERLAP_RATIO: f32 = 0.2;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解析配置文件失败: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(#[from] TilingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
  pub slice_size: u32,
  pub overlap_ratio: f32,
  pub border_threshold_px: f32,
  pub iou_threshold: f32,
  pub ios_threshold: f32,
}

impl Default for TilingConfig {
  fn default() -> Self {
    Self {
      slice_size: DEFAULT_SLICE_SIZE,
      overlap_ratio: DEFAULT_OVERLAP_RATIO,
      border_threshold_px: DEFAULT_BORDER_THRESHOLD_PX,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      ios_threshold: DEFAULT_IOS_THRESHOLD,
    }
  }
}

impl TilingConfig {
  pub fn with_slice_size(mut self, slice_size: u32) -> Self {
    self.slice_size = slice_size;
    self
  }

  pub fn with_overlap_ratio(mut self, overlap_ratio: f32) -> Self {
    self.overlap_ratio = overlap_ratio;
    self
  }

  pub fn with_border_threshold_px(mut self, border_threshold_px: f32) -> Self {
    self.border_threshold_px = border_threshold_px;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_ios_threshold(mut self, ios_threshold: f32) -> Self {
    self.ios_threshold = ios_threshold;
    self
  }

  /// 在开始切片前一次性检查所有参数
  pub fn validate(&self) -> Result<(), TilingError> {
    slice_stride(self.slice_size, self.overlap_ratio)?;
    if !(self.border_threshold_px.is_finite() && self.border_threshold_px >= 0.0) {
      return Err(TilingError::InvalidBorderThreshold(self.border_threshold_px));
    }
    check_threshold("iou_threshold", self.iou_threshold)?;
    check_threshold("ios_threshold", self.ios_threshold)?;
    Ok(())
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let config: TilingConfig = serde_json::from_str(&text)?;
    config.validate()?;
    info!("加载配置文件: {}", path.display());
    Ok(config)
  }
}
