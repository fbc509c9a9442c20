// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/result_file.rs - 合并结果的持久化
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

use std::{
  fs::File,
  io::{BufReader, BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::TilingConfig,
  mask::{BinaryMask, MaskRepresentation},
  merge::MergedResult,
};

#[derive(Error, Debug)]
pub enum ResultFileError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("结果记录不一致: {0}")]
  Inconsistent(String),
}

/// 一次切片推理的元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
  pub source: String,
  pub slice_size: u32,
  pub overlap_ratio: f32,
  pub border_threshold_px: f32,
  pub iou_threshold: f32,
  pub ios_threshold: f32,
  pub created_at: DateTime<Utc>,
}

impl RunMeta {
  pub fn new(source: impl Into<String>, config: &TilingConfig) -> Self {
    Self {
      source: source.into(),
      slice_size: config.slice_size,
      overlap_ratio: config.overlap_ratio,
      border_threshold_px: config.border_threshold_px,
      iou_threshold: config.iou_threshold,
      ios_threshold: config.ios_threshold,
      created_at: Utc::now(),
    }
  }
}

/// 磁盘上的结果记录
///
/// `is_packed` 为真时 `masks` 为边界框内的裁剪掩码，否则为全图掩码。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
  pub meta: RunMeta,
  pub original_height: u32,
  pub original_width: u32,
  pub is_packed: bool,
  pub boxes: Vec<[f32; 4]>,
  pub scores: Vec<f32>,
  pub masks: Vec<BinaryMask>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub boxes_geo: Option<Vec<[f64; 4]>>,
}

impl StoredResult {
  /// 混合表示的结果统一还原为全图掩码后保存
  pub fn new(result: &MergedResult, meta: RunMeta) -> Self {
    let is_packed = result.is_packed();
    let (h, w) = (result.original_height, result.original_width);
    let masks = result
      .masks
      .iter()
      .zip(&result.boxes)
      .map(|(mask, bbox)| match mask {
        MaskRepresentation::PackedCrop(crop) if is_packed => crop.clone(),
        other => other.clone().into_full_frame(bbox, h, w),
      })
      .collect();
    Self {
      meta,
      original_height: h,
      original_width: w,
      is_packed,
      boxes: result.boxes.clone(),
      scores: result.scores.clone(),
      masks,
      boxes_geo: result.boxes_geo.clone(),
    }
  }

  fn check(&self) -> Result<(), ResultFileError> {
    let n = self.boxes.len();
    if self.scores.len() != n || self.masks.len() != n {
      return Err(ResultFileError::Inconsistent(format!(
        "边界框 {}, 分数 {}, 掩码 {}",
        n,
        self.scores.len(),
        self.masks.len()
      )));
    }
    if let Some(geo) = &self.boxes_geo
      && geo.len() != n
    {
      return Err(ResultFileError::Inconsistent(format!(
        "地理边界框 {}, 边界框 {}",
        geo.len(),
        n
      )));
    }
    if !self.is_packed
      && let Some(mask) = self
        .masks
        .iter()
        .find(|m| (m.width(), m.height()) != (self.original_width, self.original_height))
    {
      return Err(ResultFileError::Inconsistent(format!(
        "全图掩码尺寸 {}x{} 与原图 {}x{} 不符",
        mask.width(),
        mask.height(),
        self.original_width,
        self.original_height
      )));
    }
    Ok(())
  }

  /// 转为内存中的结果，`unpack` 为真时还原全图掩码
  pub fn into_merged(self, unpack: bool) -> MergedResult {
    let wrap = if self.is_packed {
      MaskRepresentation::PackedCrop
    } else {
      MaskRepresentation::FullFrame
    };
    let merged = MergedResult {
      original_height: self.original_height,
      original_width: self.original_width,
      boxes: self.boxes,
      scores: self.scores,
      masks: self.masks.into_iter().map(wrap).collect(),
      boxes_geo: self.boxes_geo,
    };
    if unpack { merged.unpack() } else { merged }
  }
}

/// `result:///path/to/result.json`
pub struct ResultFile {
  path: PathBuf,
}

impl FromUrlWithScheme for ResultFile {
  const SCHEME: &'static str = "result";
}

impl FromUrl for ResultFile {
  type Error = ResultFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ResultFileError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }
    Ok(Self::new(url.path()))
  }
}

impl ResultFile {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, result: &MergedResult, meta: &RunMeta) -> Result<(), ResultFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let stored = StoredResult::new(result, meta.clone());
    if !stored.is_packed {
      warn!("以全图掩码保存 {} 个实例, 文件可能很大", stored.boxes.len());
    }
    let mut file = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer(&mut file, &stored)?;
    file.flush()?;
    info!(
      "保存 {} 个实例到文件: {}",
      stored.boxes.len(),
      self.path.display()
    );
    Ok(())
  }

  pub fn load(&self) -> Result<StoredResult, ResultFileError> {
    let file = BufReader::new(File::open(&self.path)?);
    let stored: StoredResult = serde_json::from_reader(file)?;
    stored.check()?;
    info!(
      "读取 {} 个实例: {} (裁剪存储: {})",
      stored.boxes.len(),
      self.path.display(),
      stored.is_packed
    );
    Ok(stored)
  }
}
