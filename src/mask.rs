// 该文件是 Shanan （山南西风） 项目的一部分。
// src/mask.rs - 实例掩码的裁剪存储与还原
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

//! 实例掩码只在其边界框范围内保存（裁剪存储），内存占用为
//! O(Σ 实例面积) 而不是 O(N × 全图面积)。需要全图掩码时通过 [`unpack`]
//! 显式还原。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 行优先的二值掩码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RleMask", try_from = "RleMask")]
pub struct BinaryMask {
  width: u32,
  height: u32,
  data: Box<[bool]>,
}

#[derive(Error, Debug)]
pub enum MaskError {
  #[error("掩码数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("掩码尺寸溢出: {width}x{height}")]
  SizeOverflow { width: u32, height: u32 },
}

impl BinaryMask {
  pub fn new(width: u32, height: u32) -> Self {
    let size = width as usize * height as usize;
    Self {
      width,
      height,
      data: vec![false; size].into_boxed_slice(),
    }
  }

  pub fn from_vec(width: u32, height: u32, data: Vec<bool>) -> Result<Self, MaskError> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(MaskError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 由浮点掩码（概率或 logits）生成二值掩码，大于 `threshold` 的像素为前景
  pub fn from_scores(
    width: u32,
    height: u32,
    scores: &[f32],
    threshold: f32,
  ) -> Result<Self, MaskError> {
    Self::from_vec(width, height, scores.iter().map(|&v| v > threshold).collect())
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[bool] {
    &self.data
  }

  pub fn get(&self, x: u32, y: u32) -> bool {
    if x >= self.width || y >= self.height {
      return false;
    }
    self.data[y as usize * self.width as usize + x as usize]
  }

  pub fn set(&mut self, x: u32, y: u32, value: bool) {
    if x < self.width && y < self.height {
      self.data[y as usize * self.width as usize + x as usize] = value;
    }
  }

  /// 前景像素数
  pub fn area(&self) -> usize {
    self.data.iter().filter(|&&v| v).count()
  }

  /// 复制 `[x0, x1) × [y0, y1)` 区域，范围会先截断到掩码内部
  pub fn crop(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> BinaryMask {
    let x1 = x1.min(self.width);
    let y1 = y1.min(self.height);
    let x0 = x0.min(x1);
    let y0 = y0.min(y1);
    let (w, h) = (x1 - x0, y1 - y0);
    let mut data = Vec::with_capacity(w as usize * h as usize);
    for y in y0..y1 {
      let start = y as usize * self.width as usize;
      data.extend_from_slice(&self.data[start + x0 as usize..start + x1 as usize]);
    }
    BinaryMask {
      width: w,
      height: h,
      data: data.into_boxed_slice(),
    }
  }

  /// 前景像素的外接框 `[x0, y0, x1, y1]`（右下角为开区间），无前景时返回 `None`
  pub fn bounding_box(&self) -> Option<[f32; 4]> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..self.height {
      for x in 0..self.width {
        if !self.get(x, y) {
          continue;
        }
        bounds = Some(match bounds {
          None => (x, y, x, y),
          Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
      }
    }
    bounds.map(|(x0, y0, x1, y1)| [x0 as f32, y0 as f32, (x1 + 1) as f32, (y1 + 1) as f32])
  }
}

/// 掩码的两种表示：边界框内裁剪，或全图尺寸
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "mask", rename_all = "snake_case")]
pub enum MaskRepresentation {
  PackedCrop(BinaryMask),
  FullFrame(BinaryMask),
}

impl MaskRepresentation {
  pub fn is_packed(&self) -> bool {
    matches!(self, MaskRepresentation::PackedCrop(_))
  }

  pub fn mask(&self) -> &BinaryMask {
    match self {
      MaskRepresentation::PackedCrop(mask) | MaskRepresentation::FullFrame(mask) => mask,
    }
  }

  /// 转为全图掩码，已经是全图时原样返回
  pub fn into_full_frame(self, bbox: &[f32; 4], full_height: u32, full_width: u32) -> BinaryMask {
    match self {
      MaskRepresentation::PackedCrop(crop) => unpack(bbox, &crop, full_height, full_width),
      MaskRepresentation::FullFrame(mask) => mask,
    }
  }
}

/// 边界框四角取整后的像素坐标
pub fn round_box(bbox: &[f32; 4]) -> [i64; 4] {
  [
    bbox[0].round() as i64,
    bbox[1].round() as i64,
    bbox[2].round() as i64,
    bbox[3].round() as i64,
  ]
}

fn clamp_axis(v: i64, limit: u32) -> u32 {
  v.clamp(0, limit as i64) as u32
}

/// 将掩码裁剪到取整后的边界框内，边界框会先截断到掩码范围
pub fn pack(bbox: &[f32; 4], mask: &BinaryMask) -> BinaryMask {
  let [bx0, by0, bx1, by1] = round_box(bbox);
  let x0 = clamp_axis(bx0, mask.width());
  let y0 = clamp_axis(by0, mask.height());
  let x1 = clamp_axis(bx1, mask.width()).max(x0);
  let y1 = clamp_axis(by1, mask.height()).max(y0);
  mask.crop(x0, y0, x1, y1)
}

/// 将裁剪掩码写回全图尺寸
///
/// 裁剪尺寸与边界框取整尺寸可能相差一个像素，此时按
/// `min(裁剪尺寸, 剩余画幅)` 截断写入区域，不报错。
pub fn unpack(bbox: &[f32; 4], crop: &BinaryMask, full_height: u32, full_width: u32) -> BinaryMask {
  let mut full = BinaryMask::new(full_width, full_height);
  let [bx0, by0, _, _] = round_box(bbox);
  let x0 = clamp_axis(bx0, full_width);
  let y0 = clamp_axis(by0, full_height);
  let w = crop.width().min(full_width - x0) as usize;
  let h = crop.height().min(full_height - y0) as usize;

  for row in 0..h {
    let src = row * crop.width() as usize;
    let dst = (y0 as usize + row) * full_width as usize + x0 as usize;
    full.data[dst..dst + w].copy_from_slice(&crop.data[src..src + w]);
  }
  full
}

/// 持久化格式：行优先游程编码，第一段计数为背景
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleMask {
  pub width: u32,
  pub height: u32,
  pub counts: Vec<u32>,
}

impl From<BinaryMask> for RleMask {
  fn from(mask: BinaryMask) -> Self {
    let mut counts = Vec::new();
    let mut current = false;
    let mut run = 0u32;
    for &v in mask.data.iter() {
      if v != current {
        counts.push(run);
        run = 0;
        current = v;
      }
      run += 1;
    }
    counts.push(run);
    RleMask {
      width: mask.width,
      height: mask.height,
      counts,
    }
  }
}

impl TryFrom<RleMask> for BinaryMask {
  type Error = MaskError;

  fn try_from(rle: RleMask) -> Result<Self, Self::Error> {
    let overflow = MaskError::SizeOverflow {
      width: rle.width,
      height: rle.height,
    };
    let expected = (rle.width as usize)
      .checked_mul(rle.height as usize)
      .ok_or(overflow)?;
    let actual = rle
      .counts
      .iter()
      .try_fold(0usize, |acc, &c| acc.checked_add(c as usize))
      .unwrap_or(usize::MAX);
    if actual != expected {
      return Err(MaskError::LengthMismatch { expected, actual });
    }

    let mut data = Vec::with_capacity(expected);
    let mut value = false;
    for &count in &rle.counts {
      data.extend(std::iter::repeat_n(value, count as usize));
      value = !value;
    }
    BinaryMask::from_vec(rle.width, rle.height, data)
  }
}
