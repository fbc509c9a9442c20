// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 切片推理模型接口
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

use crate::mask::BinaryMask;

/// 单个切片上的推理模型
///
/// 模型被视为外部黑盒：输入一张切片图像，输出切片局部坐标系下的检测结果。
/// 实现不得修改输入图像；失败时返回错误，由调用方按切片粒度处理。
pub trait Model {
  type Error;

  fn infer(&self, tile: &RgbImage) -> Result<Vec<RawDetection>, Self::Error>;
}

impl<F, E> Model for F
where
  F: Fn(&RgbImage) -> Result<Vec<RawDetection>, E>,
{
  type Error = E;

  fn infer(&self, tile: &RgbImage) -> Result<Vec<RawDetection>, Self::Error> {
    self(tile)
  }
}

/// 模型在切片局部坐标系下输出的一个实例
#[derive(Debug, Clone)]
pub struct RawDetection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub score: f32,
  /// 与切片同尺寸的掩码
  pub mask: BinaryMask,
}

impl RawDetection {
  pub fn new(bbox: [f32; 4], score: f32, mask: BinaryMask) -> Self {
    Self { bbox, score, mask }
  }

  /// 只输出掩码的模型可以由前景外接框得到边界框，空掩码返回 `None`
  pub fn from_mask(mask: BinaryMask, score: f32) -> Option<Self> {
    let bbox = mask.bounding_box()?;
    Some(Self { bbox, score, mask })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn closures_are_models() {
    let model = |tile: &RgbImage| -> Result<Vec<RawDetection>, String> {
      let mask = BinaryMask::new(tile.width(), tile.height());
      Ok(vec![RawDetection::new([1.0, 1.0, 3.0, 3.0], 0.8, mask)])
    };
    let tile = RgbImage::new(8, 8);
    let out = model.infer(&tile).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].mask.width(), 8);
  }

  #[test]
  fn detection_from_mask_uses_foreground_extent() {
    let mut mask = BinaryMask::new(10, 10);
    mask.set(1, 2, true);
    mask.set(4, 6, true);
    let det = RawDetection::from_mask(mask, 0.5).unwrap();
    assert_eq!(det.bbox, [1.0, 2.0, 5.0, 7.0]);
    assert!(RawDetection::from_mask(BinaryMask::new(4, 4), 0.5).is_none());
  }
}
