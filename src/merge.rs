// 该文件是 Shanan （山南西风） 项目的一部分。
// src/merge.rs - 切片检测结果的合并
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

pub mod border;
pub mod dedup;
pub mod remap;

pub use self::border::filter_boundary_detections;
pub use self::dedup::merge_and_deduplicate;
pub use self::remap::{GeoTransform, boxes_to_geo, remap_to_global};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  mask::{BinaryMask, MaskRepresentation, pack},
  model::RawDetection,
  tile::{SliceWindow, TileEdgeFlags, TilingError},
};

/// 检测来源切片
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileIndex {
  pub row: usize,
  pub col: usize,
}

impl From<&SliceWindow> for TileIndex {
  fn from(window: &SliceWindow) -> Self {
    Self {
      row: window.row,
      col: window.col,
    }
  }
}

/// 全图坐标系下的一个检测
#[derive(Debug, Clone)]
pub struct Detection {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub score: f32,
  /// 边界框内的掩码，左上角与取整后的边界框左上角对齐
  pub mask_crop: BinaryMask,
  pub bbox_geo: Option<[f64; 4]>,
  pub source: TileIndex,
}

/// 单个切片的处理统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileStats {
  pub tile: TileIndex,
  pub raw: usize,
  pub kept: usize,
}

/// 切片阶段：边缘过滤 → 坐标映射 → 掩码裁剪
///
/// 消费整块切片的推理输出，全尺寸掩码在裁剪后随 `raw` 一起释放。
pub fn process_tile(
  window: &SliceWindow,
  edge: &TileEdgeFlags,
  raw: Vec<RawDetection>,
  border_threshold_px: f32,
  geo: Option<&GeoTransform>,
) -> (Vec<Detection>, TileStats) {
  let (tile_w, tile_h) = (window.width(), window.height());
  let (origin_x, origin_y) = window.origin();
  let raw_count = raw.len();

  let boxes: Vec<[f32; 4]> = raw
    .iter()
    .map(|det| remap::clamp_box(&det.bbox, tile_w, tile_h))
    .collect();
  let keep = filter_boundary_detections(&boxes, tile_w, tile_h, edge, border_threshold_px);

  let detections: Vec<Detection> = raw
    .into_iter()
    .zip(boxes)
    .zip(keep)
    .filter_map(|((det, local), keep)| {
      if !keep {
        return None;
      }
      let mask_crop = pack(&local, &det.mask);
      let bbox = remap_to_global(&local, origin_x, origin_y);
      Some(Detection {
        bbox,
        score: det.score,
        mask_crop,
        bbox_geo: geo.map(|t| t.box_to_geo(&bbox)),
        source: window.into(),
      })
    })
    .collect();

  let stats = TileStats {
    tile: window.into(),
    raw: raw_count,
    kept: detections.len(),
  };
  (detections, stats)
}

/// 合并后的最终结果
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
  pub original_height: u32,
  pub original_width: u32,
  pub boxes: Vec<[f32; 4]>,
  pub scores: Vec<f32>,
  pub masks: Vec<MaskRepresentation>,
  pub boxes_geo: Option<Vec<[f64; 4]>>,
}

impl MergedResult {
  pub fn empty(original_height: u32, original_width: u32) -> Self {
    Self {
      original_height,
      original_width,
      boxes: Vec::new(),
      scores: Vec::new(),
      masks: Vec::new(),
      boxes_geo: None,
    }
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  /// 所有掩码均为裁剪存储（空结果视为已裁剪）
  pub fn is_packed(&self) -> bool {
    self.masks.iter().all(MaskRepresentation::is_packed)
  }

  pub fn centers(&self) -> Vec<[f32; 2]> {
    remap::box_centers(&self.boxes)
  }

  /// 用栅格的仿射变换重新计算全部地理边界框
  pub fn georeference(&mut self, transform: &GeoTransform) {
    self.boxes_geo = Some(boxes_to_geo(&self.boxes, transform));
  }

  /// 显式还原为全图掩码，内存占用为 N × H × W
  pub fn unpack(self) -> Self {
    let (h, w) = (self.original_height, self.original_width);
    let masks = self
      .masks
      .into_iter()
      .zip(&self.boxes)
      .map(|(mask, bbox)| MaskRepresentation::FullFrame(mask.into_full_frame(bbox, h, w)))
      .collect();
    Self { masks, ..self }
  }
}

/// 全局去重并组装 [`MergedResult`]
pub fn merge_detections(
  detections: Vec<Detection>,
  original_height: u32,
  original_width: u32,
  iou_threshold: f32,
  ios_threshold: f32,
) -> Result<MergedResult, TilingError> {
  let total = detections.len();
  let with_geo = !detections.is_empty() && detections.iter().all(|d| d.bbox_geo.is_some());

  let mut boxes = Vec::with_capacity(total);
  let mut scores = Vec::with_capacity(total);
  let mut payloads = Vec::with_capacity(total);
  for det in detections {
    boxes.push(det.bbox);
    scores.push(det.score);
    payloads.push((det.mask_crop, det.bbox_geo));
  }

  let (boxes, scores, payloads) =
    merge_and_deduplicate(boxes, scores, payloads, iou_threshold, ios_threshold)?;
  info!("全局去重: {} -> {}", total, boxes.len());

  let (masks, geo): (Vec<_>, Vec<_>) = payloads
    .into_iter()
    .map(|(crop, geo)| (MaskRepresentation::PackedCrop(crop), geo))
    .unzip();
  let boxes_geo = with_geo.then(|| geo.into_iter().flatten().collect());

  Ok(MergedResult {
    original_height,
    original_width,
    boxes,
    scores,
    masks,
    boxes_geo,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square_mask(tile: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> BinaryMask {
    let mut mask = BinaryMask::new(tile, tile);
    for y in y0..y1 {
      for x in x0..x1 {
        mask.set(x, y, true);
      }
    }
    mask
  }

  fn interior_window() -> (SliceWindow, TileEdgeFlags) {
    (
      SliceWindow {
        row: 1,
        col: 2,
        x0: 400,
        y0: 200,
        x1: 800,
        y1: 600,
      },
      TileEdgeFlags::default(),
    )
  }

  #[test]
  fn tile_processing_filters_remaps_and_packs() {
    let (window, edge) = interior_window();
    let raw = vec![
      RawDetection::new([90.0, 90.0, 110.0, 110.0], 0.9, square_mask(400, 90, 90, 110, 110)),
      RawDetection::new([0.0, 50.0, 30.0, 80.0], 0.8, square_mask(400, 0, 50, 30, 80)),
    ];
    let (dets, stats) = process_tile(&window, &edge, raw, 2.0, None);
    assert_eq!(stats, TileStats { tile: TileIndex { row: 1, col: 2 }, raw: 2, kept: 1 });
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].bbox, [490.0, 290.0, 510.0, 310.0]);
    assert_eq!((dets[0].mask_crop.width(), dets[0].mask_crop.height()), (20, 20));
    assert_eq!(dets[0].mask_crop.area(), 400);
    assert_eq!(dets[0].source, TileIndex { row: 1, col: 2 });
    assert!(dets[0].bbox_geo.is_none());
  }

  #[test]
  fn tile_processing_attaches_geo_boxes() {
    let (window, edge) = interior_window();
    let raw = vec![RawDetection::new(
      [90.0, 90.0, 110.0, 110.0],
      0.9,
      square_mask(400, 90, 90, 110, 110),
    )];
    let geo = GeoTransform::identity();
    let (dets, _) = process_tile(&window, &edge, raw, 2.0, Some(&geo));
    assert_eq!(dets[0].bbox_geo, Some([490.0, 290.0, 510.0, 310.0]));
  }

  #[test]
  fn empty_merge_has_typed_empty_containers() {
    let merged = merge_detections(Vec::new(), 1000, 800, 0.5, 0.95).unwrap();
    assert_eq!(merged, MergedResult::empty(1000, 800));
    assert!(merged.is_empty());
    assert!(merged.is_packed());
    assert!(merged.centers().is_empty());
  }

  #[test]
  fn georeference_fills_geo_boxes() {
    let mut merged = MergedResult::empty(100, 100);
    merged.georeference(&GeoTransform::identity());
    assert_eq!(merged.boxes_geo, Some(Vec::new()));

    merged.boxes.push([10.0, 20.0, 30.0, 40.0]);
    merged.scores.push(0.5);
    merged
      .masks
      .push(MaskRepresentation::PackedCrop(BinaryMask::new(20, 20)));
    merged.georeference(&GeoTransform::north_up(100.0, 200.0, 2.0, 2.0));
    assert_eq!(merged.boxes_geo, Some(vec![[120.0, 120.0, 160.0, 160.0]]));
  }

  #[test]
  fn unpack_restores_full_frame_masks() {
    let (window, edge) = interior_window();
    let raw = vec![RawDetection::new(
      [90.0, 90.0, 110.0, 110.0],
      0.9,
      square_mask(400, 95, 95, 105, 105),
    )];
    let (dets, _) = process_tile(&window, &edge, raw, 2.0, None);
    let merged = merge_detections(dets, 1000, 1000, 0.5, 0.95).unwrap();
    assert!(merged.is_packed());

    let full = merged.unpack();
    assert!(!full.is_packed());
    let mask = full.masks[0].mask();
    assert_eq!((mask.width(), mask.height()), (1000, 1000));
    assert_eq!(mask.area(), 100);
    assert!(mask.get(495, 295));
    assert!(!mask.get(494, 295));
  }
}
