// 该文件是 Shanan （山南西风） 项目的一部分。
// src/merge/dedup.rs - 全局去重（IoU NMS + IoS 包含抑制）
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

use std::cmp::Ordering;

use tracing::debug;

use crate::tile::TilingError;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOS_THRESHOLD: f32 = 0.95;

pub fn box_area(b: &[f32; 4]) -> f32 {
  (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

fn intersection_area(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);
  (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
}

/// 交并比，分母为零时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let intersection = intersection_area(a, b);
  let union = box_area(a) + box_area(b) - intersection;
  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 交集与较小框面积之比，用于识别“大框包小框”
pub fn ios(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let smaller = box_area(a).min(box_area(b));
  if smaller > 0.0 {
    intersection_area(a, b) / smaller
  } else {
    0.0
  }
}

pub fn check_threshold(name: &'static str, value: f32) -> Result<(), TilingError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(TilingError::InvalidThreshold { name, value })
  }
}

/// 按分数降序排列的下标
///
/// 分数相同时面积大的在前，再按坐标排序，排序结果与输入顺序无关；
/// 同分的外框因此总是先于被它包含的小框。
pub fn score_order(boxes: &[[f32; 4]], scores: &[f32]) -> Vec<usize> {
  let mut order: Vec<usize> = (0..scores.len()).collect();
  order.sort_by(|&a, &b| {
    scores[b]
      .total_cmp(&scores[a])
      .then_with(|| box_area(&boxes[b]).total_cmp(&box_area(&boxes[a])))
      .then_with(|| {
        boxes[a]
          .iter()
          .zip(&boxes[b])
          .map(|(x, y)| x.total_cmp(y))
          .find(|o| o.is_ne())
          .unwrap_or(Ordering::Equal)
      })
  });
  order
}

/// 第一阶段：贪心 IoU NMS，`order` 必须已按分数降序排列
pub fn nms(boxes: &[[f32; 4]], order: &[usize], iou_threshold: f32) -> Vec<usize> {
  let mut suppressed = vec![false; order.len()];
  let mut keep = Vec::new();

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }
    let best = &boxes[order[i]];
    keep.push(order[i]);
    for j in (i + 1)..order.len() {
      if !suppressed[j] && iou(best, &boxes[order[j]]) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }
  keep
}

/// 第二阶段：在 NMS 结果上做 IoS 包含抑制，`order` 为 NMS 保留的下标（分数降序）
///
/// 复杂度 O(K²)，K 为 NMS 后的数量。
pub fn suppress_contained(boxes: &[[f32; 4]], order: &[usize], ios_threshold: f32) -> Vec<usize> {
  let mut suppressed = vec![false; order.len()];

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }
    let outer = &boxes[order[i]];
    for j in (i + 1)..order.len() {
      if !suppressed[j] && ios(outer, &boxes[order[j]]) > ios_threshold {
        suppressed[j] = true;
      }
    }
  }

  order
    .iter()
    .zip(suppressed)
    .filter_map(|(&index, s)| (!s).then_some(index))
    .collect()
}

/// 两阶段抑制，返回保留下标（分数降序）
pub fn suppress(
  boxes: &[[f32; 4]],
  scores: &[f32],
  iou_threshold: f32,
  ios_threshold: f32,
) -> Result<Vec<usize>, TilingError> {
  check_threshold("iou_threshold", iou_threshold)?;
  check_threshold("ios_threshold", ios_threshold)?;
  if boxes.len() != scores.len() {
    return Err(TilingError::LengthMismatch {
      boxes: boxes.len(),
      scores: scores.len(),
      payloads: scores.len(),
    });
  }

  let order = score_order(boxes, scores);
  if order.len() < 2 {
    return Ok(order);
  }

  let after_nms = nms(boxes, &order, iou_threshold);
  debug!("IoU NMS: {} -> {}", order.len(), after_nms.len());
  if after_nms.len() < 2 {
    return Ok(after_nms);
  }

  let after_ios = suppress_contained(boxes, &after_nms, ios_threshold);
  debug!("IoS 抑制: {} -> {}", after_nms.len(), after_ios.len());
  Ok(after_ios)
}

/// 合并所有切片的检测并去重
///
/// `payloads` 与 `boxes`/`scores` 一一对应（通常是裁剪掩码），随保留结果一起
/// 移动，不做复制。输出按分数降序排列；0 或 1 个输入原样返回。
pub fn merge_and_deduplicate<T>(
  boxes: Vec<[f32; 4]>,
  scores: Vec<f32>,
  payloads: Vec<T>,
  iou_threshold: f32,
  ios_threshold: f32,
) -> Result<(Vec<[f32; 4]>, Vec<f32>, Vec<T>), TilingError> {
  if boxes.len() != scores.len() || boxes.len() != payloads.len() {
    return Err(TilingError::LengthMismatch {
      boxes: boxes.len(),
      scores: scores.len(),
      payloads: payloads.len(),
    });
  }
  if boxes.len() < 2 {
    check_threshold("iou_threshold", iou_threshold)?;
    check_threshold("ios_threshold", ios_threshold)?;
    return Ok((boxes, scores, payloads));
  }

  let keep = suppress(&boxes, &scores, iou_threshold, ios_threshold)?;

  let mut slots: Vec<Option<T>> = payloads.into_iter().map(Some).collect();
  let mut kept_boxes = Vec::with_capacity(keep.len());
  let mut kept_scores = Vec::with_capacity(keep.len());
  let mut kept_payloads = Vec::with_capacity(keep.len());
  for index in keep {
    if let Some(payload) = slots[index].take() {
      kept_boxes.push(boxes[index]);
      kept_scores.push(scores[index]);
      kept_payloads.push(payload);
    }
  }
  Ok((kept_boxes, kept_scores, kept_payloads))
}
