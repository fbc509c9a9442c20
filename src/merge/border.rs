// 该文件是 Shanan （山南西风） 项目的一部分。
// src/merge/border.rs - 切片边缘截断目标过滤
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

use crate::tile::TileEdgeFlags;

/// 默认边缘阈值（像素）
pub const DEFAULT_BORDER_THRESHOLD_PX: f32 = 2.0;

/// 判断一个切片局部坐标系下的边界框是否贴着被切开的切片边缘
///
/// 只有不与原图边缘重合的切片边才参与判断；被切开的目标由相邻的重叠切片
/// 完整检测。
pub fn touches_cut_edge(
  bbox: &[f32; 4],
  tile_width: u32,
  tile_height: u32,
  edge: &TileEdgeFlags,
  border_threshold_px: f32,
) -> bool {
  let (w, h) = (tile_width as f32, tile_height as f32);
  let [x0, y0, x1, y1] = *bbox;

  (!edge.left && x0 <= border_threshold_px)
    || (!edge.top && y0 <= border_threshold_px)
    || (!edge.right && x1 >= w - border_threshold_px)
    || (!edge.bottom && y1 >= h - border_threshold_px)
}

/// 返回与 `boxes` 一一对应的保留标记
pub fn filter_boundary_detections(
  boxes: &[[f32; 4]],
  tile_width: u32,
  tile_height: u32,
  edge: &TileEdgeFlags,
  border_threshold_px: f32,
) -> Vec<bool> {
  boxes
    .iter()
    .map(|bbox| !touches_cut_edge(bbox, tile_width, tile_height, edge, border_threshold_px))
    .collect()
}
