// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 大幅栅格的切片推理与结果合并
//!
//! 栅格被切成带重叠的方形切片，逐个送入外部模型推理；切片边缘被截断的目标
//! 会被过滤，其余检测映射回原图坐标，最后经 IoU NMS 与 IoS 包含抑制两步
//! 全局去重。实例掩码只在边界框内保存。

pub mod config;
pub mod input;
pub mod mask;
pub mod merge;
pub mod model;
pub mod output;
pub mod task;
pub mod tile;

pub use crate::config::TilingConfig;
pub use crate::merge::{MergedResult, merge_and_deduplicate};
pub use crate::task::{CancelFlag, RunReport, TiledTask};
pub use crate::tile::generate_windows;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
