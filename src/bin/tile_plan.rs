// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/tile_plan.rs - 打印切片窗口网格
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

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use url::Url;

use shanan_tiling::{
  FromUrl, TilingConfig, generate_windows,
  input::{ImageFileRaster, RasterSource},
};
use tracing::info;

/// 打印覆盖整幅栅格的切片窗口
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 栅格来源，例如 image:///data/dom.png
  #[arg(long, value_name = "SOURCE", conflicts_with_all = ["width", "height"])]
  pub input: Option<Url>,
  /// 栅格宽度（不读取文件时）
  #[arg(long, requires = "height")]
  pub width: Option<u32>,
  /// 栅格高度（不读取文件时）
  #[arg(long, requires = "width")]
  pub height: Option<u32>,
  /// JSON 配置文件
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
  /// 切片尺寸，覆盖配置文件
  #[arg(long)]
  pub slice_size: Option<u32>,
  /// 重叠率，覆盖配置文件
  #[arg(long)]
  pub overlap_ratio: Option<f32>,
  /// 以 JSON 输出窗口列表
  #[arg(long, default_value_t = false)]
  pub json: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let mut config = match &args.config {
    Some(path) => TilingConfig::from_json_file(path)?,
    None => TilingConfig::default(),
  };
  if let Some(slice_size) = args.slice_size {
    config = config.with_slice_size(slice_size);
  }
  if let Some(overlap_ratio) = args.overlap_ratio {
    config = config.with_overlap_ratio(overlap_ratio);
  }
  config.validate()?;

  let (width, height) = match (&args.input, args.width, args.height) {
    (Some(url), _, _) => {
      let raster = ImageFileRaster::from_url(url)?;
      (raster.width(), raster.height())
    }
    (None, Some(width), Some(height)) => (width, height),
    _ => bail!("需要 --input 或者 --width 与 --height"),
  };

  let windows = generate_windows(width, height, config.slice_size, config.overlap_ratio)?;
  info!(
    "栅格 {}x{}, 切片尺寸 {}, 重叠率 {}: 共 {} 个切片",
    width,
    height,
    config.slice_size,
    config.overlap_ratio,
    windows.len()
  );

  if args.json {
    println!("{}", serde_json::to_string_pretty(&windows)?);
  } else {
    for (window, edge) in windows.iter() {
      println!(
        "({:>3}, {:>3})  x {:>6}..{:<6} y {:>6}..{:<6} 边缘 L{} T{} R{} B{}",
        window.row,
        window.col,
        window.x0,
        window.x1,
        window.y0,
        window.y1,
        edge.left as u8,
        edge.top as u8,
        edge.right as u8,
        edge.bottom as u8
      );
    }
  }

  Ok(())
}
