// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/unpack_result.rs - 读取并还原合并结果
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
use image::{GrayImage, Luma};
use url::Url;

use shanan_tiling::{
  FromUrl,
  input::{ImageFileRaster, RasterSource},
  mask::BinaryMask,
  output::{OutputWrapper, Render, ResultFile},
};
use tracing::{info, warn};

/// 读取切片推理结果记录，可选还原全图掩码并导出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 结果记录，例如 result:///data/result.json
  #[arg(long, value_name = "RESULT")]
  pub input: Url,
  /// 还原为全图掩码
  #[arg(long, default_value_t = false)]
  pub unpack: bool,
  /// 每个实例的掩码保存为 PNG 的目录
  #[arg(long, value_name = "DIR")]
  pub mask_dir: Option<PathBuf>,
  /// 打印每个实例的中心点
  #[arg(long, default_value_t = false)]
  pub centers: bool,
  /// 原始栅格，`--output` 需要；带 `geo` 参数时补全地理边界框
  #[arg(long, value_name = "SOURCE")]
  pub image: Option<Url>,
  /// 输出，例如 overlay:///data/overlay.png 或 result:///data/full.json
  #[arg(long, value_name = "OUTPUT", requires = "image")]
  pub output: Option<Url>,
}

fn mask_to_image(mask: &BinaryMask) -> GrayImage {
  GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
    Luma([if mask.get(x, y) { 255 } else { 0 }])
  })
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let stored = ResultFile::from_url(&args.input)?.load()?;
  let meta = stored.meta.clone();
  info!(
    "结果来源: {}, 生成时间: {}, 切片尺寸 {}, 重叠率 {}",
    meta.source, meta.created_at, meta.slice_size, meta.overlap_ratio
  );

  let raster = args
    .image
    .as_ref()
    .map(ImageFileRaster::from_url)
    .transpose()?;

  let now = std::time::Instant::now();
  let mut result = stored.into_merged(args.unpack);
  if result.boxes_geo.is_none()
    && let Some(geo) = raster.as_ref().and_then(|r| r.geo_transform())
  {
    info!("使用栅格地理参考计算地理边界框");
    result.georeference(&geo);
  }
  info!(
    "{} 个实例, 原图 {}x{}, 耗时: {:.2?}",
    result.len(),
    result.original_width,
    result.original_height,
    now.elapsed()
  );

  if args.centers {
    for (i, ([cx, cy], score)) in result.centers().iter().zip(&result.scores).enumerate() {
      match result.boxes_geo.as_ref().map(|g| g[i]) {
        Some([gx0, gy0, gx1, gy1]) => println!(
          "{}, {:.4}, {:.2}, {:.2}, {:.6}, {:.6}",
          i,
          score,
          cx,
          cy,
          (gx0 + gx1) * 0.5,
          (gy0 + gy1) * 0.5
        ),
        None => println!("{}, {:.4}, {:.2}, {:.2}", i, score, cx, cy),
      }
    }
  }

  if let Some(dir) = &args.mask_dir {
    std::fs::create_dir_all(dir)?;
    for (i, mask) in result.masks.iter().enumerate() {
      let mask = mask.mask();
      if mask.is_empty() {
        warn!("实例 {} 的掩码为空, 跳过", i);
        continue;
      }
      mask_to_image(mask).save(dir.join(format!("mask_{:05}.png", i)))?;
    }
    info!("保存 {} 个掩码到目录: {}", result.len(), dir.display());
  }

  if let Some(output) = &args.output {
    let Some(raster) = &raster else {
      bail!("--output 需要 --image");
    };
    let output = OutputWrapper::from_url_with_meta(output, meta)?;
    output.render_result(raster.image(), &result)?;
  }

  Ok(())
}
