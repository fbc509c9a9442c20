// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 切片推理任务
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
  fmt::Display,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
  },
  thread,
  time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::TilingConfig,
  input::RasterSource,
  merge::{Detection, MergedResult, TileIndex, TileStats, merge_detections, process_tile},
  model::{Model, RawDetection},
  tile::{SliceWindow, TileEdgeFlags, TilingError, generate_windows},
};

pub trait Task<I, M>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: &I, model: &M) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("参数错误: {0}")]
  Tiling(#[from] TilingError),
  #[error("任务已取消")]
  Cancelled,
  #[error("后处理线程异常退出")]
  WorkerPanicked,
}

/// 跨线程共享的取消标记，在切片之间检查
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFailure {
  pub tile: TileIndex,
  pub message: String,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunReport {
  pub tiles_total: usize,
  pub failures: Vec<TileFailure>,
  pub tile_stats: Vec<TileStats>,
  pub elapsed: Duration,
}

impl RunReport {
  pub fn tiles_failed(&self) -> usize {
    self.failures.len()
  }

  /// 边缘过滤前的检测总数
  pub fn raw_detections(&self) -> usize {
    self.tile_stats.iter().map(|s| s.raw).sum()
  }

  /// 边缘过滤后、全局去重前的检测总数
  pub fn kept_detections(&self) -> usize {
    self.tile_stats.iter().map(|s| s.kept).sum()
  }
}

struct TileJob {
  window: SliceWindow,
  edge: TileEdgeFlags,
  raw: Vec<RawDetection>,
}

type ProgressFn<'a> = Box<dyn FnMut(usize, usize) + 'a>;

/// 等待后处理的切片数上限
pub const MAX_PENDING_TILES: usize = 1;

fn tile_channel() -> (mpsc::SyncSender<TileJob>, mpsc::Receiver<TileJob>) {
  mpsc::sync_channel(MAX_PENDING_TILES)
}

/// 切片 → 推理 → 边缘过滤与坐标映射 → 全局去重
///
/// 推理在调用线程上逐个切片进行；已完成切片的后处理交给单独的线程，
/// 与下一个切片的推理重叠执行。后处理线程结束后才开始全局去重。
///
/// 队列中最多积压 [`MAX_PENDING_TILES`] 个切片，后处理跟不上时推理阻塞在
/// 发送上。驻留内存的全尺寸掩码不超过 `MAX_PENDING_TILES + 2` 个切片。
pub struct TiledTask<'a> {
  config: TilingConfig,
  cancel: CancelFlag,
  progress: Option<ProgressFn<'a>>,
}

impl<'a> TiledTask<'a> {
  pub fn new(config: TilingConfig) -> Self {
    Self {
      config,
      cancel: CancelFlag::default(),
      progress: None,
    }
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  /// 每处理完一个切片回调一次 `(已完成, 总数)`
  pub fn with_progress<F>(mut self, progress: F) -> Self
  where
    F: FnMut(usize, usize) + 'a,
  {
    self.progress = Some(Box::new(progress));
    self
  }

  pub fn config(&self) -> &TilingConfig {
    &self.config
  }

  fn infer_tile<R, M>(raster: &R, model: &M, window: &SliceWindow) -> Result<Vec<RawDetection>, String>
  where
    R: RasterSource,
    R::Error: Display,
    M: Model,
    M::Error: Display,
  {
    let tile = raster
      .read_window(window)
      .map_err(|e| format!("读取切片失败: {}", e))?;
    model.infer(&tile).map_err(|e| format!("推理失败: {}", e))
  }

  pub fn run<R, M>(mut self, raster: &R, model: &M) -> Result<(MergedResult, RunReport), TaskError>
  where
    R: RasterSource,
    R::Error: Display,
    M: Model,
    M::Error: Display,
  {
    self.config.validate()?;
    let (width, height) = (raster.width(), raster.height());
    let windows = generate_windows(
      width,
      height,
      self.config.slice_size,
      self.config.overlap_ratio,
    )?;
    let total = windows.len();
    let geo = raster.geo_transform();
    info!(
      "开始切片推理: 原图 {}x{}, 共 {} 个切片",
      width, height, total
    );
    let start = Instant::now();

    let (tx, rx) = tile_channel();
    let border_threshold_px = self.config.border_threshold_px;
    let worker = thread::spawn(move || {
      let mut detections: Vec<Detection> = Vec::new();
      let mut stats = Vec::new();
      for job in rx {
        let (dets, stat) = process_tile(
          &job.window,
          &job.edge,
          job.raw,
          border_threshold_px,
          geo.as_ref(),
        );
        debug!(
          "切片 ({}, {}) 边缘过滤: {} -> {}",
          stat.tile.row, stat.tile.col, stat.raw, stat.kept
        );
        detections.extend(dets);
        stats.push(stat);
      }
      (detections, stats)
    });

    let mut failures = Vec::new();
    let mut cancelled = false;
    for (index, (window, edge)) in windows.into_iter().enumerate() {
      if self.cancel.is_cancelled() {
        cancelled = true;
        break;
      }

      let now = Instant::now();
      match Self::infer_tile(raster, model, &window) {
        Ok(raw) => {
          debug!(
            "切片 ({}, {}) 推理完成: {} 个实例, 耗时: {:.2?}",
            window.row,
            window.col,
            raw.len(),
            now.elapsed()
          );
          if tx.send(TileJob { window, edge, raw }).is_err() {
            break;
          }
        }
        Err(message) => {
          warn!("切片 ({}, {}) {}", window.row, window.col, message);
          failures.push(TileFailure {
            tile: (&window).into(),
            message,
          });
        }
      }

      if let Some(progress) = self.progress.as_mut() {
        progress(index + 1, total);
      }
    }
    drop(tx);

    let (detections, tile_stats) = worker.join().map_err(|_| TaskError::WorkerPanicked)?;
    if cancelled {
      warn!("任务在切片之间被取消, 丢弃部分结果");
      return Err(TaskError::Cancelled);
    }
    if !failures.is_empty() {
      warn!("{} / {} 个切片处理失败", failures.len(), total);
    }

    let result = merge_detections(
      detections,
      height,
      width,
      self.config.iou_threshold,
      self.config.ios_threshold,
    )?;
    let elapsed = start.elapsed();
    info!("切片推理完成: {} 个实例, 耗时: {:.2?}", result.len(), elapsed);

    let report = RunReport {
      tiles_total: total,
      failures,
      tile_stats,
      elapsed,
    };
    Ok((result, report))
  }
}

impl<R, M> Task<R, M> for TiledTask<'_>
where
  R: RasterSource,
  R::Error: Display,
  M: Model,
  M::Error: Display,
{
  type Output = (MergedResult, RunReport);
  type Error = TaskError;

  fn run_task(self, input: &R, model: &M) -> Result<Self::Output, Self::Error> {
    self.run(input, model)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use image::{Rgb, RgbImage};

  use super::*;
  use crate::mask::BinaryMask;

  fn config() -> TilingConfig {
    TilingConfig::default()
      .with_slice_size(100)
      .with_overlap_ratio(0.0)
  }

  /// 第一个像素的红色通道记录切片所在列
  fn raster() -> RgbImage {
    RgbImage::from_fn(300, 200, |x, _| Rgb([(x / 100) as u8, 0, 0]))
  }

  fn centered_detection(tile: &RgbImage) -> RawDetection {
    let mut mask = BinaryMask::new(tile.width(), tile.height());
    for y in 40..60 {
      for x in 40..60 {
        mask.set(x, y, true);
      }
    }
    RawDetection::new([40.0, 40.0, 60.0, 60.0], 0.5, mask)
  }

  #[test]
  fn every_tile_contributes_detections() {
    let model = |tile: &RgbImage| -> Result<Vec<RawDetection>, String> {
      Ok(vec![centered_detection(tile)])
    };
    let (result, report) = TiledTask::new(config()).run(&raster(), &model).unwrap();
    assert_eq!(report.tiles_total, 6);
    assert_eq!(report.tiles_failed(), 0);
    assert_eq!(report.raw_detections(), 6);
    assert_eq!(report.kept_detections(), 6);
    assert_eq!(result.len(), 6);
    assert!(result.is_packed());
    assert_eq!((result.original_width, result.original_height), (300, 200));
  }

  #[test]
  fn failing_tile_is_skipped_and_reported() {
    let model = |tile: &RgbImage| -> Result<Vec<RawDetection>, String> {
      if tile.get_pixel(0, 0)[0] == 1 {
        return Err("设备超时".to_string());
      }
      Ok(vec![centered_detection(tile)])
    };
    let (result, report) = TiledTask::new(config()).run(&raster(), &model).unwrap();
    assert_eq!(report.tiles_failed(), 2);
    assert!(report.failures.iter().all(|f| f.tile.col == 1));
    assert!(report.failures[0].message.contains("设备超时"));
    assert_eq!(result.len(), 4);
  }

  #[test]
  fn progress_is_reported_per_tile() {
    let seen = RefCell::new(Vec::new());
    let model = |_: &RgbImage| -> Result<Vec<RawDetection>, String> { Ok(Vec::new()) };
    let (result, _) = TiledTask::new(config())
      .with_progress(|done, total| seen.borrow_mut().push((done, total)))
      .run(&raster(), &model)
      .unwrap();
    assert!(result.is_empty());
    assert_eq!(
      seen.into_inner(),
      (1..=6).map(|i| (i, 6)).collect::<Vec<_>>()
    );
  }

  #[test]
  fn cancellation_between_tiles_discards_the_run() {
    let cancel = CancelFlag::new();
    let trigger = cancel.clone();
    let calls = RefCell::new(0);
    let model = |tile: &RgbImage| -> Result<Vec<RawDetection>, String> {
      *calls.borrow_mut() += 1;
      Ok(vec![centered_detection(tile)])
    };
    let outcome = TiledTask::new(config())
      .with_cancel_flag(cancel)
      .with_progress(move |done, _| {
        if done == 2 {
          trigger.cancel();
        }
      })
      .run(&raster(), &model);
    assert!(matches!(outcome, Err(TaskError::Cancelled)));
    assert_eq!(*calls.borrow(), 2);
  }

  #[test]
  fn empty_raster_gives_empty_result() {
    let model = |_: &RgbImage| -> Result<Vec<RawDetection>, String> {
      Err("不应被调用".to_string())
    };
    let (result, report) = TiledTask::new(config())
      .run(&RgbImage::new(0, 0), &model)
      .unwrap();
    assert_eq!(result, MergedResult::empty(0, 0));
    assert_eq!(report.tiles_total, 0);
  }

  #[test]
  fn tile_queue_is_bounded() {
    let (tx, _rx) = tile_channel();
    let job = || TileJob {
      window: SliceWindow {
        row: 0,
        col: 0,
        x0: 0,
        y0: 0,
        x1: 1,
        y1: 1,
      },
      edge: TileEdgeFlags::all(),
      raw: Vec::new(),
    };
    for _ in 0..MAX_PENDING_TILES {
      assert!(tx.try_send(job()).is_ok());
    }
    assert!(matches!(tx.try_send(job()), Err(mpsc::TrySendError::Full(_))));
  }

  #[test]
  fn many_tiles_flow_through_bounded_queue() {
    let model = |tile: &RgbImage| -> Result<Vec<RawDetection>, String> {
      Ok(vec![centered_detection(tile), centered_detection(tile)])
    };
    let config = config().with_slice_size(100).with_overlap_ratio(0.5);
    let raster = RgbImage::new(1000, 800);
    let (result, report) = TiledTask::new(config).run(&raster, &model).unwrap();
    assert_eq!(report.tiles_total, 19 * 15);
    assert_eq!(report.tile_stats.len(), report.tiles_total);
    assert_eq!(report.raw_detections(), 2 * report.tiles_total);
    assert!(!result.is_empty());
  }

  #[test]
  fn invalid_config_fails_before_inference() {
    let model = |_: &RgbImage| -> Result<Vec<RawDetection>, String> { Ok(Vec::new()) };
    let outcome = TiledTask::new(config().with_iou_threshold(1.5)).run(&raster(), &model);
    assert!(matches!(
      outcome,
      Err(TaskError::Tiling(TilingError::InvalidThreshold { .. }))
    ));
  }
}
