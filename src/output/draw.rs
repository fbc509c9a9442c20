// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 合并结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  mask::{MaskRepresentation, round_box},
  merge::MergedResult,
};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const MASK_COLOR: [u8; 3] = [255, 64, 0];
const MASK_ALPHA: f32 = 0.45;
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  box_color: [u8; 3],
  mask_color: [u8; 3],
  mask_alpha: f32,
  box_thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      box_color: BOX_COLOR,
      mask_color: MASK_COLOR,
      mask_alpha: MASK_ALPHA,
      box_thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_box_color(mut self, color: [u8; 3]) -> Self {
    self.box_color = color;
    self
  }

  pub fn with_mask_color(mut self, color: [u8; 3], alpha: f32) -> Self {
    self.mask_color = color;
    self.mask_alpha = alpha.clamp(0.0, 1.0);
    self
  }

  fn blend(&self, pixel: &mut Rgb<u8>) {
    for (c, m) in pixel.0.iter_mut().zip(self.mask_color) {
      let v = *c as f32 * (1.0 - self.mask_alpha) + m as f32 * self.mask_alpha;
      *c = v.round().clamp(0.0, 255.0) as u8;
    }
  }

  /// 掩码以半透明颜色叠加；裁剪掩码按边界框左上角定位
  fn draw_mask(&self, image: &mut RgbImage, bbox: &[f32; 4], mask: &MaskRepresentation) {
    let (offset_x, offset_y) = match mask {
      MaskRepresentation::PackedCrop(_) => {
        let [x0, y0, _, _] = round_box(bbox);
        (x0.max(0) as u32, y0.max(0) as u32)
      }
      MaskRepresentation::FullFrame(_) => (0, 0),
    };
    let mask = mask.mask();
    for y in 0..mask.height() {
      for x in 0..mask.width() {
        if !mask.get(x, y) {
          continue;
        }
        let (px, py) = (x + offset_x, y + offset_y);
        if px < image.width() && py < image.height() {
          self.blend(image.get_pixel_mut(px, py));
        }
      }
    }
  }

  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    for t in 0..self.box_thickness {
      let (rw, rh) = (x_max - x_min - 2 * t + 1, y_max - y_min - 2 * t + 1);
      if rw <= 0 || rh <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(rw as u32, rh as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  pub fn draw_result(&self, image: &mut RgbImage, result: &MergedResult) {
    for (bbox, mask) in result.boxes.iter().zip(&result.masks) {
      self.draw_mask(image, bbox, mask);
    }
    for bbox in result.boxes.iter() {
      self.draw_bbox(image, bbox);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mask::BinaryMask;

  fn one_instance(mask: MaskRepresentation) -> MergedResult {
    MergedResult {
      original_height: 40,
      original_width: 40,
      boxes: vec![[10.0, 10.0, 20.0, 20.0]],
      scores: vec![0.9],
      masks: vec![mask],
      boxes_geo: None,
    }
  }

  #[test]
  fn boxes_and_packed_masks_are_drawn() {
    let crop = BinaryMask::from_vec(10, 10, vec![true; 100]).unwrap();
    let result = one_instance(MaskRepresentation::PackedCrop(crop));
    let mut image = RgbImage::new(40, 40);
    Draw::default().draw_result(&mut image, &result);

    assert_eq!(image.get_pixel(10, 15), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(20, 15), &Rgb(BOX_COLOR));
    let inside = image.get_pixel(15, 15);
    assert!(inside[0] > 0 && inside[2] == 0);
    assert_eq!(image.get_pixel(30, 30), &Rgb([0, 0, 0]));
  }

  #[test]
  fn full_frame_masks_are_not_offset() {
    let mut full = BinaryMask::new(40, 40);
    full.set(15, 15, true);
    let result = one_instance(MaskRepresentation::FullFrame(full));
    let mut image = RgbImage::new(40, 40);
    Draw::default().draw_result(&mut image, &result);
    assert_ne!(image.get_pixel(15, 15), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(16, 15), &Rgb([0, 0, 0]));
  }

  #[test]
  fn boxes_outside_image_are_clamped() {
    let crop = BinaryMask::new(0, 0);
    let mut result = one_instance(MaskRepresentation::PackedCrop(crop));
    result.boxes[0] = [-10.0, 35.0, 80.0, 90.0];
    let mut image = RgbImage::new(40, 40);
    Draw::default().draw_result(&mut image, &result);
    assert_eq!(image.get_pixel(0, 39), &Rgb(BOX_COLOR));
  }
}
