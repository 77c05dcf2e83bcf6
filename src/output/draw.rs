// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use crate::model::Detection;

const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: i32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  // bbox 为原图像素坐标，截断为整数后绘制
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0] as i32).clamp(0, w - 1);
    let y_min = (bbox[1] as i32).clamp(0, h - 1);
    let x_max = (bbox[2] as i32).clamp(0, w - 1);
    let y_max = (bbox[3] as i32).clamp(0, h - 1);

    for t in 0..self.thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
      self.draw_bbox(image, &det.bbox);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(bbox: [f32; 4]) -> Detection {
    Detection {
      score: 0.9,
      bbox,
      landmarks: [[0.0; 2]; 5],
    }
  }

  #[test]
  fn box_edges_are_painted() {
    let mut image = RgbImage::new(32, 32);
    Draw::default().draw_detections(&mut image, &[det([4.7, 5.2, 20.0, 18.9])]);

    let red = Rgb(BOX_COLOR);
    assert_eq!(*image.get_pixel(4, 5), red);
    assert_eq!(*image.get_pixel(20, 18), red);
    assert_eq!(*image.get_pixel(12, 6), red);
    assert_eq!(*image.get_pixel(12, 12), Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_frame_boxes_are_clamped() {
    let mut image = RgbImage::new(16, 16);
    let draw = Draw::default();
    draw.draw_detections(
      &mut image,
      &[det([-10.0, -3.0, 40.0, 50.0]), det([5.0, 5.0, 5.0, 5.0])],
    );
    assert_eq!(*image.get_pixel(0, 0), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(15, 15), Rgb(BOX_COLOR));
  }
}
