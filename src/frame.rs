// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/frame.rs - 代表帧加载与推理输入准备
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

use std::path::Path;

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::model::DecodeScale;

const BGR_CHANNELS: usize = 3;
/// 训练时使用的 BGR 通道均值
pub const BGR_MEAN: [f32; 3] = [104.0, 117.0, 123.0];

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("空图像: {0}")]
  EmptyImage(String),
}

pub fn load_frame(path: &Path) -> Result<RgbImage, FrameError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  let image = image.to_rgb8();
  if image.width() == 0 || image.height() == 0 {
    return Err(FrameError::EmptyImage(path.display().to_string()));
  }
  Ok(image)
}

/// 推理前的缩放策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePolicy {
  /// 短边目标尺寸，同时也是长边上限
  pub long_side: u32,
  /// 为 true 时保持原图尺寸
  pub origin_size: bool,
}

impl Default for ResizePolicy {
  fn default() -> Self {
    Self {
      long_side: 320,
      origin_size: false,
    }
  }
}

impl ResizePolicy {
  pub fn ratio(&self, width: u32, height: u32) -> f32 {
    if self.origin_size {
      return 1.0;
    }

    let target = self.long_side as f32;
    let size_min = width.min(height) as f32;
    let size_max = width.max(height) as f32;

    let resize = target / size_min;
    // 防止长边超过上限
    if (resize * size_max).round() > target {
      target / size_max
    } else {
      resize
    }
  }
}

/// 减均值后的 BGR 平面排布张量 (1, 3, H, W)
#[derive(Debug, Clone)]
pub struct PreparedFrame {
  data: Box<[f32]>,
  width: u32,
  height: u32,
  resize: f32,
}

impl PreparedFrame {
  pub fn new(image: &RgbImage, policy: &ResizePolicy) -> Self {
    let (orig_w, orig_h) = image.dimensions();
    let resize = policy.ratio(orig_w, orig_h);

    let resized;
    let image = if resize != 1.0 {
      let width = ((orig_w as f32 * resize).round() as u32).max(1);
      let height = ((orig_h as f32 * resize).round() as u32).max(1);
      resized = image::imageops::resize(image, width, height, FilterType::Triangle);
      &resized
    } else {
      image
    };

    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; BGR_CHANNELS * plane];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y * width + x) as usize;
      // RGB -> BGR
      for c in 0..BGR_CHANNELS {
        data[c * plane + idx] = pixel[2 - c] as f32 - BGR_MEAN[c];
      }
    }

    debug!(
      "输入帧 {}x{} 缩放 {:.4} 至 {}x{}",
      orig_w, orig_h, resize, width, height
    );

    Self {
      data: data.into_boxed_slice(),
      width,
      height,
      resize,
    }
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn resize(&self) -> f32 {
    self.resize
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, BGR_CHANNELS, self.height as usize, self.width as usize]
  }

  pub fn decode_scale(&self) -> DecodeScale {
    DecodeScale {
      width: self.width as f32,
      height: self.height as f32,
      resize: self.resize,
    }
  }
}
