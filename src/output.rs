// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/output.rs - 命中结果输出
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{input::ClipSet, model::Detection};

pub mod draw;
mod record;

pub use self::draw::Draw;
pub use self::record::{format_record, write_record};

const SUMMARY_FILE: &str = "summary.json";

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("无效文件名: {0}")]
  InvalidFileName(String),
}

/// 一帧中命中规则的检测结果
#[derive(Debug, Clone)]
pub struct FrameMatch<'a> {
  pub video_stem: &'a str,
  /// 代表帧在工作目录中的路径，输出沿用其文件名
  pub frame_path: &'a Path,
  pub detections: &'a [Detection],
}

/// `save_folder/<video_stem>/` 下的标注帧、检测记录与片段副本
pub struct OutputDirectory {
  root: PathBuf,
  save_image: bool,
  draw: Draw,
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, OutputError> {
  path
    .file_name()
    .ok_or_else(|| OutputError::InvalidFileName(path.display().to_string()))
}

impl OutputDirectory {
  pub fn create(root: &Path, save_image: bool) -> Result<Self, OutputError> {
    std::fs::create_dir_all(root)?;
    Ok(Self {
      root: root.to_path_buf(),
      save_image,
      draw: Draw::default(),
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn video_dir(&self, video_stem: &str) -> PathBuf {
    self.root.join(video_stem)
  }

  fn ensure_video_dir(&self, video_stem: &str) -> Result<PathBuf, OutputError> {
    let dir = self.video_dir(video_stem);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
  }

  /// 输出目录中标注帧的位置
  pub fn frame_output_path(&self, video_stem: &str, frame_path: &Path) -> Result<PathBuf, OutputError> {
    Ok(self.video_dir(video_stem).join(file_name(frame_path)?))
  }

  /// 检测记录的位置，与标注帧同名
  pub fn record_output_path(&self, video_stem: &str, frame_path: &Path) -> Result<PathBuf, OutputError> {
    Ok(self.frame_output_path(video_stem, frame_path)?.with_extension("txt"))
  }

  pub fn saves_images(&self) -> bool {
    self.save_image
  }

  /// 复制第 `index` 个片段及其相邻片段，越界下标直接跳过
  pub fn copy_clips(
    &self,
    video_stem: &str,
    clips: &ClipSet,
    index: usize,
  ) -> Result<Vec<PathBuf>, OutputError> {
    let dir = self.ensure_video_dir(video_stem)?;
    let mut copied = Vec::new();
    for i in clips.neighbors(index) {
      let Some(clip) = clips.get(i) else { continue };
      let target = dir.join(file_name(clip)?);
      std::fs::copy(clip, &target)?;
      debug!("复制片段 {} -> {}", clip.display(), target.display());
      copied.push(target);
    }
    Ok(copied)
  }

  pub fn write_summary(&self, summary: &serde_json::Value) -> Result<PathBuf, OutputError> {
    let path = self.root.join(SUMMARY_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    info!("扫描汇总已写入: {}", path.display());
    Ok(path)
  }
}

impl Render<RgbImage, FrameMatch<'_>> for OutputDirectory {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &FrameMatch<'_>) -> Result<(), Self::Error> {
    self.ensure_video_dir(result.video_stem)?;
    let path = self.frame_output_path(result.video_stem, result.frame_path)?;

    write_record(&path, result.detections)?;
    if self.save_image {
      let mut image = frame.clone();
      self.draw.draw_detections(&mut image, result.detections);
      image.save(&path)?;
      debug!("标注帧已保存: {}", path.display());
    }
    Ok(())
  }
}
