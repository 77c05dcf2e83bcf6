// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/input.rs - 视频发现、片段提取与片段集合
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
  ffi::OsStr,
  io,
  path::{Path, PathBuf},
};

use tracing::debug;

mod extract;
mod workspace;

pub use self::extract::{
  ClipExtractor, CommandExtractor, ExtractError, ExtractStatus, ExtractorConfig,
};
pub use self::workspace::{WORKSPACE_NAME_LEN, Workspace};

const CLIP_EXTENSION: &str = "mp4";
const FRAME_SUFFIX: &str = "_first.jpg";

fn has_extension(path: &Path, ext: &str) -> bool {
  path.extension().and_then(OsStr::to_str) == Some(ext)
}

/// 列出目录下文件名包含 `pattern` 的 mp4 视频，按路径排序
pub fn discover_videos(folder: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
  let mut videos = Vec::new();
  for entry in std::fs::read_dir(folder)? {
    let path = entry?.path();
    if !path.is_file() || !has_extension(&path, CLIP_EXTENSION) {
      continue;
    }
    let matched = path
      .file_name()
      .and_then(OsStr::to_str)
      .map(|name| name.contains(pattern))
      .unwrap_or(false);
    if matched {
      videos.push(path);
    }
  }
  videos.sort();
  debug!("目录 {} 中发现 {} 个视频", folder.display(), videos.len());
  Ok(videos)
}

/// 一个视频切出的片段，按路径排序即时间顺序
#[derive(Debug, Clone, Default)]
pub struct ClipSet {
  clips: Vec<PathBuf>,
}

impl ClipSet {
  pub fn scan(dir: &Path) -> io::Result<Self> {
    let mut clips = Vec::new();
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      if path.is_file() && has_extension(&path, CLIP_EXTENSION) {
        clips.push(path);
      }
    }
    Ok(Self::from(clips))
  }

  pub fn len(&self) -> usize {
    self.clips.len()
  }

  pub fn is_empty(&self) -> bool {
    self.clips.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Path> {
    self.clips.get(index).map(PathBuf::as_path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Path> {
    self.clips.iter().map(PathBuf::as_path)
  }

  /// 片段的代表帧：同名主干加 `_first.jpg`
  pub fn frame_path(clip: &Path) -> PathBuf {
    let stem = clip
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    clip.with_file_name(format!("{}{}", stem, FRAME_SUFFIX))
  }

  /// 第 `index` 个片段及其前后相邻片段中实际存在的下标
  pub fn neighbors(&self, index: usize) -> Vec<usize> {
    neighbor_indices(index, self.len())
  }
}

impl From<Vec<PathBuf>> for ClipSet {
  fn from(mut clips: Vec<PathBuf>) -> Self {
    clips.sort();
    Self { clips }
  }
}

pub fn neighbor_indices(index: usize, len: usize) -> Vec<usize> {
  [index.checked_sub(1), Some(index), index.checked_add(1)]
    .into_iter()
    .flatten()
    .filter(|&i| i < len)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clip_set_is_sorted() {
    let set = ClipSet::from(vec![
      PathBuf::from("/w/v_0002.mp4"),
      PathBuf::from("/w/v_0000.mp4"),
      PathBuf::from("/w/v_0001.mp4"),
    ]);
    let names: Vec<_> = set.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(names, ["/w/v_0000.mp4", "/w/v_0001.mp4", "/w/v_0002.mp4"]);
  }

  #[test]
  fn frame_path_uses_first_suffix() {
    assert_eq!(
      ClipSet::frame_path(Path::new("/tmp/abc/clip_0003.mp4")),
      PathBuf::from("/tmp/abc/clip_0003_first.jpg")
    );
  }

  #[test]
  fn neighbors_are_clamped() {
    assert_eq!(neighbor_indices(0, 3), vec![0, 1]);
    assert_eq!(neighbor_indices(1, 3), vec![0, 1, 2]);
    assert_eq!(neighbor_indices(2, 3), vec![1, 2]);
    assert_eq!(neighbor_indices(0, 1), vec![0]);
    assert!(neighbor_indices(0, 0).is_empty());
  }

  #[test]
  fn discover_filters_by_pattern_and_extension() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
      "b_司机室_1.mp4",
      "a_司机室_0.mp4",
      "a_客室_0.mp4",
      "c_司机室.avi",
    ] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(dir.path().join("d_司机室.mp4")).unwrap();

    let videos = discover_videos(dir.path(), "司机室").unwrap();
    let names: Vec<_> = videos
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["a_司机室_0.mp4", "b_司机室_1.mp4"]);

    assert_eq!(discover_videos(dir.path(), "").unwrap().len(), 3);
  }

  #[test]
  fn scan_collects_only_clips() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["x_001.mp4", "x_000.mp4", "x_000_first.jpg", "meta.json"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    let set = ClipSet::scan(dir.path()).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.get(0).unwrap().ends_with("x_000.mp4"));
    assert_eq!(set.neighbors(1), vec![0, 1]);
  }
}
