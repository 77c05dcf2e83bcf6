// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/input/workspace.rs - 单个视频的临时工作目录
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
  io,
  path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, warn};

/// 工作目录名长度，由字母与数字随机组成
pub const WORKSPACE_NAME_LEN: usize = 20;

/// 独占的临时目录，离开作用域时递归删除
///
/// 删除失败只记录日志，不向上传播。
#[derive(Debug)]
pub struct Workspace {
  dir: Option<TempDir>,
  path: PathBuf,
}

impl Workspace {
  pub fn create_in(root: &Path) -> io::Result<Self> {
    let dir = tempfile::Builder::new()
      .prefix("")
      .rand_bytes(WORKSPACE_NAME_LEN)
      .tempdir_in(root)?;
    let path = dir.path().to_path_buf();
    debug!("创建工作目录: {}", path.display());
    Ok(Self {
      dir: Some(dir),
      path,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for Workspace {
  fn drop(&mut self) {
    if let Some(dir) = self.dir.take() {
      match dir.close() {
        Ok(()) => debug!("已清理工作目录: {}", self.path.display()),
        Err(e) => warn!("清理工作目录 {} 失败: {}", self.path.display(), e),
      }
    }
  }
}
