// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/input/extract.rs - 外部片段提取工具调用
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
  ffi::OsString,
  path::Path,
  process::{Command, ExitStatus, Stdio},
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("无法启动片段提取工具 {program}: {source}")]
  SpawnError {
    program: String,
    source: std::io::Error,
  },
  #[error("等待片段提取工具失败: {0}")]
  WaitError(std::io::Error),
  #[error("片段提取超时 ({0:?})")]
  Timeout(Duration),
}

/// 提取工具的退出情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
  Success,
  /// 非零退出，`None` 表示被信号终止
  Failed(Option<i32>),
}

impl ExtractStatus {
  pub fn is_success(&self) -> bool {
    *self == ExtractStatus::Success
  }

  pub fn code(&self) -> Option<i32> {
    match self {
      ExtractStatus::Success => Some(0),
      ExtractStatus::Failed(code) => *code,
    }
  }
}

impl From<ExitStatus> for ExtractStatus {
  fn from(status: ExitStatus) -> Self {
    if status.success() {
      ExtractStatus::Success
    } else {
      ExtractStatus::Failed(status.code())
    }
  }
}

pub trait ClipExtractor {
  /// 将 `video` 切分为若干 mp4 片段及对应的 `_first.jpg` 代表帧，写入 `workspace`
  fn extract(&self, video: &Path, workspace: &Path) -> Result<ExtractStatus, ExtractError>;
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
  pub program: OsString,
  /// 位于视频路径之前的固定参数
  pub prefix_args: Vec<OsString>,
  /// 依次为：提取片段、保存首帧、保存元数据
  pub flags: [bool; 3],
  pub granularity: u32,
  pub timeout: Duration,
}

impl Default for ExtractorConfig {
  fn default() -> Self {
    Self {
      program: "python".into(),
      prefix_args: vec!["-m".into(), "railway.tools.slide_clip_one_video_file".into()],
      flags: [true; 3],
      granularity: 1,
      timeout: Duration::from_secs(30 * 60),
    }
  }
}

fn flag_arg(flag: bool) -> &'static str {
  if flag { "True" } else { "False" }
}

/// 以独立子进程运行提取工具，参数按列表传递，不经过 shell
#[derive(Debug, Clone, Default)]
pub struct CommandExtractor {
  config: ExtractorConfig,
}

impl CommandExtractor {
  pub fn new(config: ExtractorConfig) -> Self {
    Self { config }
  }

  pub fn command(&self, video: &Path, workspace: &Path) -> Command {
    let mut cmd = Command::new(&self.config.program);
    cmd
      .args(&self.config.prefix_args)
      .arg(video)
      .args(self.config.flags.map(flag_arg))
      .arg(workspace)
      .arg(self.config.granularity.to_string())
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::inherit());
    cmd
  }
}

impl ClipExtractor for CommandExtractor {
  fn extract(&self, video: &Path, workspace: &Path) -> Result<ExtractStatus, ExtractError> {
    let program = self.config.program.to_string_lossy().into_owned();
    info!("[EXTRACT] 开始切分视频: {}", video.display());

    let mut child = self
      .command(video, workspace)
      .spawn()
      .map_err(|source| ExtractError::SpawnError {
        program: program.clone(),
        source,
      })?;

    let started = Instant::now();
    let status = loop {
      match child.try_wait() {
        Ok(Some(status)) => break status,
        Ok(None) => {
          if started.elapsed() >= self.config.timeout {
            error!(
              "[EXTRACT] {} 超过 {:?} 未结束，终止子进程",
              program, self.config.timeout
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExtractError::Timeout(self.config.timeout));
          }
          thread::sleep(POLL_INTERVAL);
        }
        Err(e) => {
          error!("[EXTRACT] 检查进程状态失败: {}", e);
          let _ = child.kill();
          let _ = child.wait();
          return Err(ExtractError::WaitError(e));
        }
      }
    };

    let status = ExtractStatus::from(status);
    match status {
      ExtractStatus::Success => debug!("[EXTRACT] 切分完成，耗时 {:.2?}", started.elapsed()),
      ExtractStatus::Failed(code) => {
        warn!("[EXTRACT] {} 退出码异常: {:?}", program, code)
      }
    }
    Ok(status)
  }
}
