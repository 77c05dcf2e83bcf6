// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/batch.rs - 多数据目录批量调度
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
  panic::{AssertUnwindSafe, catch_unwind},
  path::PathBuf,
  process::Command,
  sync::atomic::{AtomicUsize, Ordering},
};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum BatchError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("线程池大小必须大于 0")]
  EmptyPool,
  #[error("创建线程池失败: {0}")]
  PoolError(#[from] rayon::ThreadPoolBuildError),
  #[error("无法启动扫描程序 {program}: {source}")]
  SpawnError {
    program: String,
    source: std::io::Error,
  },
  #[error("扫描程序退出码异常: {0:?}")]
  ExitError(Option<i32>),
}

/// 一个数据子目录对应的扫描任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
  pub input: PathBuf,
  pub output: PathBuf,
  /// 该任务使用的 GPU 编号
  pub gpu_id: u32,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
  pub source_root: PathBuf,
  pub output_root: PathBuf,
  pub gpu_id: u32,
  pub pool_size: usize,
}

/// 源目录下的每个直接子目录生成一个任务，按名称排序
pub fn collect_jobs(config: &BatchConfig) -> Result<Vec<Job>, BatchError> {
  let mut inputs = Vec::new();
  for entry in std::fs::read_dir(&config.source_root)? {
    let path = entry?.path();
    if path.is_dir() {
      inputs.push(path);
    }
  }
  inputs.sort();

  Ok(
    inputs
      .into_iter()
      .filter_map(|input| {
        let name = input.file_name()?.to_os_string();
        Some(Job {
          output: config.output_root.join(name),
          input,
          gpu_id: config.gpu_id,
        })
      })
      .collect(),
  )
}

pub trait JobRunner: Sync {
  fn run(&self, job: &Job) -> Result<(), BatchError>;
}

/// 以子进程调用扫描程序处理一个数据目录
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
  pub scanner: PathBuf,
  /// 追加在固定参数之后，例如模型地址与网络结构
  pub extra_args: Vec<OsString>,
}

impl ProcessJobRunner {
  pub fn command(&self, job: &Job) -> Command {
    let mut cmd = Command::new(&self.scanner);
    cmd
      .arg("--dataset-folder")
      .arg(&job.input)
      .arg("--save-folder")
      .arg(&job.output)
      .arg("--device")
      .arg(job.gpu_id.to_string())
      .args(&self.extra_args);
    cmd
  }
}

impl JobRunner for ProcessJobRunner {
  fn run(&self, job: &Job) -> Result<(), BatchError> {
    let status = self
      .command(job)
      .status()
      .map_err(|source| BatchError::SpawnError {
        program: self.scanner.display().to_string(),
        source,
      })?;
    if status.success() {
      Ok(())
    } else {
      Err(BatchError::ExitError(status.code()))
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub submitted: usize,
  pub succeeded: usize,
  pub failed: usize,
}

/// 固定大小的工作池，所有任务执行完毕后返回，不取消也不重试
pub struct Dispatcher {
  pool: rayon::ThreadPool,
  pool_size: usize,
}

impl Dispatcher {
  pub fn from_config(config: &BatchConfig) -> Result<Self, BatchError> {
    Self::new(config.pool_size)
  }

  pub fn new(pool_size: usize) -> Result<Self, BatchError> {
    if pool_size == 0 {
      return Err(BatchError::EmptyPool);
    }
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(pool_size)
      .thread_name(|i| format!("cabin-batch-{}", i))
      .build()?;
    Ok(Self { pool, pool_size })
  }

  pub fn run<R: JobRunner>(&self, jobs: &[Job], runner: &R) -> BatchSummary {
    info!(
      "[BATCH] 提交 {} 个任务，并发上限 {}",
      jobs.len(),
      self.pool_size
    );
    let succeeded = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    self.pool.install(|| {
      jobs.par_iter().with_max_len(1).for_each(|job| {
        info!("[BATCH] 开始处理: {}", job.input.display());
        match catch_unwind(AssertUnwindSafe(|| runner.run(job))) {
          Ok(Ok(())) => {
            succeeded.fetch_add(1, Ordering::SeqCst);
            info!("[BATCH] 完成: {}", job.input.display());
          }
          Ok(Err(e)) => {
            failed.fetch_add(1, Ordering::SeqCst);
            error!("[BATCH] 任务 {} 失败: {}", job.input.display(), e);
          }
          Err(_) => {
            failed.fetch_add(1, Ordering::SeqCst);
            error!("[BATCH] 任务 {} 发生 panic", job.input.display());
          }
        }
      });
    });

    BatchSummary {
      submitted: jobs.len(),
      succeeded: succeeded.into_inner(),
      failed: failed.into_inner(),
    }
  }
}
