// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/bin/cabin_batch.rs - 按数据子目录并行调用扫描程序
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

use anyhow::{Context, Result};
use cabinscan::{
  batch::{BatchConfig, Dispatcher, ProcessJobRunner, collect_jobs},
  config::Network,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const SCANNER_NAME: &str = "cabin-scan";

/// 驾驶室视频批量扫描
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 源数据根目录，每个子目录为一个任务
  #[arg(long, value_name = "DIR")]
  pub source_data_path: PathBuf,

  /// 输出根目录
  #[arg(long, value_name = "DIR")]
  pub output_path: PathBuf,

  /// 同时运行的最大任务数
  #[arg(long, default_value_t = 4)]
  pub pool_size: usize,

  /// 模型地址，原样传给扫描程序
  #[arg(long, value_name = "MODEL")]
  pub trained_model: Url,

  #[arg(long, default_value = "RFB", value_name = "NETWORK")]
  pub network: Network,

  /// 所有任务共用的 GPU 编号
  #[arg(long, default_value_t = 2)]
  pub gpu_id: u32,

  /// 扫描程序路径，缺省为当前程序同目录下的 cabin-scan
  #[arg(long, value_name = "PROGRAM")]
  pub scanner: Option<PathBuf>,
}

fn default_scanner() -> Result<PathBuf> {
  let exe = std::env::current_exe().context("无法获取当前程序路径")?;
  let name = format!("{}{}", SCANNER_NAME, std::env::consts::EXE_SUFFIX);
  Ok(exe.with_file_name(name))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let config = BatchConfig {
    source_root: args.source_data_path,
    output_root: args.output_path,
    gpu_id: args.gpu_id,
    pool_size: args.pool_size,
  };

  let scanner = match args.scanner {
    Some(path) => path,
    None => default_scanner()?,
  };
  info!("扫描程序: {}", scanner.display());

  let jobs = collect_jobs(&config)?;
  let runner = ProcessJobRunner {
    scanner,
    extra_args: vec![
      "--trained-model".into(),
      args.trained_model.as_str().into(),
      "--network".into(),
      args.network.to_string().into(),
    ],
  };

  let dispatcher = Dispatcher::from_config(&config)?;
  let summary = dispatcher.run(&jobs, &runner);
  if summary.failed > 0 {
    warn!("{} 个任务失败", summary.failed);
  }
  info!(
    "全部任务完成: 提交 {}, 成功 {}, 失败 {}",
    summary.submitted, summary.succeeded, summary.failed
  );

  Ok(())
}
