// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/bin/cabin_scan.rs - 单个数据目录的视频扫描
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

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use cabinscan::{
  anomaly::{AnomalyRule, parse_span_coords},
  config::{Network, ScanConfig},
  frame::ResizePolicy,
  input::{CommandExtractor, ExtractorConfig, discover_videos},
  model::{Device, ModelWrapper, SuppressConfig},
  output::OutputDirectory,
  task::{Task, VideoScanTask},
};
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

/// 驾驶室视频异常画面扫描
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///weights/RFB.onnx
  #[arg(long, value_name = "MODEL")]
  pub trained_model: Url,

  /// 网络结构: mobile0.25 / slim / RFB
  #[arg(long, default_value = "RFB", value_name = "NETWORK")]
  pub network: Network,

  /// 推理前的短边目标尺寸
  #[arg(long, default_value_t = 320, value_parser = clap::value_parser!(u32).range(1..))]
  pub long_side: u32,

  /// 使用原图尺寸推理
  #[arg(long)]
  pub origin_size: bool,

  /// 使用 CPU 推理
  #[arg(long)]
  pub cpu: bool,

  /// GPU 编号
  #[arg(long, default_value_t = 0)]
  pub device: u32,

  /// 待扫描视频所在目录
  #[arg(long, value_name = "DIR")]
  pub dataset_folder: PathBuf,

  /// 结果输出目录
  #[arg(long, value_name = "DIR")]
  pub save_folder: PathBuf,

  #[arg(long, default_value_t = 0.7)]
  pub confidence_threshold: f32,

  #[arg(long, default_value_t = 5000)]
  pub top_k: usize,

  #[arg(long, default_value_t = 0.4)]
  pub nms_threshold: f32,

  #[arg(long, default_value_t = 750)]
  pub keep_top_k: usize,

  /// 是否保存标注后的代表帧
  #[arg(long, default_value_t = true, action = ArgAction::Set)]
  pub save_image: bool,

  /// 规则判定使用的置信度阈值
  #[arg(long, default_value_t = 0.6)]
  pub vis_thres: f32,

  /// 参与跨度计算的两个关键点坐标下标，按 [x0, y0, x1, y1, ...] 展开
  #[arg(long, default_value = "0,2", value_parser = parse_span_coords, value_name = "A,B")]
  pub span_coords: (usize, usize),

  /// 视频文件名需包含的片段
  #[arg(long, default_value = "司机室")]
  pub video_pattern: String,

  /// 片段提取工具
  #[arg(long, default_value = "python", value_name = "PROGRAM")]
  pub clip_tool: PathBuf,

  /// 片段提取工具的前置参数，可重复，缺省为 `-m railway.tools.slide_clip_one_video_file`
  #[arg(long = "clip-tool-arg", allow_hyphen_values = true, value_name = "ARG")]
  pub clip_tool_args: Vec<String>,

  /// 切分粒度
  #[arg(long, default_value_t = 1)]
  pub clip_granularity: u32,

  /// 单个视频切分的超时时间（秒）
  #[arg(long, default_value_t = 1800)]
  pub clip_timeout_secs: u64,

  /// 临时工作目录的父目录，缺省为系统临时目录
  #[arg(long, value_name = "DIR")]
  pub scratch_root: Option<PathBuf>,
}

impl Args {
  fn scan_config(&self) -> ScanConfig {
    let defaults = ScanConfig::default();
    ScanConfig {
      network: self.network,
      resize: ResizePolicy {
        long_side: self.long_side,
        origin_size: self.origin_size,
      },
      suppress: SuppressConfig {
        confidence_threshold: self.confidence_threshold,
        top_k: self.top_k,
        nms_threshold: self.nms_threshold,
        keep_top_k: self.keep_top_k,
      },
      rule: AnomalyRule::default()
        .with_vis_threshold(self.vis_thres)
        .with_span_coords(self.span_coords),
      save_image: self.save_image,
      scratch_root: self.scratch_root.clone().unwrap_or(defaults.scratch_root),
      video_pattern: self.video_pattern.clone(),
    }
  }

  fn extractor_config(&self) -> ExtractorConfig {
    let defaults = ExtractorConfig::default();
    ExtractorConfig {
      program: self.clip_tool.clone().into_os_string(),
      prefix_args: if self.clip_tool_args.is_empty() {
        defaults.prefix_args
      } else {
        self.clip_tool_args.iter().map(Into::into).collect()
      },
      granularity: self.clip_granularity,
      timeout: Duration::from_secs(self.clip_timeout_secs),
      ..defaults
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型地址: {}", args.trained_model);
  info!("网络结构: {}", args.network);
  info!("数据目录: {}", args.dataset_folder.display());
  info!("输出目录: {}", args.save_folder.display());

  let device = if args.cpu {
    Device::Cpu
  } else {
    Device::Cuda(args.device)
  };
  let model = ModelWrapper::open(&args.trained_model, device)?;
  info!("模型加载完成");

  let config = args.scan_config();
  let videos = discover_videos(&args.dataset_folder, &config.video_pattern)?;
  info!("共发现 {} 个视频", videos.len());

  let output = OutputDirectory::create(&args.save_folder, config.save_image)?;
  let extractor = CommandExtractor::new(args.extractor_config());

  let report = VideoScanTask::new(&config, extractor).run_task(videos, &model, &output)?;
  output.write_summary(&report.to_json(&config))?;

  Ok(())
}
