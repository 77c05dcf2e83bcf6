// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/config.rs - 检测网络与扫描配置
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

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::{anomaly::AnomalyRule, frame::ResizePolicy, model::SuppressConfig};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("不支持的网络结构: {0}")]
  UnsupportedNetwork(String),
}

/// 先验框布局，决定检测器每个输出槽位对应的参考框
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
  pub name: &'static str,
  pub min_sizes: &'static [&'static [f32]],
  pub steps: &'static [u32],
  pub variance: [f32; 2],
  pub clip: bool,
}

const MNET_MIN_SIZES: &[&[f32]] = &[&[16.0, 32.0], &[64.0, 128.0], &[256.0, 512.0]];
const RFB_MIN_SIZES: &[&[f32]] = &[
  &[10.0, 16.0, 24.0],
  &[32.0, 48.0],
  &[64.0, 96.0],
  &[128.0, 192.0, 256.0],
];
const DEFAULT_VARIANCE: [f32; 2] = [0.1, 0.2];

pub const CFG_MNET: NetworkConfig = NetworkConfig {
  name: "mobile0.25",
  min_sizes: MNET_MIN_SIZES,
  steps: &[8, 16, 32],
  variance: DEFAULT_VARIANCE,
  clip: false,
};

pub const CFG_SLIM: NetworkConfig = NetworkConfig {
  name: "slim",
  min_sizes: RFB_MIN_SIZES,
  steps: &[8, 16, 32, 64],
  variance: DEFAULT_VARIANCE,
  clip: false,
};

pub const CFG_RFB: NetworkConfig = NetworkConfig {
  name: "RFB",
  min_sizes: RFB_MIN_SIZES,
  steps: &[8, 16, 32, 64],
  variance: DEFAULT_VARIANCE,
  clip: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
  Mobile025,
  Slim,
  #[default]
  Rfb,
}

impl Network {
  pub fn config(&self) -> &'static NetworkConfig {
    match self {
      Network::Mobile025 => &CFG_MNET,
      Network::Slim => &CFG_SLIM,
      Network::Rfb => &CFG_RFB,
    }
  }
}

impl FromStr for Network {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "mobile0.25" => Ok(Network::Mobile025),
      "slim" => Ok(Network::Slim),
      "RFB" => Ok(Network::Rfb),
      other => Err(ConfigError::UnsupportedNetwork(other.to_string())),
    }
  }
}

impl fmt::Display for Network {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.config().name)
  }
}

/// 单个数据目录扫描所需的全部参数，构造一次后按引用传入各组件
#[derive(Debug, Clone)]
pub struct ScanConfig {
  pub network: Network,
  pub resize: ResizePolicy,
  pub suppress: SuppressConfig,
  pub rule: AnomalyRule,
  pub save_image: bool,
  /// 临时工作目录的父目录
  pub scratch_root: PathBuf,
  /// 视频文件名需包含的片段，空串表示不过滤
  pub video_pattern: String,
}

impl Default for ScanConfig {
  fn default() -> Self {
    Self {
      network: Network::default(),
      resize: ResizePolicy::default(),
      suppress: SuppressConfig::default(),
      rule: AnomalyRule::default(),
      save_image: true,
      scratch_root: std::env::temp_dir(),
      video_pattern: "司机室".to_string(),
    }
  }
}
