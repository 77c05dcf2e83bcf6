// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model.rs - 模型接口与检测结果
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

use thiserror::Error;
use url::Url;

use crate::frame::PreparedFrame;

pub const NUM_LANDMARKS: usize = 5;
pub const LOC_WIDTH: usize = 4;
pub const CONF_WIDTH: usize = 2;
pub const LANDM_WIDTH: usize = NUM_LANDMARKS * 2;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理设备，GPU 编号由调用方显式传入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
  Cpu,
  Cuda(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub landmarks: [[f32; 2]; NUM_LANDMARKS],
}

impl Detection {
  pub fn width(&self) -> f32 {
    (self.bbox[0] - self.bbox[2]).abs()
  }

  pub fn height(&self) -> f32 {
    (self.bbox[1] - self.bbox[3]).abs()
  }

  /// 按 [x0, y0, x1, y1, ...] 顺序展开的关键点坐标
  pub fn landmark_coord(&self, index: usize) -> Option<f32> {
    self
      .landmarks
      .get(index / 2)
      .map(|point| point[index % 2])
  }
}

/// 检测器原始输出：每个先验框一行，按行展开存储
#[derive(Debug, Clone, Default)]
pub struct RawDetections {
  pub loc: Box<[f32]>,
  pub conf: Box<[f32]>,
  pub landms: Box<[f32]>,
}

impl RawDetections {
  pub fn len(&self) -> usize {
    self.loc.len() / LOC_WIDTH
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 三路输出的行数是否一致且等于先验框数量
  pub fn is_aligned_with(&self, priors: usize) -> bool {
    self.loc.len() == priors * LOC_WIDTH
      && self.conf.len() == priors * CONF_WIDTH
      && self.landms.len() == priors * LANDM_WIDTH
  }

  pub fn loc(&self, index: usize) -> &[f32] {
    &self.loc[index * LOC_WIDTH..(index + 1) * LOC_WIDTH]
  }

  /// 前景类别置信度
  pub fn score(&self, index: usize) -> f32 {
    self.conf[index * CONF_WIDTH + 1]
  }

  pub fn landms(&self, index: usize) -> &[f32] {
    &self.landms[index * LANDM_WIDTH..(index + 1) * LANDM_WIDTH]
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("不支持的模型方案: {0}")]
  UnsupportedScheme(String),
  #[error("模型输出不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  OutputMismatch {
    expected: Vec<String>,
    actual: Vec<String>,
  },
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[cfg(feature = "onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OnnxError(#[from] ort::Error),
}

mod binding;
mod decode;
mod nms;
mod prior;

pub use self::binding::{KeyReport, bind_outputs, strip_prefix};
pub use self::decode::{DecodeScale, decode};
pub use self::nms::{SuppressConfig, iou, suppress};
pub use self::prior::{Prior, generate_priors};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxFaceModel, OnnxFaceModelBuilder};

/// 按模型地址的方案选择推理后端
pub enum ModelWrapper {
  #[cfg(feature = "onnx")]
  Onnx(OnnxFaceModel),
}

impl ModelWrapper {
  pub fn open(url: &Url, device: Device) -> Result<Self, ModelError> {
    #[cfg(feature = "onnx")]
    {
      use crate::{FromUrl, FromUrlWithScheme};

      if url.scheme() == OnnxFaceModelBuilder::SCHEME {
        let model = OnnxFaceModelBuilder::from_url(url)?.device(device).build()?;
        return Ok(ModelWrapper::Onnx(model));
      }
    }
    let _ = device;
    Err(ModelError::UnsupportedScheme(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Input = PreparedFrame;
  type Output = RawDetections;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let _ = input;
    match *self {
      #[cfg(feature = "onnx")]
      ModelWrapper::Onnx(ref model) => model.infer(input),
    }
  }
}
