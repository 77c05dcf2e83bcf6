// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model/onnx.rs - 基于 ONNX Runtime 的人脸检测器
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

use std::sync::Mutex;

use ort::{
  execution_providers::CUDAExecutionProvider,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::PreparedFrame,
  model::{Device, Model, ModelError, RawDetections, bind_outputs},
};

const ONNX_SCHEME: &str = "onnx";
/// 依次为 loc、conf、landms
const EXPECTED_OUTPUTS: [&str; 3] = ["loc", "conf", "landms"];
const EXPORT_PREFIX: &str = "module.";

pub struct OnnxFaceModelBuilder {
  model_path: String,
  device: Device,
}

impl FromUrl for OnnxFaceModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != ONNX_SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        ONNX_SCHEME
      )));
    }
    if url.path().is_empty() {
      return Err(ModelError::ModelPathError(url.to_string()));
    }

    Ok(OnnxFaceModelBuilder {
      model_path: url.path().to_string(),
      device: Device::Cpu,
    })
  }
}

impl FromUrlWithScheme for OnnxFaceModelBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl OnnxFaceModelBuilder {
  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn build(self) -> Result<OnnxFaceModel, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let mut builder =
      Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if let Device::Cuda(id) = self.device {
      info!("使用 CUDA 设备 {}", id);
      let cuda = CUDAExecutionProvider::default()
        .with_device_id(id as i32)
        .build();
      builder = builder.with_execution_providers([cuda])?;
    } else {
      info!("使用 CPU 推理");
    }
    let session = builder.commit_from_memory(&model_data)?;

    let names: Vec<String> = session
      .outputs
      .iter()
      .map(|output| output.name.clone())
      .collect();
    debug!("模型输出: {:?}", names);
    let outputs = bind_outputs(EXPECTED_OUTPUTS, &names, EXPORT_PREFIX)?;
    info!("模型加载完成");

    Ok(OnnxFaceModel {
      session: Mutex::new(session),
      outputs,
    })
  }
}

pub struct OnnxFaceModel {
  session: Mutex<Session>,
  outputs: [usize; 3],
}

impl Model for OnnxFaceModel {
  type Input = PreparedFrame;
  type Output = RawDetections;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = Tensor::from_array((input.shape().to_vec(), input.as_nchw().to_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| ModelError::InvalidOutput("推理会话锁已失效".to_string()))?;
    let outputs = session.run(ort::inputs![tensor])?;
    let extract = |index: usize| -> Result<Box<[f32]>, ModelError> {
      let (_, data) = outputs[index].try_extract_tensor::<f32>()?;
      Ok(data.to_vec().into_boxed_slice())
    };

    let [loc, conf, landms] = self.outputs;
    Ok(RawDetections {
      loc: extract(loc)?,
      conf: extract(conf)?,
      landms: extract(landms)?,
    })
  }
}
