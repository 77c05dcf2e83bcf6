// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model/decode.rs - 先验框解码
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

use crate::model::{Detection, NUM_LANDMARKS, Prior, RawDetections};

/// 归一化坐标到原图像素的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeScale {
  /// 检测器输入宽度（缩放后）
  pub width: f32,
  /// 检测器输入高度（缩放后）
  pub height: f32,
  /// 推理前施加的缩放比例
  pub resize: f32,
}

impl DecodeScale {
  fn x(&self, v: f32) -> f32 {
    v * self.width / self.resize
  }

  fn y(&self, v: f32) -> f32 {
    v * self.height / self.resize
  }
}

/// 将每个先验框的回归量解码为原图像素坐标下的框与关键点
///
/// `priors` 与 `raw` 必须逐行对齐，调用方负责保证。
pub fn decode(
  priors: &[Prior],
  raw: &RawDetections,
  variance: [f32; 2],
  scale: &DecodeScale,
) -> Vec<Detection> {
  let [v1, v2] = variance;

  priors
    .iter()
    .enumerate()
    .map(|(i, p)| {
      let loc = raw.loc(i);
      let center_x = p.cx + loc[0] * v1 * p.w;
      let center_y = p.cy + loc[1] * v1 * p.h;
      let width = p.w * (loc[2] * v2).exp();
      let height = p.h * (loc[3] * v2).exp();

      let bbox = [
        scale.x(center_x - width / 2.0),
        scale.y(center_y - height / 2.0),
        scale.x(center_x + width / 2.0),
        scale.y(center_y + height / 2.0),
      ];

      let landms = raw.landms(i);
      let mut landmarks = [[0.0f32; 2]; NUM_LANDMARKS];
      for (k, point) in landmarks.iter_mut().enumerate() {
        point[0] = scale.x(p.cx + landms[2 * k] * v1 * p.w);
        point[1] = scale.y(p.cy + landms[2 * k + 1] * v1 * p.h);
      }

      Detection {
        score: raw.score(i),
        bbox,
        landmarks,
      }
    })
    .collect()
}
