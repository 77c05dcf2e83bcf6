// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/anomaly.rs - 关键点几何异常规则
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

//! 针对固定机位的手工规则：人脸框足够矮，且两个关键点之间的跨度
//! 相对框宽足够大时判定为异常画面。阈值与比较方向不可随意改动。

use thiserror::Error;

use crate::model::{Detection, LANDM_WIDTH};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AnomalyError {
  #[error("关键点坐标格式错误: {0}，应为 `a,b`")]
  InvalidSpanCoords(String),
  #[error("关键点坐标下标越界: {0}，应小于 10")]
  CoordOutOfRange(usize),
}

/// 解析 `a,b` 形式的关键点坐标下标对
///
/// 下标按 [x0, y0, x1, y1, ...] 展开，`5,9` 即第 2 与第 4 个关键点的 y 坐标。
pub fn parse_span_coords(s: &str) -> Result<(usize, usize), AnomalyError> {
  let invalid = || AnomalyError::InvalidSpanCoords(s.to_string());
  let (a, b) = s.split_once(',').ok_or_else(invalid)?;
  let a: usize = a.trim().parse().map_err(|_| invalid())?;
  let b: usize = b.trim().parse().map_err(|_| invalid())?;
  for index in [a, b] {
    if index >= LANDM_WIDTH {
      return Err(AnomalyError::CoordOutOfRange(index));
    }
  }
  Ok((a, b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyRule {
  /// 可视化置信度阈值，低于该值直接忽略
  pub vis_threshold: f32,
  /// 关键点跨度下限（像素）
  pub min_span: f32,
  /// 跨度与框宽之比的下限
  pub min_span_ratio: f32,
  /// 框高上限（像素）
  pub max_box_height: f32,
  /// 参与跨度计算的两个关键点坐标，按 [x0, y0, x1, y1, ...] 展开的下标
  pub span_coords: (usize, usize),
}

impl Default for AnomalyRule {
  fn default() -> Self {
    Self {
      vis_threshold: 0.6,
      min_span: 8.0,
      min_span_ratio: 0.35,
      max_box_height: 60.0,
      span_coords: (0, 2),
    }
  }
}

impl AnomalyRule {
  pub fn with_vis_threshold(mut self, vis_threshold: f32) -> Self {
    self.vis_threshold = vis_threshold;
    self
  }

  pub fn with_span_coords(mut self, span_coords: (usize, usize)) -> Self {
    self.span_coords = span_coords;
    self
  }

  pub fn span(&self, det: &Detection) -> Option<f32> {
    let a = det.landmark_coord(self.span_coords.0)?;
    let b = det.landmark_coord(self.span_coords.1)?;
    Some((a - b).abs())
  }

  pub fn matches(&self, det: &Detection) -> bool {
    if det.score < self.vis_threshold {
      return false;
    }

    let horizontal = det.width();
    if horizontal == 0.0 {
      return false;
    }

    let Some(span) = self.span(det) else {
      return false;
    };
    let ratio = span / horizontal;

    span >= self.min_span && ratio >= self.min_span_ratio && det.height() <= self.max_box_height
  }
}
