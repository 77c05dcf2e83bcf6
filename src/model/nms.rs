// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model/nms.rs - 置信度过滤与非极大值抑制
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

use tracing::debug;

use crate::model::Detection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressConfig {
  pub confidence_threshold: f32,
  /// NMS 前保留的候选数量
  pub top_k: usize,
  pub nms_threshold: f32,
  /// NMS 后保留的结果数量
  pub keep_top_k: usize,
}

impl Default for SuppressConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.7,
      top_k: 5000,
      nms_threshold: 0.4,
      keep_top_k: 750,
    }
  }
}

fn area(bbox: &[f32; 4]) -> f32 {
  (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

/// 计算两个边界框的 IoU，面积为零的框与任何框都不重叠
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area_a = area(a);
  let area_b = area(b);
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 置信度过滤、top-k 截断、贪心 NMS、keep-top-k 截断
///
/// 输出按置信度降序排列，任意两个保留框的 IoU 均小于 `nms_threshold`。
/// 关键点随所属检测框一起移动。
pub fn suppress(detections: Vec<Detection>, cfg: &SuppressConfig) -> Vec<Detection> {
  let total = detections.len();

  let mut candidates: Vec<Detection> = detections
    .into_iter()
    .filter(|det| det.score > cfg.confidence_threshold)
    .collect();
  let passed = candidates.len();

  // 稳定排序，同分时保持解码顺序
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  candidates.truncate(cfg.top_k);

  let mut suppressed = vec![false; candidates.len()];
  let mut keep = Vec::new();

  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    for j in (i + 1)..candidates.len() {
      if !suppressed[j] && iou(&candidates[i].bbox, &candidates[j].bbox) >= cfg.nms_threshold {
        suppressed[j] = true;
      }
    }
    keep.push(i);
  }

  let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
  let result: Vec<Detection> = keep
    .into_iter()
    .take(cfg.keep_top_k)
    .filter_map(|i| slots[i].take())
    .collect();

  debug!(
    "候选 {} 个, 过阈值 {} 个, NMS 后保留 {} 个",
    total,
    passed,
    result.len()
  );
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(score: f32, bbox: [f32; 4]) -> Detection {
    Detection {
      score,
      bbox,
      landmarks: [[bbox[0], bbox[1]]; 5],
    }
  }

  fn cfg(nms_threshold: f32, top_k: usize, keep_top_k: usize) -> SuppressConfig {
    SuppressConfig {
      confidence_threshold: 0.5,
      top_k,
      nms_threshold,
      keep_top_k,
    }
  }

  /// 固定种子的线性同余发生器，生成可复现的随机框
  fn scattered(count: usize, seed: u64) -> Vec<Detection> {
    let mut state = seed;
    let mut next = move || {
      state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
      ((state >> 33) as f32) / (u32::MAX >> 1) as f32
    };
    (0..count)
      .map(|_| {
        let x = next() * 200.0;
        let y = next() * 200.0;
        let w = 5.0 + next() * 60.0;
        let h = 5.0 + next() * 60.0;
        det(next(), [x, y, x + w, y + h])
      })
      .collect()
  }

  #[test]
  fn iou_of_partial_overlap() {
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [5.0, 5.0, 15.0, 15.0];
    // 25 / (100 + 100 - 25)
    assert!((iou(&a, &b) - 25.0 / 175.0).abs() < 1e-6);
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
  }

  #[test]
  fn zero_area_boxes_never_overlap() {
    let point = [5.0, 5.0, 5.0, 5.0];
    let line = [0.0, 5.0, 10.0, 5.0];
    assert_eq!(iou(&point, &point), 0.0);
    assert_eq!(iou(&line, &[0.0, 0.0, 10.0, 10.0]), 0.0);

    let out = suppress(vec![det(0.9, point), det(0.8, point)], &cfg(0.1, 10, 10));
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn empty_input_is_empty_output() {
    assert!(suppress(Vec::new(), &SuppressConfig::default()).is_empty());
  }

  #[test]
  fn threshold_is_strict() {
    let out = suppress(
      vec![det(0.5, [0.0, 0.0, 1.0, 1.0]), det(0.51, [5.0, 5.0, 6.0, 6.0])],
      &cfg(0.4, 10, 10),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].score, 0.51);
  }

  #[test]
  fn overlapping_boxes_keep_highest_score() {
    let input = vec![
      det(0.7, [1.0, 1.0, 11.0, 11.0]),
      det(0.95, [0.0, 0.0, 10.0, 10.0]),
      det(0.8, [50.0, 50.0, 60.0, 60.0]),
      det(0.6, [0.0, 0.0, 10.0, 9.0]),
    ];
    let out = suppress(input, &cfg(0.4, 10, 10));
    let scores: Vec<f32> = out.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.95, 0.8]);
    assert_eq!(out[0].landmarks[0], [0.0, 0.0]);
  }

  #[test]
  fn iou_equal_to_threshold_is_suppressed() {
    // IoU = 50 / 100 = 0.5
    let input = vec![det(0.9, [0.0, 0.0, 10.0, 10.0]), det(0.8, [0.0, 0.0, 10.0, 5.0])];
    assert_eq!(suppress(input.clone(), &cfg(0.5, 10, 10)).len(), 1);
    assert_eq!(suppress(input, &cfg(0.51, 10, 10)).len(), 2);
  }

  #[test]
  fn truncation_limits_apply_in_order() {
    let input: Vec<Detection> = (0..10)
      .map(|i| det(0.6 + i as f32 * 0.01, [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0]))
      .collect();

    let out = suppress(input.clone(), &cfg(0.4, 4, 100));
    assert_eq!(out.len(), 4);
    assert!((out[0].score - 0.69).abs() < 1e-6);

    let out = suppress(input.clone(), &cfg(0.4, 100, 3));
    assert_eq!(out.len(), 3);

    let out = suppress(input, &cfg(0.4, 1000, 1000));
    assert_eq!(out.len(), 10);
  }

  #[test]
  fn output_invariants_hold_on_scattered_boxes() {
    for seed in 1..20u64 {
      let input = scattered(200, seed);
      let c = cfg(0.3, 120, 60);
      let out = suppress(input.clone(), &c);

      assert!(out.len() <= c.top_k.min(c.keep_top_k).min(input.len()));
      assert!(out.iter().all(|d| d.score > c.confidence_threshold));
      assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
      for (i, a) in out.iter().enumerate() {
        assert!(input.contains(a));
        for b in &out[i + 1..] {
          assert!(iou(&a.bbox, &b.bbox) < c.nms_threshold);
        }
      }
    }
  }

  #[test]
  fn suppression_is_idempotent() {
    for seed in 1..10u64 {
      let c = cfg(0.3, 5000, 750);
      let once = suppress(scattered(300, seed), &c);
      let twice = suppress(once.clone(), &c);
      assert_eq!(once, twice);
    }
  }
}
