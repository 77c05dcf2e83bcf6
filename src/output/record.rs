// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/output/record.rs - 检测结果文本记录
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

use std::path::Path;

use crate::model::Detection;

/// 每行一个检测：置信度、框坐标、五个关键点坐标
pub fn format_record(detections: &[Detection]) -> String {
  detections
    .iter()
    .map(|det| {
      let mut fields = vec![format!("{:.4}", det.score)];
      fields.extend(det.bbox.iter().map(|v| format!("{:.1}", v)));
      fields.extend(
        det
          .landmarks
          .iter()
          .flat_map(|p| p.iter())
          .map(|v| format!("{:.1}", v)),
      );
      fields.join(", ")
    })
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn write_record(path: &Path, detections: &[Detection]) -> Result<(), std::io::Error> {
  std::fs::write(path.with_extension("txt"), format_record(detections))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_line_layout() {
    let det = Detection {
      score: 0.5,
      bbox: [1.0, 2.0, 3.0, 4.0],
      landmarks: [[5.0, 6.0], [7.0, 8.0], [9.0, 10.0], [11.0, 12.0], [13.0, 14.0]],
    };
    let text = format_record(&[det.clone(), det]);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
      lines[0],
      "0.5000, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0"
    );
  }
}
