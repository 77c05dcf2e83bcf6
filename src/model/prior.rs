// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model/prior.rs - 先验框生成
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

use crate::config::NetworkConfig;

/// 归一化到检测器输入尺寸的参考框 (cx, cy, w, h)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

/// 为给定输入尺寸生成先验框
///
/// 每个检测层的特征图大小为 `ceil(height / step) x ceil(width / step)`，
/// 按行优先遍历网格，每个网格依次放置该层全部 `min_size` 的方框。
/// 输出顺序与检测器输出槽位一一对应。
pub fn generate_priors(cfg: &NetworkConfig, height: u32, width: u32) -> Box<[Prior]> {
  let (h, w) = (height as f32, width as f32);
  let mut priors = Vec::new();

  for (min_sizes, &step) in cfg.min_sizes.iter().zip(cfg.steps) {
    let map_h = height.div_ceil(step);
    let map_w = width.div_ceil(step);
    let step = step as f32;

    for i in 0..map_h {
      for j in 0..map_w {
        let cx = (j as f32 + 0.5) * step / w;
        let cy = (i as f32 + 0.5) * step / h;
        for &min_size in min_sizes.iter() {
          priors.push(Prior {
            cx,
            cy,
            w: min_size / w,
            h: min_size / h,
          });
        }
      }
    }
  }

  if cfg.clip {
    for prior in priors.iter_mut() {
      prior.cx = prior.cx.clamp(0.0, 1.0);
      prior.cy = prior.cy.clamp(0.0, 1.0);
      prior.w = prior.w.clamp(0.0, 1.0);
      prior.h = prior.h.clamp(0.0, 1.0);
    }
  }

  debug!("{} 输入 {}x{} 生成 {} 个先验框", cfg.name, width, height, priors.len());
  priors.into_boxed_slice()
}
