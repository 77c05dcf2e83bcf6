// 该文件是 Cabinscan （驾驶室巡检） 项目的一部分。
// src/model/binding.rs - 模型输出名称核对
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

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::model::ModelError;

/// 去掉多卡训练导出时附带的公共前缀，例如 `module.`
pub fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
  key.strip_prefix(prefix).unwrap_or(key)
}

/// 期望名称与模型实际提供名称的对照结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyReport {
  pub used: BTreeSet<String>,
  pub missing: BTreeSet<String>,
  pub unused: BTreeSet<String>,
}

impl KeyReport {
  pub fn compare<E, P>(expected: E, provided: P) -> Self
  where
    E: IntoIterator,
    E::Item: Into<String>,
    P: IntoIterator,
    P::Item: Into<String>,
  {
    let expected: BTreeSet<String> = expected.into_iter().map(Into::into).collect();
    let provided: BTreeSet<String> = provided.into_iter().map(Into::into).collect();

    KeyReport {
      used: expected.intersection(&provided).cloned().collect(),
      missing: expected.difference(&provided).cloned().collect(),
      unused: provided.difference(&expected).cloned().collect(),
    }
  }

  pub fn is_complete(&self) -> bool {
    self.missing.is_empty()
  }

  pub fn log(&self) {
    info!("缺失名称: {}", self.missing.len());
    info!("未使用名称: {}", self.unused.len());
    info!("已匹配名称: {}", self.used.len());
    if !self.missing.is_empty() {
      warn!("模型缺少以下输出: {:?}", self.missing);
    }
  }

  /// 一个名称都没有匹配上时视为加载失败
  pub fn ensure_any(&self) -> Result<(), ModelError> {
    if self.used.is_empty() {
      return Err(ModelError::OutputMismatch {
        expected: self.missing.iter().cloned().collect(),
        actual: self.unused.iter().cloned().collect(),
      });
    }
    Ok(())
  }
}

/// 将期望输出按名称映射到模型输出下标
///
/// 名称先去掉 `prefix`。未匹配上的槽位按顺序取用剩余未被占用的输出。
pub fn bind_outputs<const N: usize>(
  expected: [&str; N],
  provided: &[String],
  prefix: &str,
) -> Result<[usize; N], ModelError> {
  let names: Vec<&str> = provided.iter().map(|name| strip_prefix(name, prefix)).collect();

  let report = KeyReport::compare(expected, names.iter().copied());
  report.log();
  report.ensure_any()?;

  if names.len() < N {
    return Err(ModelError::OutputMismatch {
      expected: expected.iter().map(|s| s.to_string()).collect(),
      actual: names.iter().map(|s| s.to_string()).collect(),
    });
  }

  let mut slots = expected.map(|name| names.iter().position(|n| *n == name));
  let mut spare = (0..names.len())
    .filter(|i| !slots.contains(&Some(*i)))
    .collect::<Vec<_>>()
    .into_iter();
  for (slot, name) in slots.iter_mut().zip(expected) {
    if slot.is_none() {
      *slot = spare.next();
      if let Some(index) = *slot {
        warn!("未找到输出 {}，改用第 {} 个输出 {}", name, index, names[index]);
      }
    }
  }

  let mut bound = [0usize; N];
  for (b, slot) in bound.iter_mut().zip(slots) {
    // names.len() >= N，空闲下标足够填满所有槽位
    *b = slot.ok_or_else(|| ModelError::InvalidOutput("输出槽位不足".to_string()))?;
  }
  Ok(bound)
}
