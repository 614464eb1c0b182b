// 该文件是 Yunshang （云裳） 项目的一部分。
// src/confidence.rs - 实例置信度
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

use ndarray::{Axis, Zip};
use tracing::warn;

use crate::{
  instance::{ClassMap, InstanceMap},
  score::ScoreMap,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceConfidence {
  pub id: u8,
  pub category: u8,
  pub confidence: f64,
}

/// 每个实例在其类别通道上的平均得分，按实例编号升序返回
///
/// 没有像素或类别超出通道数的实例会被跳过。
pub fn score(scores: &ScoreMap, classes: &ClassMap, instances: &InstanceMap) -> Vec<InstanceConfidence> {
  const SLOTS: usize = u8::MAX as usize + 1;
  let mut sums = [0f64; SLOTS];
  let mut counts = [0usize; SLOTS];
  let channels = scores.channels();

  if instances.dim() != (scores.height(), scores.width()) {
    warn!(
      "实例图尺寸 {:?} 与得分图尺寸 {:?} 不一致",
      instances.dim(),
      scores.dim()
    );
    return Vec::new();
  }

  Zip::from(instances)
    .and(scores.scores().lanes(Axis(2)))
    .for_each(|&id, lane| {
      if id == 0 {
        return;
      }
      if let Some(category) = classes.get(id)
        && (category as usize) < channels
      {
        sums[id as usize] += lane[category as usize] as f64;
        counts[id as usize] += 1;
      }
    });

  classes
    .iter()
    .filter_map(|(id, category)| {
      let count = counts[id as usize];
      if count == 0 {
        warn!("实例 {} (类别 {}) 没有可用像素，跳过置信度计算", id, category);
        return None;
      }
      Some(InstanceConfidence {
        id,
        category,
        confidence: sums[id as usize] / count as f64,
      })
    })
    .collect()
}
