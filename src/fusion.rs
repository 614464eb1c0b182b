// 该文件是 Yunshang （云裳） 项目的一部分。
// src/fusion.rs - 多模型得分融合
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

use ndarray::{Axis, concatenate};
use thiserror::Error;

use crate::score::ScoreMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
  /// 逐元素相加，不做归一化
  #[default]
  Sum,
  /// 沿类别维拼接，得到 (H, W, C×k)
  Concat,
}

#[derive(Error, Debug)]
pub enum FusionError {
  #[error("没有可融合的得分图")]
  Empty,
  #[error("得分图尺寸不一致: {0:?} 与 {1:?}")]
  ShapeMismatch(Vec<usize>, Vec<usize>),
}

/// 融合多个模型的整图得分图，任一输入未覆盖的像素在结果中同样未覆盖
pub fn fuse(maps: &[ScoreMap], mode: FusionMode) -> Result<ScoreMap, FusionError> {
  let (first, rest) = maps.split_first().ok_or(FusionError::Empty)?;

  let mut uncovered = first.uncovered().clone();
  for map in rest {
    let same = match mode {
      FusionMode::Sum => map.dim() == first.dim(),
      FusionMode::Concat => (map.height(), map.width()) == (first.height(), first.width()),
    };
    if !same {
      return Err(FusionError::ShapeMismatch(
        first.scores().shape().to_vec(),
        map.scores().shape().to_vec(),
      ));
    }
    uncovered.zip_mut_with(map.uncovered(), |a, &b| *a |= b);
  }

  let scores = match mode {
    FusionMode::Sum => {
      let mut scores = first.scores().clone();
      for map in rest {
        scores += map.scores();
      }
      scores
    }
    FusionMode::Concat => {
      let views: Vec<_> = maps.iter().map(|m| m.scores().view()).collect();
      concatenate(Axis(2), &views).map_err(|_| {
        FusionError::ShapeMismatch(first.scores().shape().to_vec(), Vec::new())
      })?
    }
  };

  Ok(ScoreMap::from_parts(scores, uncovered))
}
