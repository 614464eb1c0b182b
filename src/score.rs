// 该文件是 Yunshang （云裳） 项目的一部分。
// src/score.rs - 逐像素类别得分图
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

use ndarray::{Array2, Array3, Axis, Zip};
use thiserror::Error;

/// 类别图，每个像素为类别编号，0 为背景
pub type CategoryMap = Array2<u8>;

pub const BACKGROUND: usize = 0;
const MAX_CATEGORIES: usize = 256;

#[derive(Error, Debug)]
pub enum ScoreError {
  #[error("得分图尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: (usize, usize, usize),
    actual: (usize, usize, usize),
  },
  #[error("类别数 {0} 超出类别图可表示的范围")]
  TooManyClasses(usize),
  #[error("得分图为空")]
  Empty,
}

/// (H, W, C) 得分图
///
/// `uncovered` 显式标记没有任何子图覆盖的像素，这些像素在 arg-max 时一定判为背景。
/// `scores` 中这些像素的背景通道保存为 0.0，使得所有得分都是有限值。
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
  scores: Array3<f32>,
  uncovered: Array2<bool>,
}

impl From<Array3<f32>> for ScoreMap {
  fn from(scores: Array3<f32>) -> Self {
    let (h, w, _) = scores.dim();
    Self {
      scores,
      uncovered: Array2::from_elem((h, w), false),
    }
  }
}

impl ScoreMap {
  pub fn new(scores: Array3<f32>, uncovered: Array2<bool>) -> Result<Self, ScoreError> {
    let (h, w, c) = scores.dim();
    if uncovered.dim() != (h, w) {
      let (uh, uw) = uncovered.dim();
      return Err(ScoreError::ShapeMismatch {
        expected: (h, w, c),
        actual: (uh, uw, c),
      });
    }
    Ok(Self { scores, uncovered })
  }

  // 调用方保证 scores 与 uncovered 的空间尺寸一致
  pub(crate) fn from_parts(scores: Array3<f32>, uncovered: Array2<bool>) -> Self {
    Self { scores, uncovered }
  }

  pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
    Array3::zeros((height, width, channels)).into()
  }

  pub fn dim(&self) -> (usize, usize, usize) {
    self.scores.dim()
  }

  pub fn height(&self) -> usize {
    self.scores.dim().0
  }

  pub fn width(&self) -> usize {
    self.scores.dim().1
  }

  pub fn channels(&self) -> usize {
    self.scores.dim().2
  }

  pub fn scores(&self) -> &Array3<f32> {
    &self.scores
  }

  pub fn uncovered(&self) -> &Array2<bool> {
    &self.uncovered
  }

  pub fn is_covered(&self, y: usize, x: usize) -> bool {
    !self.uncovered[[y, x]]
  }

  /// 双线性缩放到 (height, width)，采样方式与 OpenCV INTER_LINEAR 一致
  pub fn resize(&self, height: usize, width: usize) -> ScoreMap {
    let (src_h, src_w, channels) = self.dim();
    if (src_h, src_w) == (height, width) {
      return self.clone();
    }
    if src_h == 0 || src_w == 0 {
      return ScoreMap {
        scores: Array3::zeros((height, width, channels)),
        uncovered: Array2::from_elem((height, width), true),
      };
    }

    let ys = linear_taps(height, src_h);
    let xs = linear_taps(width, src_w);

    let mut scores = Array3::<f32>::zeros((height, width, channels));
    let mut uncovered = Array2::from_elem((height, width), false);

    for (dy, &(y0, y1, fy)) in ys.iter().enumerate() {
      for (dx, &(x0, x1, fx)) in xs.iter().enumerate() {
        let taps = [
          (y0, x0, (1.0 - fy) * (1.0 - fx)),
          (y0, x1, (1.0 - fy) * fx),
          (y1, x0, fy * (1.0 - fx)),
          (y1, x1, fy * fx),
        ];
        // 任一有效采样点未被覆盖，目标像素即视为未覆盖
        uncovered[[dy, dx]] = taps
          .iter()
          .any(|&(y, x, weight)| weight > 0.0 && self.uncovered[[y, x]]);

        for c in 0..channels {
          scores[[dy, dx, c]] = taps
            .iter()
            .filter(|(_, _, weight)| *weight > 0.0)
            .map(|&(y, x, weight)| self.scores[[y, x, c]] * weight)
            .sum();
        }
      }
    }

    ScoreMap { scores, uncovered }
  }

  /// 沿类别维取 arg-max；未覆盖的像素固定为背景，并列时取编号最小的类别
  pub fn category_map(&self) -> Result<CategoryMap, ScoreError> {
    let (h, w, c) = self.dim();
    if c == 0 {
      return Err(ScoreError::Empty);
    }
    if c > MAX_CATEGORIES {
      return Err(ScoreError::TooManyClasses(c));
    }

    let mut categories = CategoryMap::zeros((h, w));
    Zip::from(&mut categories)
      .and(self.scores.lanes(Axis(2)))
      .and(&self.uncovered)
      .for_each(|category, lane, &uncovered| {
        if uncovered {
          *category = BACKGROUND as u8;
          return;
        }
        let mut best = BACKGROUND;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, &score) in lane.iter().enumerate() {
          if score > best_score {
            best_score = score;
            best = idx;
          }
        }
        *category = best as u8;
      });

    Ok(categories)
  }
}

/// 计算一维线性插值的采样点 (左, 右, 右侧权重)
fn linear_taps(dst: usize, src: usize) -> Vec<(usize, usize, f32)> {
  let scale = src as f64 / dst as f64;
  (0..dst)
    .map(|d| {
      let f = (d as f64 + 0.5) * scale - 0.5;
      let mut i0 = f.floor();
      let mut frac = f - i0;
      if i0 < 0.0 {
        i0 = 0.0;
        frac = 0.0;
      }
      let i0 = i0 as usize;
      if i0 + 1 >= src {
        (src - 1, src - 1, 0.0)
      } else {
        (i0, i0 + 1, frac as f32)
      }
    })
    .collect()
}
