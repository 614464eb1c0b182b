// 该文件是 Yunshang （云裳） 项目的一部分。
// src/aggregate.rs - 子图得分拼接
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

use image::{RgbImage, imageops};
use ndarray::{Array2, Array3, s};
use thiserror::Error;
use tracing::{debug, warn};

use crate::score::{BACKGROUND, ScoreMap};

#[derive(Error, Debug)]
pub enum AggregateError {
  #[error("子图 {index} 得分通道数不匹配: 期望 {expected}, 实际 {actual}")]
  ChannelMismatch {
    index: usize,
    expected: usize,
    actual: usize,
  },
  #[error("子图 {index} 得分尺寸 {actual:?} 与区域 {expected:?} 不一致")]
  ExtentMismatch {
    index: usize,
    expected: (usize, usize),
    actual: (usize, usize),
  },
}

/// 检测框，坐标为原图像素坐标，附带检测置信度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
  pub score: f32,
}

/// 裁剪到图像内部的整数像素区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
  pub x: usize,
  pub y: usize,
  pub width: usize,
  pub height: usize,
}

impl BoundingBox {
  pub fn new(bbox: [f32; 4], score: f32) -> Self {
    Self {
      x_min: bbox[0],
      y_min: bbox[1],
      x_max: bbox[2],
      y_max: bbox[3],
      score,
    }
  }

  /// 从 `x_min, y_min, x_max, y_max, score` 行构造，多余的列被忽略
  pub fn from_row(row: &[f32]) -> Option<Self> {
    match row {
      [x_min, y_min, x_max, y_max, score, ..] => Some(Self {
        x_min: *x_min,
        y_min: *y_min,
        x_max: *x_max,
        y_max: *y_max,
        score: *score,
      }),
      _ => None,
    }
  }

  /// 坐标向零取整后裁剪到图像范围内，区域为空时返回 None
  pub fn clip(&self, width: usize, height: usize) -> Option<PixelRect> {
    let clamp = |v: f32, max: usize| (v.trunc() as i64).clamp(0, max as i64) as usize;
    let x0 = clamp(self.x_min, width);
    let y0 = clamp(self.y_min, height);
    let x1 = clamp(self.x_max, width);
    let y1 = clamp(self.y_max, height);

    if x1 <= x0 || y1 <= y0 {
      return None;
    }

    Some(PixelRect {
      x: x0,
      y: y0,
      width: x1 - x0,
      height: y1 - y0,
    })
  }
}

/// 一张子图及其在原图中的检测框
#[derive(Debug, Clone)]
pub struct Patch {
  /// 对应检测框在整张图检测结果中的序号
  pub index: usize,
  pub image: RgbImage,
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default)]
pub struct PatchSet {
  patches: Vec<Patch>,
}

impl PatchSet {
  /// 子图与检测框必须一一对应
  pub fn new(images: Vec<RgbImage>, boxes: Vec<BoundingBox>) -> Self {
    assert_eq!(
      images.len(),
      boxes.len(),
      "子图数量 {} 与检测框数量 {} 不一致",
      images.len(),
      boxes.len()
    );

    let patches = images
      .into_iter()
      .zip(boxes)
      .enumerate()
      .map(|(index, (image, bbox))| Patch { index, image, bbox })
      .collect();
    Self { patches }
  }

  /// 按检测框从整张图中裁出子图，裁剪后为空的检测框被跳过
  pub fn crop_from(image: &RgbImage, boxes: &[BoundingBox]) -> Self {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut patches = Vec::with_capacity(boxes.len());

    for (index, bbox) in boxes.iter().enumerate() {
      let Some(rect) = bbox.clip(width, height) else {
        warn!("检测框 {} 超出图像范围或为空: {:?}", index, bbox);
        continue;
      };
      let crop = imageops::crop_imm(
        image,
        rect.x as u32,
        rect.y as u32,
        rect.width as u32,
        rect.height as u32,
      )
      .to_image();
      patches.push(Patch {
        index,
        image: crop,
        bbox: *bbox,
      });
    }

    Self { patches }
  }

  pub fn len(&self) -> usize {
    self.patches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.patches.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Patch> {
    self.patches.iter()
  }
}

/// 子图得分累加器
///
/// 前景通道按覆盖次数取平均，背景通道取最小值。
/// 背景通道使用 `Option` 表示“尚未被任何子图覆盖”。
pub struct PatchAggregator {
  num_classes: usize,
  sum: Array3<f32>,
  counts: Array2<u32>,
  background: Array2<Option<f32>>,
}

impl PatchAggregator {
  pub fn new(height: usize, width: usize, num_classes: usize) -> Self {
    Self {
      num_classes,
      sum: Array3::zeros((height, width, num_classes)),
      counts: Array2::zeros((height, width)),
      background: Array2::from_elem((height, width), None),
    }
  }

  /// 累加一张已缩放到 `rect` 大小的子图得分
  pub fn add(&mut self, index: usize, rect: PixelRect, scores: &ScoreMap) -> Result<(), AggregateError> {
    let (h, w, c) = scores.dim();
    if c != self.num_classes {
      return Err(AggregateError::ChannelMismatch {
        index,
        expected: self.num_classes,
        actual: c,
      });
    }
    if (h, w) != (rect.height, rect.width) {
      return Err(AggregateError::ExtentMismatch {
        index,
        expected: (rect.height, rect.width),
        actual: (h, w),
      });
    }

    let rows = rect.y..rect.y + rect.height;
    let cols = rect.x..rect.x + rect.width;

    let mut sum = self.sum.slice_mut(s![rows.clone(), cols.clone(), 1..]);
    sum += &scores.scores().slice(s![.., .., 1..]);

    let mut counts = self.counts.slice_mut(s![rows.clone(), cols.clone()]);
    counts += 1;

    let mut background = self.background.slice_mut(s![rows, cols]);
    for ((y, x), slot) in background.indexed_iter_mut() {
      if !scores.is_covered(y, x) {
        continue;
      }
      let value = scores.scores()[[y, x, BACKGROUND]];
      *slot = Some(match *slot {
        Some(current) => current.min(value),
        None => value,
      });
    }

    Ok(())
  }

  /// 前景通道除以覆盖次数（零次按一次计），未覆盖像素的背景标记为 uncovered
  pub fn finish(self) -> ScoreMap {
    let PatchAggregator {
      mut sum,
      counts,
      background,
      ..
    } = self;
    let (h, w, _) = sum.dim();
    let mut uncovered = Array2::from_elem((h, w), false);

    for ((y, x), count) in counts.indexed_iter() {
      let divisor = (*count).max(1) as f32;
      let mut lane = sum.slice_mut(s![y, x, 1..]);
      lane /= divisor;

      match background[[y, x]] {
        Some(value) => sum[[y, x, BACKGROUND]] = value,
        None => {
          sum[[y, x, BACKGROUND]] = 0.0;
          uncovered[[y, x]] = true;
        }
      }
    }

    ScoreMap::from_parts(sum, uncovered)
  }
}

/// 逐个子图推理并拼接为整张图的得分图
///
/// `infer` 返回子图的原始得分，这里负责按检测框大小做双线性缩放。
pub fn aggregate<F, E>(
  whole_size: (usize, usize),
  patches: &PatchSet,
  num_classes: usize,
  mut infer: F,
) -> Result<ScoreMap, E>
where
  F: FnMut(&Patch) -> Result<ScoreMap, E>,
  E: From<AggregateError>,
{
  let (height, width) = whole_size;
  let mut aggregator = PatchAggregator::new(height, width, num_classes);

  for patch in patches.iter() {
    let Some(rect) = patch.bbox.clip(width, height) else {
      warn!("跳过空子图 {}", patch.index);
      continue;
    };
    let scores = infer(patch)?;
    debug!(
      "子图 {}: 得分 {:?} 缩放到 {}x{}",
      patch.index,
      scores.dim(),
      rect.width,
      rect.height
    );
    let resized = scores.resize(rect.height, rect.width);
    aggregator.add(patch.index, rect, &resized)?;
  }

  Ok(aggregator.finish())
}
