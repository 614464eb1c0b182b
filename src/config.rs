// 该文件是 Yunshang （云裳） 项目的一部分。
// src/config.rs - 数据集与推理配置
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

use crate::fusion::FusionMode;

const CIHP_CLASS_NUM: usize = 20;
const MHP_CLASS_NUM: usize = 59;

// 左右对称的身体部位通道，水平翻转时需要互换
const CIHP_FLIP_PAIRS: [(usize, usize); 3] = [(14, 15), (16, 17), (18, 19)];
const MHP_FLIP_PAIRS: [(usize, usize); 8] = [
  (5, 6),
  (7, 8),
  (22, 23),
  (24, 25),
  (26, 27),
  (28, 29),
  (30, 31),
  (32, 33),
];

pub const DEFAULT_INPUT_SIZE: (usize, usize) = (473, 473);

/// 数据集变体，决定类别数与翻转通道表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatasetVariant {
  Cihp,
  #[default]
  Mhp,
}

impl DatasetVariant {
  pub fn num_classes(&self) -> usize {
    match self {
      DatasetVariant::Cihp => CIHP_CLASS_NUM,
      DatasetVariant::Mhp => MHP_CLASS_NUM,
    }
  }

  pub fn flip_pairs(&self) -> &'static [(usize, usize)] {
    match self {
      DatasetVariant::Cihp => &CIHP_FLIP_PAIRS,
      DatasetVariant::Mhp => &MHP_FLIP_PAIRS,
    }
  }

  /// 输出目录前缀
  pub fn prefix(&self) -> &'static str {
    match self {
      DatasetVariant::Cihp => "CIHP",
      DatasetVariant::Mhp => "MHPv2",
    }
  }

  /// 翻转后通道 `c` 对应的源通道
  pub fn flip_source_channel(&self, c: usize) -> usize {
    for &(a, b) in self.flip_pairs() {
      if c == a {
        return b;
      }
      if c == b {
        return a;
      }
    }
    c
  }
}

#[derive(Debug, Clone)]
pub struct ParsingConfig {
  pub variant: DatasetVariant,
  pub num_classes: usize,
  /// 网络输入尺寸 (高, 宽)
  pub input_size: (usize, usize),
  pub flip: bool,
  pub fusion: FusionMode,
}

impl ParsingConfig {
  pub fn new(variant: DatasetVariant) -> Self {
    Self {
      variant,
      num_classes: variant.num_classes(),
      input_size: DEFAULT_INPUT_SIZE,
      flip: true,
      fusion: FusionMode::Sum,
    }
  }

  pub fn with_num_classes(mut self, num_classes: Option<usize>) -> Self {
    if let Some(n) = num_classes {
      self.num_classes = n;
    }
    self
  }

  pub fn with_flip(mut self, flip: bool) -> Self {
    self.flip = flip;
    self
  }
}

impl Default for ParsingConfig {
  fn default() -> Self {
    Self::new(DatasetVariant::default())
  }
}
