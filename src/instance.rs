// 该文件是 Yunshang （云裳） 项目的一部分。
// src/instance.rs - 人体部位实例编号
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

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use thiserror::Error;
use tracing::debug;

use crate::score::CategoryMap;

/// 实例图，0 表示不属于任何实例
pub type InstanceMap = Array2<u8>;

/// 单张图最多可编号的实例数
pub const MAX_INSTANCES: usize = 255;
const ID_SLOTS: usize = MAX_INSTANCES + 1;

#[derive(Error, Debug)]
pub enum InstanceError {
  #[error("人体掩码尺寸 {masks:?} 与类别图尺寸 {categories:?} 不一致")]
  ShapeMismatch {
    masks: (usize, usize),
    categories: (usize, usize),
  },
}

/// (H, W, N) 人体掩码，每个通道对应一个检测到的人，非零即属于该人
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMasks {
  masks: Array3<u8>,
}

impl From<Array3<u8>> for InstanceMasks {
  fn from(masks: Array3<u8>) -> Self {
    Self { masks }
  }
}

impl From<Array3<bool>> for InstanceMasks {
  fn from(masks: Array3<bool>) -> Self {
    Self {
      masks: masks.mapv(u8::from),
    }
  }
}

impl InstanceMasks {
  pub fn height(&self) -> usize {
    self.masks.dim().0
  }

  pub fn width(&self) -> usize {
    self.masks.dim().1
  }

  pub fn num_persons(&self) -> usize {
    self.masks.dim().2
  }

  pub fn plane(&self, person: usize) -> ArrayView2<'_, u8> {
    self.masks.index_axis(Axis(2), person)
  }

  /// 第 `person` 个人的掩码像素数
  pub fn area(&self, person: usize) -> usize {
    self.plane(person).iter().filter(|&&v| v != 0).count()
  }
}

/// 实例编号到类别编号的映射，按编号直接索引
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
  slots: [Option<u8>; ID_SLOTS],
}

impl Default for ClassMap {
  fn default() -> Self {
    Self {
      slots: [None; ID_SLOTS],
    }
  }
}

impl ClassMap {
  pub fn get(&self, id: u8) -> Option<u8> {
    self.slots[id as usize]
  }

  pub fn insert(&mut self, id: u8, category: u8) {
    self.slots[id as usize] = Some(category);
  }

  pub fn len(&self) -> usize {
    self.slots.iter().filter(|s| s.is_some()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.iter().all(Option::is_none)
  }

  /// 按实例编号升序遍历 (编号, 类别)
  pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
    self
      .slots
      .iter()
      .enumerate()
      .filter_map(|(id, slot)| slot.map(|category| (id as u8, category)))
  }
}

#[derive(Debug, Clone)]
pub struct Assignment {
  pub instances: InstanceMap,
  pub classes: ClassMap,
  /// 压缩前记录的实例数
  pub recorded: usize,
  /// 是否因超过 [`MAX_INSTANCES`] 而截断
  pub truncated: bool,
}

/// 按人体掩码把类别图拆分为 (人, 部位) 实例，并把编号压缩为从 1 开始的连续区间
pub fn assign(categories: &CategoryMap, masks: &InstanceMasks) -> Result<Assignment, InstanceError> {
  let dim = categories.dim();
  if (masks.height(), masks.width()) != dim {
    return Err(InstanceError::ShapeMismatch {
      masks: (masks.height(), masks.width()),
      categories: dim,
    });
  }

  let mut instances = InstanceMap::zeros(dim);
  let mut recorded_classes = ClassMap::default();
  let mut total_parts = 0usize;
  let mut truncated = false;

  'persons: for person in 0..masks.num_persons() {
    let plane = masks.plane(person);

    let mut present = [false; ID_SLOTS];
    Zip::from(categories).and(&plane).for_each(|&category, &mask| {
      if mask != 0 && category != 0 {
        present[category as usize] = true;
      }
    });

    // 类别编号升序依次分配实例编号
    let mut lut: [Option<u8>; ID_SLOTS] = [None; ID_SLOTS];
    for category in (1..ID_SLOTS).filter(|&c| present[c]) {
      total_parts += 1;
      if total_parts > MAX_INSTANCES {
        debug!(
          "实例数超过上限 {}，停止编号（第 {} 个人）",
          MAX_INSTANCES,
          person + 1
        );
        truncated = true;
        break;
      }
      recorded_classes.insert(total_parts as u8, category as u8);
      lut[category] = Some(total_parts as u8);
    }

    Zip::from(&mut instances)
      .and(categories)
      .and(&plane)
      .for_each(|instance, &category, &mask| {
        if mask != 0
          && let Some(id) = lut[category as usize]
        {
          *instance = id;
        }
      });

    if truncated {
      break 'persons;
    }
  }

  let recorded = total_parts.min(MAX_INSTANCES);
  let (instances, classes) = compact(instances, &recorded_classes);
  debug!("记录实例 {} 个，压缩后 {} 个", recorded, classes.len());

  Ok(Assignment {
    instances,
    classes,
    recorded,
    truncated,
  })
}

/// 去掉没有像素的编号，保持相对顺序
fn compact(mut instances: InstanceMap, recorded: &ClassMap) -> (InstanceMap, ClassMap) {
  let mut used = [false; ID_SLOTS];
  for &id in instances.iter() {
    used[id as usize] = true;
  }
  let used_ids: Vec<u8> = (1..ID_SLOTS).filter(|&id| used[id]).map(|id| id as u8).collect();
  let max_id = used_ids.last().copied().unwrap_or(0) as usize;

  if max_id != used_ids.len() {
    let mut remap = [0u8; ID_SLOTS];
    for (position, &id) in used_ids.iter().enumerate() {
      remap[id as usize] = (position + 1) as u8;
    }
    instances.mapv_inplace(|id| remap[id as usize]);
  }

  let mut classes = ClassMap::default();
  for (position, &id) in used_ids.iter().enumerate() {
    if let Some(category) = recorded.get(id) {
      classes.insert((position + 1) as u8, category);
    }
  }

  (instances, classes)
}
