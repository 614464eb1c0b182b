// 该文件是 Yunshang （云裳） 项目的一部分。
// src/refine.rs - 实例图后处理接口
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

use crate::{
  instance::{ClassMap, InstanceMap, InstanceMasks},
  score::CategoryMap,
};

/// 实例图修正器：可以改写实例图，其余输入只读
pub trait Refiner {
  fn refine(
    &self,
    instances: InstanceMap,
    masks: &InstanceMasks,
    categories: &CategoryMap,
    classes: &ClassMap,
  ) -> InstanceMap;
}

/// 不做任何修改
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRefiner;

impl Refiner for NoopRefiner {
  fn refine(
    &self,
    instances: InstanceMap,
    _masks: &InstanceMasks,
    _categories: &CategoryMap,
    _classes: &ClassMap,
  ) -> InstanceMap {
    instances
  }
}

impl<F> Refiner for F
where
  F: Fn(InstanceMap, &InstanceMasks, &CategoryMap, &ClassMap) -> InstanceMap,
{
  fn refine(
    &self,
    instances: InstanceMap,
    masks: &InstanceMasks,
    categories: &CategoryMap,
    classes: &ClassMap,
  ) -> InstanceMap {
    self(instances, masks, categories, classes)
  }
}
