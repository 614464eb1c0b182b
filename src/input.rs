// 该文件是 Yunshang （云裳） 项目的一部分。
// src/input.rs - 数据集输入
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

use crate::{aggregate::BoundingBox, instance::InstanceMasks, utils::NpyError};

mod dataset;
pub use self::dataset::{DatasetInput, DatasetLayout};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法读取图像列表 {path}: {source}")]
  ListError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法加载图像 {name}: {source}")]
  ImageLoadError {
    name: String,
    source: image::ImageError,
  },
  #[error("图像 {name} 的数据文件错误: {source}")]
  NpyError { name: String, source: NpyError },
  #[error("图像 {name} 的检测框形状 {shape:?} 无效，需要 (N, 5)")]
  InvalidBoxes { name: String, shape: Vec<usize> },
  #[error("图像 {name} 的掩码尺寸 {mask:?} 与图像尺寸 {image:?} 不一致")]
  MaskSizeMismatch {
    name: String,
    mask: (usize, usize),
    image: (usize, usize),
  },
}

/// 一张待处理的图像及其外部检测结果
#[derive(Debug, Clone)]
pub struct ImageRecord {
  pub name: String,
  pub image: RgbImage,
  pub boxes: Vec<BoundingBox>,
  pub masks: InstanceMasks,
}

impl ImageRecord {
  /// (高, 宽)
  pub fn size(&self) -> (usize, usize) {
    (self.image.height() as usize, self.image.width() as usize)
  }
}
