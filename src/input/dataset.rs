// 该文件是 Yunshang （云裳） 项目的一部分。
// src/input/dataset.rs - 数据集目录读取
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use ndarray::Ix2;
use tracing::{debug, info};

use crate::{
  aggregate::BoundingBox,
  input::{ImageRecord, InputError},
  instance::InstanceMasks,
  utils::{read_float_npy, read_mask_npy},
};

/// 数据集目录结构
#[derive(Debug, Clone)]
pub struct DatasetLayout {
  pub image_dir: PathBuf,
  /// 图像扩展名，包含点号，如 `.jpg`
  pub image_ext: String,
  /// 检测框目录，每张图一个 `<name>.npy`
  pub box_dir: PathBuf,
  /// 人体掩码目录，每张图一个 `<name>.npy`
  pub mask_dir: PathBuf,
}

impl DatasetLayout {
  pub fn image_path(&self, name: &str) -> PathBuf {
    self.image_dir.join(format!("{}{}", name, self.image_ext))
  }

  pub fn box_path(&self, name: &str) -> PathBuf {
    self.box_dir.join(format!("{}.npy", name))
  }

  pub fn mask_path(&self, name: &str) -> PathBuf {
    self.mask_dir.join(format!("{}.npy", name))
  }

  pub fn load(&self, name: &str) -> Result<ImageRecord, InputError> {
    let image = ImageReader::open(self.image_path(name))
      .map_err(|e| InputError::ImageLoadError {
        name: name.to_string(),
        source: image::ImageError::IoError(e),
      })?
      .decode()
      .map_err(|source| InputError::ImageLoadError {
        name: name.to_string(),
        source,
      })?
      .to_rgb8();

    let boxes = self.load_boxes(name)?;
    let masks = self.load_masks(name)?;

    let image_size = (image.height() as usize, image.width() as usize);
    if (masks.height(), masks.width()) != image_size {
      return Err(InputError::MaskSizeMismatch {
        name: name.to_string(),
        mask: (masks.height(), masks.width()),
        image: image_size,
      });
    }

    debug!(
      "{}: {}x{}, {} 个检测框, {} 个人体掩码",
      name,
      image.width(),
      image.height(),
      boxes.len(),
      masks.num_persons()
    );

    Ok(ImageRecord {
      name: name.to_string(),
      image,
      boxes,
      masks,
    })
  }

  pub fn load_boxes(&self, name: &str) -> Result<Vec<BoundingBox>, InputError> {
    let rows = read_float_npy::<Ix2>(&self.box_path(name)).map_err(|source| InputError::NpyError {
      name: name.to_string(),
      source,
    })?;

    rows
      .rows()
      .into_iter()
      .map(|row| {
        let row = row.to_vec();
        BoundingBox::from_row(&row).ok_or_else(|| InputError::InvalidBoxes {
          name: name.to_string(),
          shape: rows.shape().to_vec(),
        })
      })
      .collect()
  }

  pub fn load_masks(&self, name: &str) -> Result<InstanceMasks, InputError> {
    let masks = read_mask_npy(&self.mask_path(name)).map_err(|source| InputError::NpyError {
      name: name.to_string(),
      source,
    })?;
    Ok(masks.into())
  }
}

/// 按图像列表依次读取图像、检测框与人体掩码
///
/// 单张图读取失败时返回对应的错误，后续图像不受影响。
pub struct DatasetInput {
  layout: DatasetLayout,
  names: std::vec::IntoIter<String>,
}

impl DatasetInput {
  pub fn open(layout: DatasetLayout, list_path: &Path) -> Result<Self, InputError> {
    let content = std::fs::read_to_string(list_path).map_err(|source| InputError::ListError {
      path: list_path.to_path_buf(),
      source,
    })?;
    let names = parse_list(&content);
    info!("图像列表 {} 共 {} 张图像", list_path.display(), names.len());
    Ok(Self::with_names(layout, names))
  }

  pub fn with_names(layout: DatasetLayout, names: Vec<String>) -> Self {
    Self {
      layout,
      names: names.into_iter(),
    }
  }
}

impl Iterator for DatasetInput {
  type Item = Result<ImageRecord, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let name = self.names.next()?;
    Some(self.layout.load(&name))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.names.size_hint()
  }
}

fn parse_list(content: &str) -> Vec<String> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect()
}
