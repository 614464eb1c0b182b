// 该文件是 Yunshang （云裳） 项目的一部分。
// src/utils.rs - npy 文件读取工具
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

use ndarray::{Array, Array3, Dimension};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum NpyError {
  #[error("无法读取 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法解析 {path}: {source}")]
  Parse {
    path: PathBuf,
    source: ReadNpyError,
  },
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, NpyError> {
  std::fs::read(path).map_err(|source| NpyError::Io {
    path: path.to_path_buf(),
    source,
  })
}

/// 读取浮点数组，float64 会被收窄为 float32
pub fn read_float_npy<D: Dimension>(path: &Path) -> Result<Array<f32, D>, NpyError> {
  let bytes = read_bytes(path)?;
  if let Ok(array) = Array::<f32, D>::read_npy(bytes.as_slice()) {
    return Ok(array);
  }

  debug!("{} 不是 float32，尝试按 float64 读取", path.display());
  Array::<f64, D>::read_npy(bytes.as_slice())
    .map(|array| array.mapv(|v| v as f32))
    .map_err(|source| NpyError::Parse {
      path: path.to_path_buf(),
      source,
    })
}

/// 读取 uint8 或 bool 掩码，非零即为真
pub fn read_mask_npy(path: &Path) -> Result<Array3<u8>, NpyError> {
  let bytes = read_bytes(path)?;
  if let Ok(array) = Array3::<u8>::read_npy(bytes.as_slice()) {
    return Ok(array);
  }

  debug!("{} 不是 uint8，尝试按 bool 读取", path.display());
  Array3::<bool>::read_npy(bytes.as_slice())
    .map(|array| array.mapv(u8::from))
    .map_err(|source| NpyError::Parse {
      path: path.to_path_buf(),
      source,
    })
}
