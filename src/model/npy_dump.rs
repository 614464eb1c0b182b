// 该文件是 Yunshang （云裳） 项目的一部分。
// src/model/npy_dump.rs - 读取预先导出的得分图
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use ndarray::{Array3, Ix3};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{InferRequest, ParsingModel, Region},
  utils::{NpyError, read_float_npy},
};

#[derive(Error, Debug)]
pub enum NpyDumpError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("得分目录不存在: {0}")]
  MissingDirectory(PathBuf),
  #[error("得分文件错误: {0}")]
  Npy(#[from] NpyError),
}

/// 由外部推理运行时导出的 (H, W, C) 得分图
///
/// 文件命名：整图 `<name>.npy`，子图 `<name>_<index>.npy`，镜像输入追加 `_flip`。
pub struct NpyDumpModel {
  directory: PathBuf,
}

impl FromUrlWithScheme for NpyDumpModel {
  const SCHEME: &'static str = "npy";
}

impl FromUrl for NpyDumpModel {
  type Error = NpyDumpError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(NpyDumpError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let directory = directory_from_url(url);
    if !directory.is_dir() {
      return Err(NpyDumpError::MissingDirectory(directory));
    }

    info!("使用得分目录: {}", directory.display());
    Ok(NpyDumpModel { directory })
  }
}

/// `npy:///abs/dir` 为绝对路径，`npy://dir/sub` 把主机部分视为相对路径的第一段
fn directory_from_url(url: &Url) -> PathBuf {
  let path = url.path();
  match url.host_str() {
    Some(host) if !host.is_empty() => {
      let rest = path.trim_start_matches('/');
      if rest.is_empty() {
        PathBuf::from(host)
      } else {
        PathBuf::from(host).join(rest)
      }
    }
    _ => PathBuf::from(path),
  }
}

impl NpyDumpModel {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn dump_path(&self, request: &InferRequest<'_>) -> PathBuf {
    let mut stem = match request.region {
      Region::Whole => request.image_name.to_string(),
      Region::Patch(index) => format!("{}_{}", request.image_name, index),
    };
    if request.mirrored {
      stem.push_str("_flip");
    }
    self.directory.join(format!("{}.npy", stem))
  }
}

impl ParsingModel for NpyDumpModel {
  type Error = NpyDumpError;

  fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error> {
    let path = self.dump_path(request);
    debug!("读取得分文件: {}", path.display());
    let scores = read_float_npy::<Ix3>(&path)?;
    Ok(scores)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;
  use ndarray_npy::write_npy;

  #[test]
  fn dump_paths_follow_region_and_mirror() {
    let model = NpyDumpModel::new("/dumps");
    let image = RgbImage::new(1, 1);
    let mut request = InferRequest {
      image_name: "0001",
      region: Region::Whole,
      image: &image,
      target_size: (473, 473),
      mirrored: false,
    };
    assert_eq!(model.dump_path(&request), PathBuf::from("/dumps/0001.npy"));

    request.region = Region::Patch(2);
    request.mirrored = true;
    assert_eq!(model.dump_path(&request), PathBuf::from("/dumps/0001_2_flip.npy"));
  }

  #[test]
  fn from_url_checks_scheme_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("npy://{}", dir.path().display())).unwrap();
    assert!(NpyDumpModel::from_url(&url).is_ok());

    let url = Url::parse("rknn:///tmp/model.rknn").unwrap();
    assert!(matches!(
      NpyDumpModel::from_url(&url),
      Err(NpyDumpError::SchemeMismatch { .. })
    ));

    let url = Url::parse("npy:///nonexistent/dumps").unwrap();
    assert!(matches!(
      NpyDumpModel::from_url(&url),
      Err(NpyDumpError::MissingDirectory(_))
    ));
  }

  #[test]
  fn url_host_is_part_of_directory() {
    let url = Url::parse("npy://dumps/run1").unwrap();
    assert_eq!(directory_from_url(&url), PathBuf::from("dumps/run1"));

    let url = Url::parse("npy://dumps").unwrap();
    assert_eq!(directory_from_url(&url), PathBuf::from("dumps"));

    let url = Url::parse("npy:///data/dumps").unwrap();
    assert_eq!(directory_from_url(&url), PathBuf::from("/data/dumps"));

    let url = Url::parse("npy://missing-dumps/run1").unwrap();
    match NpyDumpModel::from_url(&url) {
      Err(NpyDumpError::MissingDirectory(dir)) => assert_eq!(dir, PathBuf::from("missing-dumps/run1")),
      _ => panic!("期望目录不存在错误"),
    }
  }

  #[test]
  fn infer_reads_dump() {
    let dir = tempfile::tempdir().unwrap();
    let scores = Array3::<f32>::from_elem((3, 2, 4), 0.25);
    write_npy(dir.path().join("0001_0.npy"), &scores).unwrap();

    let model = NpyDumpModel::new(dir.path());
    let image = RgbImage::new(2, 3);
    let request = InferRequest {
      image_name: "0001",
      region: Region::Patch(0),
      image: &image,
      target_size: (473, 473),
      mirrored: false,
    };
    assert_eq!(model.infer(&request).unwrap(), scores);

    let request = InferRequest {
      region: Region::Whole,
      ..request
    };
    assert!(model.infer(&request).is_err());
  }
}
