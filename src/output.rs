// 该文件是 Yunshang （云裳） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use thiserror::Error;

use crate::{instance::InstanceError, score::ScoreError};

pub trait Render<Frame, Output>: Sized {
  type Error;
  type Summary;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<Self::Summary, Self::Error>;
}

pub mod palette;

mod label_image;
pub use self::label_image::save_indexed_png;

mod report;
pub use self::report::{Registry, write_confidence_report};

mod packager;
pub use self::packager::{PackageSummary, ResultPackager, rank_by_area, tag_map};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误 {path}: {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("PNG 编码错误 {path}: {source}")]
  PngError {
    path: PathBuf,
    source: png::EncodingError,
  },
  #[error("得分图错误: {0}")]
  ScoreError(#[from] ScoreError),
  #[error("实例编号错误: {0}")]
  InstanceError(#[from] InstanceError),
  #[error("检测框数量 {boxes} 多于人体掩码数量 {masks}")]
  MaskCountMismatch { boxes: usize, masks: usize },
  #[error("登记文件锁已损坏")]
  RegistryPoisoned,
}

impl OutputError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> OutputError {
    let path = path.into();
    move |source| OutputError::IoError { path, source }
  }
}
