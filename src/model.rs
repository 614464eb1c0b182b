// 该文件是 Yunshang （云裳） 项目的一部分。
// src/model.rs - 人体解析模型接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use ndarray::Array3;
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 推理的图像范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
  /// 整张图
  Whole,
  /// 第 n 个检测框对应的子图
  Patch(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct InferRequest<'a> {
  pub image_name: &'a str,
  pub region: Region,
  pub image: &'a RgbImage,
  /// 期望的输出尺寸 (高, 宽)
  pub target_size: (usize, usize),
  /// 输入是否为水平镜像
  pub mirrored: bool,
}

/// 推理协作者：输入一张图（或子图），输出 (H, W, C) 的逐像素类别得分
pub trait ParsingModel {
  type Error;

  fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error>;
}

impl<M: ParsingModel + ?Sized> ParsingModel for &M {
  type Error = M::Error;

  fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error> {
    (**self).infer(request)
  }
}

mod flip;
pub use self::flip::{FlipAveraged, FlipError};

#[cfg(feature = "model_npy_dump")]
mod npy_dump;
#[cfg(feature = "model_npy_dump")]
pub use self::npy_dump::{NpyDumpError, NpyDumpModel};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_npy_dump")]
  #[error("得分转储模型错误: {0}")]
  NpyDumpError(#[from] NpyDumpError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的模型后端
pub enum ModelWrapper {
  #[cfg(feature = "model_npy_dump")]
  NpyDump(NpyDumpModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_npy_dump")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == NpyDumpModel::SCHEME {
        let model = NpyDumpModel::from_url(url)?;
        return Ok(ModelWrapper::NpyDump(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl ParsingModel for ModelWrapper {
  type Error = ModelError;

  fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error> {
    match *self {
      #[cfg(feature = "model_npy_dump")]
      ModelWrapper::NpyDump(ref model) => model.infer(request).map_err(ModelError::from),
    }
  }
}
