// 该文件是 Yunshang （云裳） 项目的一部分。
// src/model/flip.rs - 水平翻转平均
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::imageops;
use ndarray::{Array3, s};
use thiserror::Error;
use tracing::debug;

use crate::{
  config::{DatasetVariant, ParsingConfig},
  model::{InferRequest, ParsingModel},
};

#[derive(Error, Debug)]
pub enum FlipError<E> {
  #[error("模型推理错误: {0}")]
  Model(E),
  #[error("原图与镜像输出尺寸不一致: {0:?} 与 {1:?}")]
  ShapeMismatch((usize, usize, usize), (usize, usize, usize)),
}

/// 对原图和水平镜像分别推理，镜像结果交换左右对称通道并翻转回来后取平均
pub struct FlipAveraged<M> {
  inner: M,
  variant: DatasetVariant,
  enabled: bool,
}

impl<M> FlipAveraged<M> {
  pub fn new(inner: M, config: &ParsingConfig) -> Self {
    Self {
      inner,
      variant: config.variant,
      enabled: config.flip,
    }
  }

  pub fn into_inner(self) -> M {
    self.inner
  }
}

impl<M: ParsingModel> ParsingModel for FlipAveraged<M> {
  type Error = FlipError<M::Error>;

  fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error> {
    let normal = self.inner.infer(request).map_err(FlipError::Model)?;
    if !self.enabled {
      return Ok(normal);
    }

    let mirrored_image = imageops::flip_horizontal(request.image);
    let mirrored_request = InferRequest {
      image: &mirrored_image,
      mirrored: !request.mirrored,
      ..*request
    };
    let mirrored = self.inner.infer(&mirrored_request).map_err(FlipError::Model)?;

    if mirrored.dim() != normal.dim() {
      return Err(FlipError::ShapeMismatch(normal.dim(), mirrored.dim()));
    }

    let restored = unflip(&mirrored, self.variant);
    debug!("{} {:?}: 翻转平均 {:?}", request.image_name, request.region, normal.dim());
    Ok((normal + restored) * 0.5)
  }
}

/// 交换对称通道并沿宽度方向翻转
fn unflip(mirrored: &Array3<f32>, variant: DatasetVariant) -> Array3<f32> {
  let channels = mirrored.dim().2;
  let mut restored = Array3::<f32>::zeros(mirrored.dim());
  for c in 0..channels {
    let source = variant.flip_source_channel(c);
    let source = if source < channels { source } else { c };
    restored
      .slice_mut(s![.., .., c])
      .assign(&mirrored.slice(s![.., ..;-1, source]));
  }
  restored
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Region;
  use approx::assert_abs_diff_eq;
  use image::RgbImage;
  use std::cell::Cell;

  /// 左半边输出通道 14，右半边输出通道 15，红色像素额外输出通道 3
  struct SideModel {
    calls: Cell<usize>,
  }

  impl ParsingModel for SideModel {
    type Error = std::convert::Infallible;

    fn infer(&self, request: &InferRequest<'_>) -> Result<Array3<f32>, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      let (w, h) = request.image.dimensions();
      let mut scores = Array3::<f32>::zeros((h as usize, w as usize, 20));
      for x in 0..w {
        let side = if x < w / 2 { 14 } else { 15 };
        scores.slice_mut(s![.., x as usize, side]).fill(1.0);
        if request.image.get_pixel(x, 0)[0] > 0 {
          scores.slice_mut(s![.., x as usize, 3]).fill(1.0);
        }
      }
      Ok(scores)
    }
  }

  fn request(image: &RgbImage) -> InferRequest<'_> {
    InferRequest {
      image_name: "demo",
      region: Region::Whole,
      image,
      target_size: (1, 2),
      mirrored: false,
    }
  }

  #[test]
  fn mirrored_output_is_remapped_and_flipped_back() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, image::Rgb([255, 0, 0]));

    let config = ParsingConfig::new(DatasetVariant::Cihp);
    let model = FlipAveraged::new(SideModel { calls: Cell::new(0) }, &config);
    let scores = model.infer(&request(&image)).unwrap();

    // 镜像输出翻回后与原图一致：左侧 14，右侧 15，红色像素仍在 x=0
    assert_abs_diff_eq!(scores[[0, 0, 14]], 1.0);
    assert_abs_diff_eq!(scores[[0, 0, 15]], 0.0);
    assert_abs_diff_eq!(scores[[0, 1, 15]], 1.0);
    assert_abs_diff_eq!(scores[[0, 1, 14]], 0.0);
    assert_abs_diff_eq!(scores[[0, 0, 3]], 1.0);
    assert_abs_diff_eq!(scores[[0, 1, 3]], 0.0);
    assert_eq!(model.into_inner().calls.get(), 2);
  }

  #[test]
  fn disabled_flip_passes_through() {
    let image = RgbImage::new(2, 1);
    let config = ParsingConfig::new(DatasetVariant::Cihp).with_flip(false);
    let model = FlipAveraged::new(SideModel { calls: Cell::new(0) }, &config);
    let scores = model.infer(&request(&image)).unwrap();
    assert_abs_diff_eq!(scores[[0, 1, 15]], 1.0);
    assert_eq!(model.into_inner().calls.get(), 1);
  }
}
