// 该文件是 Yunshang （云裳） 项目的一部分。
// src/output/label_image.rs - 保存索引调色板 PNG
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

use std::{fs::File, io::BufWriter, path::Path};

use ndarray::Array2;
use tracing::debug;

use crate::output::OutputError;

/// 将 (H, W) 标签图保存为 8 位索引 PNG
///
/// 像素值即调色板索引，`palette` 为平铺的 RGB 三元组。
pub fn save_indexed_png(
  path: impl AsRef<Path>,
  labels: &Array2<u8>,
  palette: &[u8],
) -> Result<(), OutputError> {
  let path = path.as_ref();
  let (height, width) = labels.dim();

  let file = File::create(path).map_err(OutputError::io(path))?;
  let png_error = |source| OutputError::PngError {
    path: path.to_path_buf(),
    source,
  };

  let mut encoder = png::Encoder::new(BufWriter::new(file), width as u32, height as u32);
  encoder.set_color(png::ColorType::Indexed);
  encoder.set_depth(png::BitDepth::Eight);
  encoder.set_palette(palette.to_vec());

  let mut writer = encoder.write_header().map_err(png_error)?;
  let data: Vec<u8> = labels.iter().copied().collect();
  writer.write_image_data(&data).map_err(png_error)?;
  writer.finish().map_err(png_error)?;

  debug!("保存标签图: {} ({}x{})", path.display(), width, height);
  Ok(())
}
