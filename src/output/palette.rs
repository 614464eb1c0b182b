// 该文件是 Yunshang （云裳） 项目的一部分。
// src/output/palette.rs - 标签调色板
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

/// 索引 PNG 使用的条目数
pub const PALETTE_SIZE: usize = 256;

/// 生成 `num_classes` 个颜色的调色板，按 RGB 顺序平铺
///
/// 类别编号的二进制位按 3 位一组交错分配到 R、G、B 三个通道，
/// 从最高位开始依次填充，因此结果只与类别数有关。
pub fn palette(num_classes: usize) -> Vec<u8> {
  let mut palette = vec![0u8; num_classes * 3];
  for (j, color) in palette.chunks_exact_mut(3).enumerate() {
    let mut label = j;
    let mut i = 0;
    while label > 0 && i < 8 {
      for (channel, value) in color.iter_mut().enumerate() {
        *value |= (((label >> channel) & 1) << (7 - i)) as u8;
      }
      i += 1;
      label >>= 3;
    }
  }
  palette
}

#[cfg(test)]
mod tests {
  use super::*;

  fn color(palette: &[u8], index: usize) -> [u8; 3] {
    [palette[index * 3], palette[index * 3 + 1], palette[index * 3 + 2]]
  }

  #[test]
  fn known_colors() {
    let palette = palette(PALETTE_SIZE);
    assert_eq!(palette.len(), 768);
    assert_eq!(color(&palette, 0), [0, 0, 0]);
    assert_eq!(color(&palette, 1), [128, 0, 0]);
    assert_eq!(color(&palette, 2), [0, 128, 0]);
    assert_eq!(color(&palette, 3), [128, 128, 0]);
    assert_eq!(color(&palette, 4), [0, 0, 128]);
    assert_eq!(color(&palette, 7), [128, 128, 128]);
    assert_eq!(color(&palette, 8), [64, 0, 0]);
    assert_eq!(color(&palette, 255), [224, 224, 192]);
  }

  #[test]
  fn prefix_is_stable() {
    assert_eq!(palette(20), palette(PALETTE_SIZE)[..60].to_vec());
  }
}
