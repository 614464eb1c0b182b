// 该文件是 Yunshang （云裳） 项目的一部分。
// src/output/packager.rs - 单张图像的结果打包
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ndarray::{Array2, Zip};
use tracing::{debug, info, warn};

use crate::{
  aggregate::BoundingBox,
  confidence,
  input::ImageRecord,
  instance::{self, InstanceMasks},
  output::{
    OutputError, Registry, Render,
    palette::{PALETTE_SIZE, palette},
    save_indexed_png, write_confidence_report,
  },
  refine::{NoopRefiner, Refiner},
  score::ScoreMap,
};

const GLOBAL_PARSING_DIR: &str = "global_parsing";
const INSTANCE_PARSING_DIR: &str = "instance_parsing";
const GLOBAL_TAG_DIR: &str = "global_tag";
const REGISTRY_FILE: &str = "results.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
  pub persons: usize,
  pub instances: usize,
  pub truncated: bool,
}

/// 把融合后的得分图转换为类别图、实例图、名次图以及文本结果
pub struct ResultPackager<R = NoopRefiner> {
  root: PathBuf,
  registry: Registry,
  refiner: R,
  palette: Vec<u8>,
}

impl ResultPackager<NoopRefiner> {
  /// 创建输出目录并打开登记文件
  pub fn create(root: impl Into<PathBuf>) -> Result<Self, OutputError> {
    let root = root.into();
    for dir in [GLOBAL_PARSING_DIR, INSTANCE_PARSING_DIR, GLOBAL_TAG_DIR] {
      let path = root.join(dir);
      std::fs::create_dir_all(&path).map_err(OutputError::io(&path))?;
    }
    let registry = Registry::open(root.join(REGISTRY_FILE))?;
    info!("输出目录: {}", root.display());

    Ok(Self {
      root,
      registry,
      refiner: NoopRefiner,
      palette: palette(PALETTE_SIZE),
    })
  }
}

impl<R: Refiner> ResultPackager<R> {
  pub fn with_refiner<T: Refiner>(self, refiner: T) -> ResultPackager<T> {
    ResultPackager {
      root: self.root,
      registry: self.registry,
      refiner,
      palette: self.palette,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn package(
    &self,
    name: &str,
    fused: &ScoreMap,
    size: (usize, usize),
    masks: &InstanceMasks,
    boxes: &[BoundingBox],
  ) -> Result<PackageSummary, OutputError> {
    let (height, width) = size;
    if boxes.len() > masks.num_persons() {
      return Err(OutputError::MaskCountMismatch {
        boxes: boxes.len(),
        masks: masks.num_persons(),
      });
    }

    let scores = fused.resize(height, width);
    let categories = scores.category_map()?;
    let assignment = instance::assign(&categories, masks)?;
    if assignment.truncated {
      warn!("{}: 实例数超过上限，已截断", name);
    }

    let instances = self
      .refiner
      .refine(assignment.instances, masks, &categories, &assignment.classes);
    let confidences = confidence::score(&scores, &assignment.classes, &instances);

    let order = rank_by_area(masks, boxes.len())?;
    let tags = tag_map(masks, &order);
    let ranked: Vec<(usize, f32)> = order
      .iter()
      .enumerate()
      .map(|(rank, &person)| (rank + 1, boxes[person].score))
      .collect();

    write_confidence_report(self.path(INSTANCE_PARSING_DIR, name, "txt"), &confidences)?;
    save_indexed_png(self.path(GLOBAL_PARSING_DIR, name, "png"), &categories, &self.palette)?;
    save_indexed_png(self.path(INSTANCE_PARSING_DIR, name, "png"), &instances, &self.palette)?;
    save_indexed_png(self.path(GLOBAL_TAG_DIR, name, "png"), &tags, &self.palette)?;

    // 所有文件写完后才登记
    self.registry.append(name, &ranked)?;

    debug!(
      "{}: {} 人, {} 个实例, 尺寸 {}x{}",
      name,
      boxes.len(),
      confidences.len(),
      width,
      height
    );
    Ok(PackageSummary {
      persons: boxes.len(),
      instances: confidences.len(),
      truncated: assignment.truncated,
    })
  }

  fn path(&self, dir: &str, name: &str, ext: &str) -> PathBuf {
    self.root.join(dir).join(format!("{}.{}", name, ext))
  }
}

impl<R: Refiner> Render<ImageRecord, ScoreMap> for ResultPackager<R> {
  type Error = OutputError;
  type Summary = PackageSummary;

  fn render_result(&self, frame: &ImageRecord, result: &ScoreMap) -> Result<Self::Summary, Self::Error> {
    self.package(&frame.name, result, frame.size(), &frame.masks, &frame.boxes)
  }
}

/// 前 `count` 个人按掩码面积降序排列，面积相同时保持原顺序
pub fn rank_by_area(masks: &InstanceMasks, count: usize) -> Result<Vec<usize>, OutputError> {
  if count > masks.num_persons() {
    return Err(OutputError::MaskCountMismatch {
      boxes: count,
      masks: masks.num_persons(),
    });
  }
  let areas: Vec<usize> = (0..count).map(|person| masks.area(person)).collect();
  let mut order: Vec<usize> = (0..count).collect();
  order.sort_by(|&a, &b| areas[b].cmp(&areas[a]));
  Ok(order)
}

/// 每个人的掩码像素写入其名次（从 1 开始），重叠处以靠后的名次为准
pub fn tag_map(masks: &InstanceMasks, order: &[usize]) -> Array2<u8> {
  let mut tags = Array2::<u8>::zeros((masks.height(), masks.width()));
  for (rank, &person) in order.iter().enumerate() {
    let tag = (rank + 1).min(u8::MAX as usize) as u8;
    Zip::from(&mut tags)
      .and(&masks.plane(person))
      .for_each(|t, &m| {
        if m > 0 {
          *t = tag;
        }
      });
  }
  tags
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    instance::{ClassMap, InstanceMap},
    score::CategoryMap,
  };
  use ndarray::{Array3, s};

  /// 三个人的面积分别为 10、50、30
  fn three_persons() -> InstanceMasks {
    let mut masks = Array3::<u8>::zeros((10, 10, 3));
    masks.slice_mut(s![0..1, .., 0]).fill(1);
    masks.slice_mut(s![5..10, .., 1]).fill(1);
    masks.slice_mut(s![2..5, .., 2]).fill(1);
    InstanceMasks::from(masks)
  }

  fn boxes() -> Vec<BoundingBox> {
    vec![
      BoundingBox::new([0.0, 0.0, 10.0, 1.0], 0.9),
      BoundingBox::new([0.0, 5.0, 10.0, 10.0], 0.8),
      BoundingBox::new([0.0, 2.0, 10.0, 5.0], 0.7),
    ]
  }

  #[test]
  fn ranks_by_area_descending() {
    let masks = three_persons();
    assert_eq!(rank_by_area(&masks, 3).unwrap(), vec![1, 2, 0]);

    let tags = tag_map(&masks, &[1, 2, 0]);
    assert_eq!(tags[[0, 0]], 3);
    assert_eq!(tags[[1, 0]], 0);
    assert_eq!(tags[[3, 4]], 2);
    assert_eq!(tags[[7, 9]], 1);
  }

  #[test]
  fn equal_areas_keep_detection_order() {
    let masks = InstanceMasks::from(Array3::<u8>::ones((2, 2, 3)));
    assert_eq!(rank_by_area(&masks, 3).unwrap(), vec![0, 1, 2]);
    // 重叠处保留最后写入的名次
    assert_eq!(tag_map(&masks, &[0, 1, 2])[[0, 0]], 3);
  }

  #[test]
  fn too_many_boxes_is_error() {
    let masks = three_persons();
    assert!(matches!(
      rank_by_area(&masks, 4),
      Err(OutputError::MaskCountMismatch { boxes: 4, masks: 3 })
    ));
  }

  #[test]
  fn package_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let packager = ResultPackager::create(dir.path()).unwrap();

    // 通道 1 覆盖上半部分，通道 2 覆盖下半部分
    let mut scores = Array3::<f32>::zeros((10, 10, 3));
    scores.slice_mut(s![0..5, .., 1]).fill(0.6);
    scores.slice_mut(s![5..10, .., 2]).fill(0.8);
    let fused = ScoreMap::from(scores);

    let summary = packager
      .package("0001", &fused, (10, 10), &three_persons(), &boxes())
      .unwrap();
    assert_eq!(
      summary,
      PackageSummary {
        persons: 3,
        instances: 3,
        truncated: false,
      }
    );

    let registry = std::fs::read_to_string(dir.path().join("results.txt")).unwrap();
    assert_eq!(registry, "0001 1 0.8 2 0.7 3 0.9\n");

    let report = std::fs::read_to_string(dir.path().join("instance_parsing/0001.txt")).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
      let (category, confidence) = line.split_once(' ').unwrap();
      let expected = if category == "1" { 0.6 } else { 0.8 };
      approx::assert_abs_diff_eq!(confidence.parse::<f64>().unwrap(), expected, epsilon = 1e-6);
    }

    for dir_name in [GLOBAL_PARSING_DIR, INSTANCE_PARSING_DIR, GLOBAL_TAG_DIR] {
      let image = image::open(dir.path().join(dir_name).join("0001.png")).unwrap();
      assert_eq!((image.width(), image.height()), (10, 10));
    }
  }

  #[test]
  fn failed_image_is_not_registered() {
    let dir = tempfile::tempdir().unwrap();
    let packager = ResultPackager::create(dir.path()).unwrap();
    std::fs::remove_dir(dir.path().join(GLOBAL_TAG_DIR)).unwrap();

    let fused = ScoreMap::from(Array3::<f32>::from_elem((4, 4, 3), 0.5));
    let masks = InstanceMasks::from(Array3::<u8>::ones((4, 4, 1)));
    let boxes = [BoundingBox::new([0.0, 0.0, 4.0, 4.0], 0.5)];
    assert!(matches!(
      packager.package("x", &fused, (4, 4), &masks, &boxes),
      Err(OutputError::IoError { .. })
    ));

    let registry = std::fs::read_to_string(dir.path().join(REGISTRY_FILE)).unwrap();
    assert!(registry.is_empty());
  }

  #[test]
  fn refiner_output_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let clear = |instances: InstanceMap, _: &InstanceMasks, _: &CategoryMap, _: &ClassMap| {
      instances.mapv(|_| 0u8)
    };
    let packager = ResultPackager::create(dir.path()).unwrap().with_refiner(clear);

    let fused = ScoreMap::from(Array3::<f32>::from_elem((4, 4, 3), 0.5));
    let masks = InstanceMasks::from(Array3::<u8>::ones((4, 4, 1)));
    let boxes = [BoundingBox::new([0.0, 0.0, 4.0, 4.0], 0.5)];
    let summary = packager.package("clear", &fused, (4, 4), &masks, &boxes).unwrap();
    assert_eq!(summary.instances, 0);

    let report = std::fs::read_to_string(packager.root().join("instance_parsing/clear.txt")).unwrap();
    assert!(report.is_empty());
  }
}
