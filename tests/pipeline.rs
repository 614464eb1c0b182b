// 该文件是 Yunshang （云裳） 项目的一部分。
// tests/pipeline.rs - 端到端流程测试
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

use std::path::Path;

use approx::assert_abs_diff_eq;
use image::RgbImage;
use ndarray::{Array2, Array3, array, s};
use ndarray_npy::write_npy;
use url::Url;

use yunshang::{
  FromUrl,
  config::{DatasetVariant, ParsingConfig},
  input::{DatasetInput, DatasetLayout},
  model::{FlipAveraged, ModelWrapper},
  output::ResultPackager,
  task::{BatchSummary, BatchTask, ModelRole, ParsingPipeline, Task},
};

fn constant_dump(path: &Path, height: usize, width: usize, channel: usize, value: f32) {
  let mut scores = Array3::<f32>::zeros((height, width, 3));
  scores.slice_mut(s![.., .., channel]).fill(value);
  write_npy(path, &scores).unwrap();
}

/// 一张 4x4 图像，两个人分别占左半边和右上 3 行
fn write_dataset(root: &Path) -> DatasetLayout {
  for dir in ["images", "boxes", "masks", "mrcnn", "global"] {
    std::fs::create_dir_all(root.join(dir)).unwrap();
  }

  RgbImage::new(4, 4).save(root.join("images/0001.png")).unwrap();
  RgbImage::new(4, 4).save(root.join("images/0002.png")).unwrap();
  std::fs::write(root.join("list.txt"), "0001\n\n0002\n").unwrap();

  let boxes: Array2<f32> = array![[0.0, 0.0, 2.0, 4.0, 0.9], [2.0, 0.0, 4.0, 4.0, 0.6]];
  write_npy(root.join("boxes/0001.npy"), &boxes).unwrap();
  write_npy(root.join("boxes/0002.npy"), &boxes).unwrap();

  let mut masks = Array3::<u8>::zeros((4, 4, 2));
  masks.slice_mut(s![.., 0..2, 0]).fill(1);
  masks.slice_mut(s![0..3, 2..4, 1]).fill(1);
  write_npy(root.join("masks/0001.npy"), &masks).unwrap();
  // 0002 没有掩码文件

  for suffix in ["", "_flip"] {
    constant_dump(&root.join(format!("mrcnn/0001_0{}.npy", suffix)), 4, 2, 1, 0.8);
    constant_dump(&root.join(format!("mrcnn/0001_1{}.npy", suffix)), 4, 2, 2, 0.6);
    constant_dump(&root.join(format!("global/0001{}.npy", suffix)), 4, 4, 0, 0.1);
  }

  DatasetLayout {
    image_dir: root.join("images"),
    image_ext: ".png".to_string(),
    box_dir: root.join("boxes"),
    mask_dir: root.join("masks"),
  }
}

fn model(dir: &Path, config: &ParsingConfig) -> FlipAveraged<ModelWrapper> {
  let url = Url::parse(&format!("npy://{}", dir.display())).unwrap();
  FlipAveraged::new(ModelWrapper::from_url(&url).unwrap(), config)
}

#[test]
fn fuses_patches_and_whole_image_into_artifacts() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path();
  let layout = write_dataset(root);

  let config = ParsingConfig::new(DatasetVariant::Cihp).with_num_classes(Some(3));
  let pipeline = ParsingPipeline::new(config.clone())
    .with_model(ModelRole::Global, model(&root.join("global"), &config))
    .with_model(ModelRole::Mrcnn, model(&root.join("mrcnn"), &config));
  assert_eq!(pipeline.run_name(), "CIHP-MRCNN-whole");

  let run_dir = root.join("outputs").join(pipeline.run_name());
  let input = DatasetInput::open(layout, &root.join("list.txt")).unwrap();
  let output = ResultPackager::create(&run_dir).unwrap();
  let summary = BatchTask::default().run_task(input, &pipeline, output).unwrap();

  assert_eq!(
    summary,
    BatchSummary {
      processed: 1,
      failed: 1,
      interrupted: false,
    }
  );

  // 左半边面积 8 排第一，右侧面积 6 排第二
  let registry = std::fs::read_to_string(run_dir.join("results.txt")).unwrap();
  assert_eq!(registry, "0001 1 0.9 2 0.6\n");

  let report = std::fs::read_to_string(run_dir.join("instance_parsing/0001.txt")).unwrap();
  let lines: Vec<(u8, f64)> = report
    .lines()
    .map(|line| {
      let (category, confidence) = line.split_once(' ').unwrap();
      (category.parse().unwrap(), confidence.parse().unwrap())
    })
    .collect();
  assert_eq!(lines.len(), 2);
  assert_eq!(lines[0].0, 1);
  assert_abs_diff_eq!(lines[0].1, 0.8, epsilon = 1e-6);
  assert_eq!(lines[1].0, 2);
  assert_abs_diff_eq!(lines[1].1, 0.6, epsilon = 1e-6);

  let global = image::open(run_dir.join("global_parsing/0001.png")).unwrap().to_rgb8();
  assert_eq!(global.get_pixel(0, 0).0, [128, 0, 0]);
  assert_eq!(global.get_pixel(3, 0).0, [0, 128, 0]);

  let instances = image::open(run_dir.join("instance_parsing/0001.png")).unwrap().to_rgb8();
  assert_eq!(instances.get_pixel(1, 3).0, [128, 0, 0]);
  assert_eq!(instances.get_pixel(2, 0).0, [0, 128, 0]);
  assert_eq!(instances.get_pixel(3, 3).0, [0, 0, 0]);

  let tags = image::open(run_dir.join("global_tag/0001.png")).unwrap().to_rgb8();
  assert_eq!(tags.get_pixel(0, 0).0, [128, 0, 0]);
  assert_eq!(tags.get_pixel(3, 2).0, [0, 128, 0]);
  assert_eq!(tags.get_pixel(3, 3).0, [0, 0, 0]);

  assert!(!run_dir.join("global_parsing/0002.png").exists());
}

#[test]
fn registry_is_appended_across_runs() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path();
  let layout = write_dataset(root);

  let config = ParsingConfig::new(DatasetVariant::Cihp)
    .with_num_classes(Some(3))
    .with_flip(false);
  let pipeline =
    ParsingPipeline::new(config.clone()).with_model(ModelRole::Mrcnn, model(&root.join("mrcnn"), &config));
  let run_dir = root.join("outputs").join(pipeline.run_name());

  for _ in 0..2 {
    let input = DatasetInput::with_names(layout.clone(), vec!["0001".to_string()]);
    let output = ResultPackager::create(&run_dir).unwrap();
    let summary = BatchTask::default().run_task(input, &pipeline, output).unwrap();
    assert_eq!(summary.processed, 1);
  }

  let registry = std::fs::read_to_string(run_dir.join("results.txt")).unwrap();
  assert_eq!(registry, "0001 1 0.9 2 0.6\n0001 1 0.9 2 0.6\n");
}
