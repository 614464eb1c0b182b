// 该文件是 Yunshang （云裳） 项目的一部分。
// src/bin/fuse_parsing.rs - 多模型人体解析融合
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use url::Url;

use yunshang::{
  FromUrl,
  config::{DatasetVariant, ParsingConfig},
  input::{DatasetInput, DatasetLayout},
  model::{FlipAveraged, ModelWrapper},
  output::ResultPackager,
  task::{BatchTask, ModelRole, ParsingPipeline, Task},
};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Variant {
  /// CIHP，20 类
  Cihp,
  /// MHPv2，59 类
  Mhp,
}

impl From<Variant> for DatasetVariant {
  fn from(variant: Variant) -> Self {
    match variant {
      Variant::Cihp => DatasetVariant::Cihp,
      Variant::Mhp => DatasetVariant::Mhp,
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
  Mrcnn,
  Gt,
  Global,
}

impl From<Role> for ModelRole {
  fn from(role: Role) -> Self {
    match role {
      Role::Mrcnn => ModelRole::Mrcnn,
      Role::Gt => ModelRole::Gt,
      Role::Global => ModelRole::Global,
    }
  }
}

/// Yunshang 人体解析融合参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像目录
  #[arg(long, value_name = "DIR")]
  image_dir: PathBuf,
  /// 图像列表文件，每行一个图像名
  #[arg(long, value_name = "FILE")]
  image_list: PathBuf,
  /// 图像扩展名
  #[arg(long, default_value = ".jpg", value_name = "EXT")]
  image_ext: String,
  /// 检测框目录，每张图一个 (N, 5) 的 npy 文件
  #[arg(long, value_name = "DIR")]
  box_dir: PathBuf,
  /// 人体掩码目录，每张图一个 (H, W, N) 的 npy 文件
  #[arg(long, value_name = "DIR")]
  mask_dir: PathBuf,
  /// 子图模型（检测框）
  #[arg(long, value_name = "MODEL")]
  mrcnn_model: Option<Url>,
  /// 子图模型（标注框）
  #[arg(long, value_name = "MODEL")]
  gt_model: Option<Url>,
  /// 整图模型
  #[arg(long, value_name = "MODEL")]
  global_model: Option<Url>,
  /// 参与融合的模型
  #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Role::Mrcnn, Role::Gt, Role::Global])]
  models: Vec<Role>,
  /// 数据集
  #[arg(long, value_enum, default_value_t = Variant::Mhp)]
  variant: Variant,
  /// 覆盖数据集的类别数
  #[arg(long, value_name = "COUNT")]
  num_classes: Option<usize>,
  /// 关闭水平翻转平均
  #[arg(long)]
  no_flip: bool,
  /// 输出目录
  #[arg(long, default_value = "./outputs", value_name = "DIR")]
  output_dir: PathBuf,
  /// 最大处理图像数
  #[arg(long, value_name = "COUNT")]
  max_images: Option<usize>,
}

impl Args {
  fn model_url(&self, role: Role) -> Option<&Url> {
    match role {
      Role::Mrcnn => self.mrcnn_model.as_ref(),
      Role::Gt => self.gt_model.as_ref(),
      Role::Global => self.global_model.as_ref(),
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let config = ParsingConfig::new(args.variant.into())
    .with_num_classes(args.num_classes)
    .with_flip(!args.no_flip);
  info!(
    "数据集: {:?}, 类别数: {}, 翻转平均: {}",
    config.variant, config.num_classes, config.flip
  );

  let mut pipeline = ParsingPipeline::new(config.clone());
  let mut roles = args.models.clone();
  roles.sort();
  roles.dedup();
  for role in roles {
    let Some(url) = args.model_url(role) else {
      bail!("模型 {:?} 未指定地址", role);
    };
    info!("模型 {:?}: {}", role, url);
    let model = ModelWrapper::from_url(url)?;
    pipeline = pipeline.with_model(role.into(), FlipAveraged::new(model, &config));
  }
  if pipeline.roles().next().is_none() {
    bail!("没有选择任何模型");
  }

  let layout = DatasetLayout {
    image_dir: args.image_dir.clone(),
    image_ext: args.image_ext.clone(),
    box_dir: args.box_dir.clone(),
    mask_dir: args.mask_dir.clone(),
  };
  let input = DatasetInput::open(layout, &args.image_list)?;

  let run_dir = args.output_dir.join(pipeline.run_name());
  let output = ResultPackager::create(&run_dir)?;

  let summary = BatchTask::default()
    .with_max_images(args.max_images)
    .with_interrupt(true)
    .run_task(input, &pipeline, output)?;

  info!(
    "处理完成: 成功 {} 张, 失败 {} 张, 输出目录 {}",
    summary.processed,
    summary.failed,
    run_dir.display()
  );
  if summary.interrupted {
    warn!("任务被中断");
  }

  Ok(())
}
