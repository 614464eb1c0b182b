// 该文件是 Yunshang （云裳） 项目的一部分。
// src/task.rs - 逐图像解析流程与批处理任务
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

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use anyhow::{Context, bail};
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::{self, PatchSet},
  config::ParsingConfig,
  fusion,
  input::{ImageRecord, InputError},
  model::{InferRequest, ParsingModel, Region},
  output::Render,
  score::ScoreMap,
};

pub trait Task<I, P, O>: Sized {
  type Error;
  type Summary;
  fn run_task(self, input: I, pipeline: P, output: O) -> Result<Self::Summary, Self::Error>;
}

/// 参与融合的模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelRole {
  /// 以检测框子图为输入
  Mrcnn,
  /// 以检测框子图为输入
  Gt,
  /// 以整张图为输入
  Global,
}

impl ModelRole {
  pub const ALL: [ModelRole; 3] = [ModelRole::Mrcnn, ModelRole::Gt, ModelRole::Global];

  pub fn is_patch_based(&self) -> bool {
    !matches!(self, ModelRole::Global)
  }

  /// 输出目录名中使用的标记
  pub fn tag(&self) -> &'static str {
    match self {
      ModelRole::Mrcnn => "MRCNN",
      ModelRole::Gt => "gt",
      ModelRole::Global => "whole",
    }
  }
}

impl fmt::Display for ModelRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// 单张图像：各模型推理、子图聚合、多模型融合
pub struct ParsingPipeline<M> {
  config: ParsingConfig,
  models: Vec<(ModelRole, M)>,
}

impl<M> ParsingPipeline<M> {
  pub fn new(config: ParsingConfig) -> Self {
    Self {
      config,
      models: Vec::new(),
    }
  }

  pub fn with_model(mut self, role: ModelRole, model: M) -> Self {
    self.models.push((role, model));
    self.models.sort_by_key(|(role, _)| *role);
    self
  }

  pub fn config(&self) -> &ParsingConfig {
    &self.config
  }

  pub fn roles(&self) -> impl Iterator<Item = ModelRole> + '_ {
    self.models.iter().map(|(role, _)| *role)
  }

  /// 运行目录名，例如 `MHPv2-MRCNN-gt-whole`
  pub fn run_name(&self) -> String {
    let mut name = self.config.variant.prefix().to_string();
    for role in self.roles() {
      name.push('-');
      name.push_str(role.tag());
    }
    name
  }
}

impl<M> ParsingPipeline<M>
where
  M: ParsingModel,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn predict(&self, record: &ImageRecord) -> anyhow::Result<ScoreMap> {
    if self.models.is_empty() {
      bail!("没有可用的模型");
    }

    let size = record.size();
    let patches = PatchSet::crop_from(&record.image, &record.boxes);
    let mut maps = Vec::with_capacity(self.models.len());
    for (role, model) in &self.models {
      let now = Instant::now();
      let scores = if role.is_patch_based() {
        aggregate::aggregate(size, &patches, self.config.num_classes, |patch| {
          let request = InferRequest {
            image_name: &record.name,
            region: Region::Patch(patch.index),
            image: &patch.image,
            target_size: self.config.input_size,
            mirrored: false,
          };
          self.infer(*role, model, &request)
        })?
      } else {
        let request = InferRequest {
          image_name: &record.name,
          region: Region::Whole,
          image: &record.image,
          target_size: self.config.input_size,
          mirrored: false,
        };
        self.infer(*role, model, &request)?.resize(size.0, size.1)
      };
      debug!("{} [{}]: 完成，耗时 {:.2?}", record.name, role, now.elapsed());
      maps.push(scores);
    }

    let fused = fusion::fuse(&maps, self.config.fusion)?;
    Ok(fused)
  }

  fn infer(&self, role: ModelRole, model: &M, request: &InferRequest<'_>) -> anyhow::Result<ScoreMap> {
    let scores = model
      .infer(request)
      .with_context(|| format!("{} [{}] {:?} 推理失败", request.image_name, role, request.region))?;
    let channels = scores.dim().2;
    if channels != self.config.num_classes {
      bail!(
        "{} [{}]: 模型输出 {} 个通道，期望 {}",
        request.image_name,
        role,
        channels,
        self.config.num_classes
      );
    }
    Ok(ScoreMap::from(scores))
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
  pub processed: usize,
  pub failed: usize,
  pub interrupted: bool,
}

/// 逐张处理输入列表，单张失败只记录并跳过
#[derive(Default, Debug)]
pub struct BatchTask {
  max_images: Option<usize>,
  interruptible: bool,
}

impl BatchTask {
  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }

  /// 安装 Ctrl-C 处理函数，每个进程只能安装一次
  pub fn with_interrupt(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }

  fn install_handler(&self) -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    if self.interruptible {
      let flag = stop.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，处理完当前图像后退出...");
        flag.store(true, Ordering::SeqCst);
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })
      .context("无法安装 Ctrl-C 处理函数")?;
    }
    Ok(stop)
  }
}

impl<'a, I, M, O> Task<I, &'a ParsingPipeline<M>, O> for BatchTask
where
  I: Iterator<Item = Result<ImageRecord, InputError>>,
  M: ParsingModel,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<ImageRecord, ScoreMap>,
  O::Error: fmt::Display,
{
  type Error = anyhow::Error;
  type Summary = BatchSummary;

  fn run_task(self, input: I, pipeline: &'a ParsingPipeline<M>, output: O) -> Result<Self::Summary, Self::Error> {
    info!("开始任务...");
    let stop = self.install_handler()?;
    let mut summary = BatchSummary::default();

    for (index, record) in input.enumerate() {
      if self.max_images.is_some_and(|n| index >= n) {
        info!("达到指定图像数 {}, 退出任务循环", index);
        break;
      }
      if stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        summary.interrupted = true;
        break;
      }

      let record = match record {
        Ok(record) => record,
        Err(e) => {
          error!("读取第 {} 张图像失败: {}", index + 1, e);
          summary.failed += 1;
          continue;
        }
      };

      info!("处理第 {} 张图像: {}", index + 1, record.name);
      let now = Instant::now();
      let fused = match pipeline.predict(&record) {
        Ok(fused) => fused,
        Err(e) => {
          error!("{}: 推理失败: {:#}", record.name, e);
          summary.failed += 1;
          continue;
        }
      };
      let elapsed_a = now.elapsed();

      match output.render_result(&record, &fused) {
        Ok(_) => {
          summary.processed += 1;
          info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());
        }
        Err(e) => {
          error!("{}: 输出失败: {}", record.name, e);
          summary.failed += 1;
        }
      }
    }

    info!(
      "任务完成: 成功 {} 张, 失败 {} 张",
      summary.processed, summary.failed
    );
    Ok(summary)
  }
}
