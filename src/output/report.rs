// 该文件是 Yunshang （云裳） 项目的一部分。
// src/output/report.rs - 置信度报告与结果登记
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
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

use tracing::{debug, info};

use crate::{confidence::InstanceConfidence, output::OutputError};

/// 每个实例一行 `"<类别> <置信度>"`
pub fn write_confidence_report(
  path: impl AsRef<Path>,
  confidences: &[InstanceConfidence],
) -> Result<(), OutputError> {
  let path = path.as_ref();
  let file = File::create(path).map_err(OutputError::io(path))?;
  let mut writer = BufWriter::new(file);
  for item in confidences {
    writeln!(writer, "{} {:?}", item.category, item.confidence).map_err(OutputError::io(path))?;
  }
  writer.flush().map_err(OutputError::io(path))?;
  debug!("写入置信度报告: {} ({} 行)", path.display(), confidences.len());
  Ok(())
}

/// 整次运行共用的结果登记文件，以追加方式打开一次
#[derive(Debug)]
pub struct Registry {
  path: PathBuf,
  writer: Mutex<BufWriter<File>>,
}

impl Registry {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, OutputError> {
    let path = path.into();
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .map_err(OutputError::io(&path))?;
    info!("结果登记文件: {}", path.display());
    Ok(Self {
      path,
      writer: Mutex::new(BufWriter::new(file)),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 追加一行 `"<图像名> <名次> <检测分数> ..."` 并立即刷新
  pub fn append(&self, name: &str, ranked: &[(usize, f32)]) -> Result<(), OutputError> {
    let mut line = name.to_string();
    for (rank, score) in ranked {
      line.push_str(&format!(" {} {:?}", rank, score));
    }

    let mut writer = self.writer.lock().map_err(|_| OutputError::RegistryPoisoned)?;
    writeln!(writer, "{}", line).map_err(OutputError::io(&self.path))?;
    writer.flush().map_err(OutputError::io(&self.path))?;
    Ok(())
  }
}
