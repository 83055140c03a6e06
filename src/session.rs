// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/session.rs - 会话设置
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

use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// 运行期可变设置
///
/// 只由界面线程写入，采集循环在每个周期开始时读取一次。
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
  threshold: f32,
  save_directory: PathBuf,
  detection_active: bool,
}

impl SessionSettings {
  pub fn new(threshold: f32, save_directory: impl Into<PathBuf>) -> Self {
    Self {
      threshold: threshold.clamp(0.0, 1.0),
      save_directory: save_directory.into(),
      detection_active: true,
    }
  }

  pub fn from_config(config: &AppConfig) -> Self {
    Self::new(
      config.detection.display_threshold,
      config.presentation.save_directory.clone(),
    )
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 更新显示阈值，越界值被截断到 [0, 1]，返回实际生效的值
  pub fn set_threshold(&mut self, threshold: f32) -> f32 {
    self.threshold = if threshold.is_nan() {
      self.threshold
    } else {
      threshold.clamp(0.0, 1.0)
    };
    self.threshold
  }

  pub fn save_directory(&self) -> &Path {
    &self.save_directory
  }

  pub fn set_save_directory(&mut self, directory: impl Into<PathBuf>) {
    self.save_directory = directory.into();
  }

  pub fn detection_active(&self) -> bool {
    self.detection_active
  }

  pub fn set_detection_active(&mut self, active: bool) {
    self.detection_active = active;
  }
}
