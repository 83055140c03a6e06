// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/error.rs - 运行期故障分类
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

use thiserror::Error;

use crate::{camera::CameraError, output::snapshot::SnapshotError};

/// 运行期故障，均在边界处转为状态栏消息，不会终止进程
#[derive(Error, Debug)]
pub enum Fault {
  /// 打开、配置或启动摄像头失败，启动被中止
  #[error("摄像头不可用: {0}")]
  CameraUnavailable(#[source] CameraError),
  /// 单个周期取帧失败
  #[error("取帧失败: {0}")]
  FrameAcquisition(#[source] CameraError),
  /// 单个周期推理失败
  #[error("推理失败: {0}")]
  Inference(String),
  /// 快照写入失败
  #[error("保存失败: {0}")]
  Persistence(#[from] SnapshotError),
}
