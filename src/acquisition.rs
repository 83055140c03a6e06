// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/acquisition.rs - 采集循环
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

use tracing::{debug, info, warn};

use crate::{
  camera::{Camera, CameraError, CameraSource},
  config::CameraConfig,
  detector::{DefectDetector, DetectionOutcome},
  error::Fault,
  frame::Frame,
  session::SessionSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
  Stopped,
  Running,
}

/// 单个周期的结果
#[derive(Debug)]
pub enum TickOutcome {
  /// 定时器未激活
  Idle,
  /// 本周期被跳过，状态不变
  Skipped(Fault),
  /// 取得一帧；检测关闭时 `outcome` 为 `None`
  Frame {
    frame: Frame,
    outcome: Option<DetectionOutcome>,
  },
}

/// 定时驱动的单线程采集循环
///
/// 摄像头只在 `Running` 状态下持有，停止时关闭并释放。
pub struct AcquisitionLoop<S: CameraSource, D: DefectDetector> {
  source: S,
  config: CameraConfig,
  camera: Option<S::Camera>,
  detector: Option<D>,
  timer_active: bool,
  frame_index: u64,
}

impl<S: CameraSource, D: DefectDetector> AcquisitionLoop<S, D> {
  pub fn new(source: S, config: CameraConfig, detector: Option<D>) -> Self {
    Self {
      source,
      config,
      camera: None,
      detector,
      timer_active: false,
      frame_index: 0,
    }
  }

  pub fn state(&self) -> LoopState {
    if self.camera.is_some() {
      LoopState::Running
    } else {
      LoopState::Stopped
    }
  }

  pub fn timer_active(&self) -> bool {
    self.timer_active
  }

  pub fn has_detector(&self) -> bool {
    self.detector.is_some()
  }

  pub fn frame_index(&self) -> u64 {
    self.frame_index
  }

  /// 打开、配置并启动摄像头，成功后激活定时器
  pub fn start(&mut self) -> Result<(), Fault> {
    if self.camera.is_some() {
      debug!("摄像头已在运行");
      return Ok(());
    }

    let mut camera = self.source.open().map_err(Fault::CameraUnavailable)?;
    let started = camera
      .configure(&self.config)
      .and_then(|_| camera.start());
    if let Err(e) = started {
      warn!("摄像头启动失败: {}", e);
      if let Err(e) = camera.close() {
        warn!("关闭摄像头失败: {}", e);
      }
      return Err(Fault::CameraUnavailable(e));
    }

    self.camera = Some(camera);
    self.timer_active = true;
    info!(
      "摄像头已启动: {}x{} @ {} fps",
      self.config.resolution.0, self.config.resolution.1, self.config.frame_rate
    );
    Ok(())
  }

  /// 停止定时器并关闭摄像头，重复调用无副作用
  pub fn stop(&mut self) {
    self.timer_active = false;
    let Some(mut camera) = self.camera.take() else {
      return;
    };

    if let Err(e) = camera.stop() {
      warn!("停止摄像头失败: {}", e);
    }
    if let Err(e) = camera.close() {
      warn!("关闭摄像头失败: {}", e);
    }
    info!("摄像头已停止");
  }

  /// 执行一个采集周期
  pub fn tick(&mut self, settings: &SessionSettings) -> TickOutcome {
    if !self.timer_active {
      return TickOutcome::Idle;
    }
    let Some(camera) = self.camera.as_mut() else {
      return TickOutcome::Idle;
    };

    let frame = match camera.capture_frame() {
      Ok(frame) => frame,
      Err(e) => {
        warn!("取帧失败，跳过本周期: {}", e);
        return TickOutcome::Skipped(Fault::FrameAcquisition(e));
      }
    };
    self.frame_index = self.frame_index.wrapping_add(1);

    let detector = match &self.detector {
      Some(detector) if settings.detection_active() => detector,
      _ => {
        return TickOutcome::Frame {
          frame,
          outcome: None,
        };
      }
    };

    let outcome = detector.detect(&frame);
    if outcome.is_failure() {
      // 保留原始画面
      return TickOutcome::Frame {
        frame,
        outcome: Some(outcome),
      };
    }

    debug!(
      "第 {} 帧: {} 个检测结果",
      self.frame_index,
      outcome.detections.len()
    );
    let frame = detector.annotate(frame, &outcome.detections);
    TickOutcome::Frame {
      frame,
      outcome: Some(outcome),
    }
  }

  /// 从运行中的摄像头取一帧未标注的画面；未启动时返回 `None`
  pub fn capture_raw(&mut self) -> Option<Result<Frame, CameraError>> {
    self.camera.as_mut().map(|camera| camera.capture_frame())
  }
}

impl<S: CameraSource, D: DefectDetector> Drop for AcquisitionLoop<S, D> {
  fn drop(&mut self) {
    self.stop();
  }
}
