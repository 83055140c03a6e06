// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/app.rs - 应用状态与操作命令
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

use std::{ops::ControlFlow, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  acquisition::{AcquisitionLoop, LoopState, TickOutcome},
  camera::CameraSource,
  config::AppConfig,
  detector::{DefectDetector, DetectionOutcome},
  error::Fault,
  output::{Surface, fit_to_viewport, snapshot::SnapshotWriter},
  session::SessionSettings,
};

/// 检测标签的显示色调
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
  Neutral,
  /// 红色
  Alert,
  /// 绿色
  Clear,
  /// 黄色
  Degraded,
}

/// 界面上显示的文本与控件状态
#[derive(Debug, Clone, PartialEq)]
pub struct Presenter {
  running: bool,
  detection_text: String,
  detection_tone: Tone,
  threshold: f32,
  status: String,
}

impl Presenter {
  pub fn new(threshold: f32) -> Self {
    Self {
      running: false,
      detection_text: "No defects detected".to_string(),
      detection_tone: Tone::Neutral,
      threshold,
      status: "Ready".to_string(),
    }
  }

  pub fn start_button_label(&self) -> &'static str {
    if self.running { "Stop Camera" } else { "Start Camera" }
  }

  pub fn camera_label(&self) -> &'static str {
    if self.running { "Camera: Running" } else { "Camera: Stopped" }
  }

  pub fn capture_enabled(&self) -> bool {
    self.running
  }

  pub fn detection_label(&self) -> &str {
    &self.detection_text
  }

  pub fn detection_tone(&self) -> Tone {
    self.detection_tone
  }

  pub fn threshold_label(&self) -> String {
    format!("Threshold: {:.2}", self.threshold)
  }

  pub fn status_message(&self) -> &str {
    &self.status
  }

  pub fn set_running(&mut self, running: bool) {
    self.running = running;
  }

  pub fn set_threshold(&mut self, threshold: f32) {
    self.threshold = threshold;
  }

  pub fn set_status(&mut self, status: impl Into<String>) {
    self.status = status.into();
  }

  pub fn show_outcome(&mut self, outcome: &DetectionOutcome) {
    let (text, tone) = if outcome.is_failure() {
      ("Detection error".to_string(), Tone::Degraded)
    } else if outcome.any_defect {
      (
        format!("Defects detected! Confidence: {:.2}", outcome.max_confidence),
        Tone::Alert,
      )
    } else {
      ("No defects detected".to_string(), Tone::Clear)
    };
    self.detection_text = text;
    self.detection_tone = tone;
  }

  /// 单行摘要，用于日志
  pub fn summary(&self) -> String {
    format!(
      "[{}] {} | {} | {} | {}",
      self.start_button_label(),
      self.camera_label(),
      self.detection_text,
      self.threshold_label(),
      self.status
    )
  }

  /// 叠加在画面上的多行文本
  pub fn overlay_text(&self) -> String {
    format!(
      "{}\n{}\n{}\n{}",
      self.camera_label(),
      self.detection_text,
      self.threshold_label(),
      self.status
    )
  }
}

/// 操作员命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
  Toggle,
  Start,
  Stop,
  Capture,
  Threshold(f32),
  Detect(bool),
  Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandParseError {
  #[error("空命令")]
  Empty,
  #[error("未知命令: {0}")]
  Unknown(String),
  #[error("命令 {0} 缺少参数")]
  MissingArgument(&'static str),
  #[error("无效参数: {0}")]
  InvalidArgument(String),
}

impl FromStr for Command {
  type Err = CommandParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut parts = s.split_whitespace();
    let name = parts.next().ok_or(CommandParseError::Empty)?;

    match name.to_ascii_lowercase().as_str() {
      "toggle" | "t" => Ok(Command::Toggle),
      "start" => Ok(Command::Start),
      "stop" => Ok(Command::Stop),
      "capture" | "c" => Ok(Command::Capture),
      "threshold" | "th" => {
        let value = parts
          .next()
          .ok_or(CommandParseError::MissingArgument("threshold"))?;
        value
          .parse::<f32>()
          .map(Command::Threshold)
          .map_err(|_| CommandParseError::InvalidArgument(value.to_string()))
      }
      "detect" => {
        let value = parts
          .next()
          .ok_or(CommandParseError::MissingArgument("detect"))?;
        match value.to_ascii_lowercase().as_str() {
          "on" | "true" | "1" => Ok(Command::Detect(true)),
          "off" | "false" | "0" => Ok(Command::Detect(false)),
          other => Err(CommandParseError::InvalidArgument(other.to_string())),
        }
      }
      "quit" | "exit" | "q" => Ok(Command::Quit),
      other => Err(CommandParseError::Unknown(other.to_string())),
    }
  }
}

/// 应用主体：持有采集循环、会话设置与显示面
pub struct Application<S: CameraSource, D: DefectDetector, F: Surface> {
  acquisition: AcquisitionLoop<S, D>,
  settings: SessionSettings,
  presenter: Presenter,
  surface: F,
  snapshots: SnapshotWriter,
}

impl<S: CameraSource, D: DefectDetector, F: Surface> Application<S, D, F> {
  pub fn new(config: &AppConfig, source: S, detector: Option<D>, surface: F) -> Self {
    let settings = SessionSettings::from_config(config);
    let presenter = Presenter::new(settings.threshold());
    if detector.is_none() {
      info!("未加载模型，检测关闭");
    }

    Self {
      acquisition: AcquisitionLoop::new(source, config.camera.clone(), detector),
      settings,
      presenter,
      surface,
      snapshots: SnapshotWriter::default(),
    }
  }

  pub fn with_snapshot_writer(mut self, snapshots: SnapshotWriter) -> Self {
    self.snapshots = snapshots;
    self
  }

  pub fn presenter(&self) -> &Presenter {
    &self.presenter
  }

  pub fn settings(&self) -> &SessionSettings {
    &self.settings
  }

  pub fn settings_mut(&mut self) -> &mut SessionSettings {
    &mut self.settings
  }

  pub fn surface(&self) -> &F {
    &self.surface
  }

  pub fn state(&self) -> LoopState {
    self.acquisition.state()
  }

  pub fn timer_active(&self) -> bool {
    self.acquisition.timer_active()
  }

  pub fn toggle_camera(&mut self) {
    if self.acquisition.timer_active() {
      self.stop_camera();
    } else {
      self.start_camera();
    }
  }

  pub fn start_camera(&mut self) {
    match self.acquisition.start() {
      Ok(()) => {
        self.presenter.set_running(true);
        self.presenter.set_status("Camera running");
      }
      Err(e) => {
        error!("启动摄像头失败: {}", e);
        self.presenter.set_running(false);
        self.presenter.set_status(format!("Error: {}", e));
      }
    }
  }

  pub fn stop_camera(&mut self) {
    self.acquisition.stop();
    self.presenter.set_running(false);
    self.presenter.set_status("Camera stopped");
  }

  /// 保存一帧未标注的画面；摄像头未运行时什么都不做
  pub fn capture_image(&mut self) -> Result<Option<PathBuf>, Fault> {
    let frame = match self.acquisition.capture_raw() {
      None => return Ok(None),
      Some(Ok(frame)) => frame,
      Some(Err(e)) => {
        warn!("抓拍取帧失败: {}", e);
        self.presenter.set_status(format!("Error capturing image: {}", e));
        return Err(Fault::FrameAcquisition(e));
      }
    };

    match self.snapshots.save(&frame, self.settings.save_directory()) {
      Ok(path) => {
        self
          .presenter
          .set_status(format!("Image saved as {}", path.display()));
        Ok(Some(path))
      }
      Err(e) => {
        warn!("保存抓拍失败: {}", e);
        self.presenter.set_status(format!("Error capturing image: {}", e));
        Err(Fault::Persistence(e))
      }
    }
  }

  /// 更新显示阈值，只影响会话设置与标签
  pub fn update_confidence(&mut self, value: f32) -> f32 {
    let threshold = self.settings.set_threshold(value);
    self.presenter.set_threshold(threshold);
    threshold
  }

  pub fn set_detection(&mut self, active: bool) {
    self.settings.set_detection_active(active);
    info!("检测已{}", if active { "开启" } else { "关闭" });
  }

  pub fn handle(&mut self, command: Command) -> ControlFlow<()> {
    info!("处理命令: {:?}", command);
    match command {
      Command::Toggle => self.toggle_camera(),
      Command::Start => self.start_camera(),
      Command::Stop => self.stop_camera(),
      Command::Capture => {
        if let Err(e) = self.capture_image() {
          warn!("抓拍失败: {}", e);
        }
      }
      Command::Threshold(value) => {
        self.update_confidence(value);
      }
      Command::Detect(active) => self.set_detection(active),
      Command::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
  }

  /// 执行一个周期并刷新显示面
  pub fn tick(&mut self) -> Result<(), F::Error> {
    match self.acquisition.tick(&self.settings) {
      TickOutcome::Idle => {}
      TickOutcome::Skipped(fault) => {
        self.presenter.set_status(format!("Error: {}", fault));
      }
      TickOutcome::Frame { frame, outcome } => {
        if let Some(outcome) = outcome {
          self.presenter.show_outcome(&outcome);
          if let Some(reason) = outcome.failure {
            warn!("{}", Fault::Inference(reason));
          }
        }
        let image = fit_to_viewport(&frame.to_rgb_image(), self.surface.viewport());
        self.surface.present(&image)?;
      }
    }

    self.surface.update_status(&self.presenter)
  }

  pub fn refresh_status(&mut self) -> Result<(), F::Error> {
    self.surface.update_status(&self.presenter)
  }

  pub fn shutdown(&mut self) {
    if self.acquisition.state() == LoopState::Running {
      self.stop_camera();
    }
    info!("应用退出");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_operator_commands() {
    assert_eq!("start".parse::<Command>(), Ok(Command::Start));
    assert_eq!(" Stop ".parse::<Command>(), Ok(Command::Stop));
    assert_eq!("threshold 0.7".parse::<Command>(), Ok(Command::Threshold(0.7)));
    assert_eq!("detect off".parse::<Command>(), Ok(Command::Detect(false)));
    assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
  }

  #[test]
  fn rejects_malformed_commands() {
    assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
    assert_eq!(
      "threshold".parse::<Command>(),
      Err(CommandParseError::MissingArgument("threshold"))
    );
    assert_eq!(
      "threshold high".parse::<Command>(),
      Err(CommandParseError::InvalidArgument("high".to_string()))
    );
    assert!(matches!(
      "zoom 2".parse::<Command>(),
      Err(CommandParseError::Unknown(_))
    ));
  }

  #[test]
  fn presenter_labels_follow_outcome() {
    let mut presenter = Presenter::new(0.85);
    assert_eq!(presenter.threshold_label(), "Threshold: 0.85");
    assert_eq!(presenter.start_button_label(), "Start Camera");
    assert!(!presenter.capture_enabled());

    presenter.show_outcome(&DetectionOutcome {
      any_defect: true,
      max_confidence: 0.9,
      detections: vec![],
      failure: None,
    });
    assert_eq!(
      presenter.detection_label(),
      "Defects detected! Confidence: 0.90"
    );
    assert_eq!(presenter.detection_tone(), Tone::Alert);

    presenter.show_outcome(&DetectionOutcome::failed("boom"));
    assert_eq!(presenter.detection_label(), "Detection error");
    assert_eq!(presenter.detection_tone(), Tone::Degraded);

    presenter.show_outcome(&DetectionOutcome::empty());
    assert_eq!(presenter.detection_label(), "No defects detected");
    assert_eq!(presenter.detection_tone(), Tone::Clear);

    presenter.set_running(true);
    assert_eq!(presenter.camera_label(), "Camera: Running");
    assert_eq!(presenter.start_button_label(), "Stop Camera");
  }
}
