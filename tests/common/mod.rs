// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// tests/common/mod.rs - 测试用的摄像头与模型替身
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

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use capcheck::{
  camera::{Camera, CameraError, CameraSource},
  config::{AppConfig, CameraConfig},
  frame::Frame,
  model::{DefectLabel, DetectItem, DetectResult, Model},
};
use image::{Rgb, RgbImage};
use url::Url;

/// 摄像头调用记录
#[derive(Debug, Default)]
pub struct CameraLog {
  pub opens: usize,
  pub configures: usize,
  pub starts: usize,
  pub captures: usize,
  pub stops: usize,
  pub closes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
  None,
  Open,
  Start,
  Capture,
}

pub struct ScriptedCamera {
  frame: Frame,
  failure: Failure,
  running: bool,
  log: Rc<RefCell<CameraLog>>,
}

impl Camera for ScriptedCamera {
  fn configure(&mut self, _config: &CameraConfig) -> Result<(), CameraError> {
    self.log.borrow_mut().configures += 1;
    Ok(())
  }

  fn start(&mut self) -> Result<(), CameraError> {
    self.log.borrow_mut().starts += 1;
    if self.failure == Failure::Start {
      return Err(CameraError::Unsupported("sensor busy".to_string()));
    }
    self.running = true;
    Ok(())
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    self.log.borrow_mut().captures += 1;
    if !self.running {
      return Err(CameraError::NotStarted);
    }
    if self.failure == Failure::Capture {
      return Err(CameraError::Unsupported("dropped frame".to_string()));
    }
    Ok(self.frame.clone())
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    self.log.borrow_mut().stops += 1;
    self.running = false;
    Ok(())
  }

  fn close(&mut self) -> Result<(), CameraError> {
    self.log.borrow_mut().closes += 1;
    Ok(())
  }
}

/// 每次打开都返回同一帧画面的摄像头来源
pub struct ScriptedSource {
  frame: Frame,
  failure: Failure,
  pub log: Rc<RefCell<CameraLog>>,
}

impl ScriptedSource {
  pub fn new(frame: Frame) -> Self {
    Self {
      frame,
      failure: Failure::None,
      log: Rc::default(),
    }
  }

  pub fn failing(frame: Frame, failure: Failure) -> Self {
    Self {
      failure,
      ..Self::new(frame)
    }
  }
}

impl CameraSource for ScriptedSource {
  type Camera = ScriptedCamera;

  fn open(&self) -> Result<Self::Camera, CameraError> {
    self.log.borrow_mut().opens += 1;
    if self.failure == Failure::Open {
      return Err(CameraError::Unsupported("no camera attached".to_string()));
    }
    Ok(ScriptedCamera {
      frame: self.frame.clone(),
      failure: self.failure,
      running: false,
      log: self.log.clone(),
    })
  }
}

/// 返回固定结果的模型
pub struct ScriptedModel {
  items: Vec<DetectItem<DefectLabel>>,
  error: Option<String>,
}

impl ScriptedModel {
  pub fn returning(items: Vec<DetectItem<DefectLabel>>) -> Self {
    Self { items, error: None }
  }

  pub fn single(score: f32, bbox: [f32; 4]) -> Self {
    Self::returning(vec![DetectItem {
      kind: DefectLabel::Hole,
      score,
      bbox,
    }])
  }

  pub fn failing(message: &str) -> Self {
    Self {
      items: vec![],
      error: Some(message.to_string()),
    }
  }
}

impl Model for ScriptedModel {
  type Input = Frame;
  type Output = DetectResult<DefectLabel>;
  type Error = String;

  fn infer(&self, _input: &Frame) -> Result<Self::Output, Self::Error> {
    match &self.error {
      Some(message) => Err(message.clone()),
      None => Ok(DetectResult::from(self.items.clone())),
    }
  }
}

/// 带有简单纹理的测试画面
pub fn pattern_frame(width: u32, height: u32) -> Frame {
  Frame::from(RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x * 3 % 200) as u8, (y * 5 % 200) as u8, 90])
  }))
}

pub fn test_config() -> AppConfig {
  AppConfig::new(Url::parse("mock://camera").unwrap())
}
