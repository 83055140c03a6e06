// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/detector.rs - 瓶盖缺陷检测器
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

use std::fmt::Display;

use ab_glyph::InvalidFont;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  config::DEFAULT_CUTOFF,
  frame::Frame,
  model::{DefectLabel, DetectItem, DetectResult, Model},
  output::draw::Draw,
};

/// 像素坐标系下的边界框，四个坐标都落在帧内
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl BoundingBox {
  /// 由归一化坐标换算，左上取下整，右下取上整，并截断到帧内
  pub fn from_normalized(bbox: &[f32; 4], width: u32, height: u32) -> Self {
    let max_x = width.saturating_sub(1) as i32;
    let max_y = height.saturating_sub(1) as i32;
    let to_px = |v: f32, scale: u32, upper: i32, round: fn(f32) -> f32| -> i32 {
      let v = if v.is_finite() { v } else { 0.0 };
      (round(v * scale as f32) as i32).clamp(0, upper)
    };

    let x0 = to_px(bbox[0].min(bbox[2]), width, max_x, f32::floor);
    let y0 = to_px(bbox[1].min(bbox[3]), height, max_y, f32::floor);
    let x1 = to_px(bbox[0].max(bbox[2]), width, max_x, f32::ceil);
    let y1 = to_px(bbox[1].max(bbox[3]), height, max_y, f32::ceil);

    Self {
      x_min: x0,
      y_min: y0,
      x_max: x1,
      y_max: y1,
    }
  }

  pub fn contains(&self, x: i32, y: i32) -> bool {
    x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
  }
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 边界框
  pub bbox: BoundingBox,
  /// 置信度，范围 [0, 1]
  pub confidence: f32,
  /// 缺陷类别
  pub kind: DefectLabel,
}

/// 一帧的检测汇总
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionOutcome {
  pub any_defect: bool,
  pub max_confidence: f32,
  pub detections: Vec<Detection>,
  /// 推理失败时的错误描述，此时其余字段为空结果
  pub failure: Option<String>,
}

impl DetectionOutcome {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn failed(reason: impl Into<String>) -> Self {
    Self {
      failure: Some(reason.into()),
      ..Self::default()
    }
  }

  /// 由已过滤的检测结果构造，列表非空即视为有缺陷
  pub fn from_detections(detections: Vec<Detection>) -> Self {
    let any_defect = !detections.is_empty();
    let max_confidence = detections
      .iter()
      .map(|d| d.confidence)
      .fold(0.0f32, f32::max);

    Self {
      any_defect,
      max_confidence,
      detections,
      failure: None,
    }
  }

  pub fn is_failure(&self) -> bool {
    self.failure.is_some()
  }
}

/// 缺陷检测能力
///
/// 每种产品各自实现，检测与标注都不改变检测器状态。
pub trait DefectDetector {
  /// 推理并按固定阈值过滤，失败时返回带 `failure` 的空结果
  fn detect(&self, frame: &Frame) -> DetectionOutcome;
  /// 在帧上绘制检测框与标签，不再做任何过滤
  fn annotate(&self, frame: Frame, detections: &[Detection]) -> Frame;
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("字体加载失败: {0}")]
  FontError(#[from] InvalidFont),
}

/// 瓶盖缺陷检测器
pub struct BottleCapDetector<M> {
  model: M,
  cutoff: f32,
  draw: Draw<'static>,
}

impl<M> BottleCapDetector<M> {
  pub fn new(model: M) -> Result<Self, DetectorError> {
    Self::with_cutoff(model, DEFAULT_CUTOFF)
  }

  pub fn with_cutoff(model: M, cutoff: f32) -> Result<Self, DetectorError> {
    Ok(Self {
      model,
      cutoff: cutoff.clamp(0.0, 1.0),
      draw: Draw::embedded()?,
    })
  }

  pub fn cutoff(&self) -> f32 {
    self.cutoff
  }

  fn to_detection(&self, item: &DetectItem<DefectLabel>, frame: &Frame) -> Option<Detection> {
    if !(0.0..=1.0).contains(&item.score) {
      warn!("丢弃置信度越界的结果: {}", item.score);
      return None;
    }
    if item.score <= self.cutoff {
      return None;
    }

    Some(Detection {
      bbox: BoundingBox::from_normalized(&item.bbox, frame.width(), frame.height()),
      confidence: item.score,
      kind: item.kind,
    })
  }
}

impl<M, E> DefectDetector for BottleCapDetector<M>
where
  M: Model<Input = Frame, Output = DetectResult<DefectLabel>, Error = E>,
  E: Display,
{
  fn detect(&self, frame: &Frame) -> DetectionOutcome {
    let now = std::time::Instant::now();
    let result = match self.model.infer(frame) {
      Ok(result) => result,
      Err(e) => {
        warn!("推理失败: {}", e);
        return DetectionOutcome::failed(e.to_string());
      }
    };
    debug!("推理完成，耗时: {:.2?}，原始结果 {} 个", now.elapsed(), result.items.len());

    let detections = result
      .items
      .iter()
      .filter_map(|item| self.to_detection(item, frame))
      .collect();

    DetectionOutcome::from_detections(detections)
  }

  fn annotate(&self, mut frame: Frame, detections: &[Detection]) -> Frame {
    self.draw.draw_detections(&mut frame, detections);
    frame
  }
}
