// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/model.rs - 模型
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
use url::Url;

use crate::{FromUrl, frame::Frame};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// 瓶盖缺陷类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectLabel {
  Good,
  Hole,
  Melted,
  Scratch,
  Stain,
  Unknown(u32),
}

impl DefectLabel {
  pub const COUNT: usize = 5;
}

impl WithLabel for DefectLabel {
  fn to_label_str(&self) -> String {
    match self {
      DefectLabel::Good => "good".to_string(),
      DefectLabel::Hole => "hole".to_string(),
      DefectLabel::Melted => "melted".to_string(),
      DefectLabel::Scratch => "scratch".to_string(),
      DefectLabel::Stain => "stain".to_string(),
      DefectLabel::Unknown(id) => format!("class-{}", id),
    }
  }

  fn to_label_id(&self) -> u32 {
    match self {
      DefectLabel::Good => 0,
      DefectLabel::Hole => 1,
      DefectLabel::Melted => 2,
      DefectLabel::Scratch => 3,
      DefectLabel::Stain => 4,
      DefectLabel::Unknown(id) => *id,
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => DefectLabel::Good,
      1 => DefectLabel::Hole,
      2 => DefectLabel::Melted,
      3 => DefectLabel::Scratch,
      4 => DefectLabel::Stain,
      other => DefectLabel::Unknown(other),
    }
  }
}

/// 计算两个归一化边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别进行非极大值抑制
pub fn nms<T: WithLabel>(mut items: Vec<DetectItem<T>>, iou_threshold: f32) -> Vec<DetectItem<T>> {
  // 按置信度降序排序
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem<T>> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = result.iter().any(|kept| {
      kept.kind.to_label_id() == item.kind.to_label_id()
        && iou(&kept.bbox, &item.bbox) >= iou_threshold
    });
    if !suppressed {
      result.push(item);
    }
  }

  result
}

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

#[cfg(feature = "model_onnx")]
mod yolov8_onnx;
#[cfg(feature = "model_onnx")]
pub use self::yolov8_onnx::{YoloV8Onnx, YoloV8OnnxBuilder, YoloV8OnnxError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 模型错误: {0}")]
  YoloV8OnnxError(#[from] YoloV8OnnxError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的模型后端
pub enum ModelWrapper {
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
  #[cfg(feature = "model_onnx")]
  YoloV8Onnx(YoloV8Onnx),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_yolo26")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == Yolo26Builder::SCHEME {
        let model = Yolo26Builder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Yolo26(model));
      }
    }
    #[cfg(feature = "model_onnx")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == YoloV8OnnxBuilder::SCHEME {
        let model = YoloV8OnnxBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::YoloV8Onnx(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Input = Frame;
  type Output = DetectResult<DefectLabel>;
  type Error = ModelError;

  #[allow(unused_variables)]
  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match *self {
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(ref model) => model.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_onnx")]
      ModelWrapper::YoloV8Onnx(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(id: u32, score: f32, bbox: [f32; 4]) -> DetectItem<DefectLabel> {
    DetectItem {
      kind: DefectLabel::from_label_id(id),
      score,
      bbox,
    }
  }

  #[test]
  fn label_ids_round_trip_known_classes() {
    for id in 0..DefectLabel::COUNT as u32 {
      assert_eq!(DefectLabel::from_label_id(id).to_label_id(), id);
    }
    assert_eq!(DefectLabel::from_label_id(3).to_label_str(), "scratch");
    assert_eq!(DefectLabel::from_label_id(9).to_label_str(), "class-9");
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 0.1, 0.1], &[0.5, 0.5, 0.6, 0.6]), 0.0);
    assert!((iou(&[0.0, 0.0, 0.2, 0.2], &[0.0, 0.0, 0.2, 0.2]) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn nms_suppresses_overlapping_boxes_of_same_class() {
    let kept = nms(
      vec![
        item(1, 0.6, [0.10, 0.10, 0.30, 0.30]),
        item(1, 0.9, [0.11, 0.11, 0.31, 0.31]),
        item(2, 0.7, [0.10, 0.10, 0.30, 0.30]),
        item(1, 0.8, [0.60, 0.60, 0.80, 0.80]),
      ],
      0.45,
    );

    let scores: Vec<f32> = kept.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.8, 0.7]);
  }
}
