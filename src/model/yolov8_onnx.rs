// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/model/yolov8_onnx.rs - 基于 tract 的 YOLOv8 ONNX 模型
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

//! YOLOv8 导出的 ONNX 模型，输出形状为 `[1, 4 + 类别数, 候选数]`，
//! 前四行为输入像素坐标下的 `cx, cy, w, h`，其余为已经过 sigmoid 的类别分数。
//! 导出模型不含 NMS，由本模块完成。

use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_path,
  frame::Frame,
  model::{DefectLabel, DetectItem, DetectResult, Model, WithLabel, nms},
};

const YOLOV8_INPUT_W: usize = 640;
const YOLOV8_INPUT_H: usize = 640;
const YOLOV8_SCORE_THRESH: f32 = 0.25;
const YOLOV8_NMS_THRESH: f32 = 0.45;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum YoloV8OnnxError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状无效: {0:?}")]
  InvalidOutputShape(Vec<usize>),
}

pub struct YoloV8OnnxBuilder {
  model_path: String,
  nms_threshold: f32,
}

impl FromUrlWithScheme for YoloV8OnnxBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloV8OnnxBuilder {
  type Error = YoloV8OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloV8OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let nms_threshold = url
      .query_pairs()
      .find(|(k, _)| k == "nms")
      .and_then(|(_, v)| v.parse::<f32>().ok())
      .unwrap_or(YOLOV8_NMS_THRESH);

    Ok(YoloV8OnnxBuilder {
      model_path: url_path(url),
      nms_threshold,
    })
  }
}

impl YoloV8OnnxBuilder {
  pub fn build(self) -> Result<YoloV8Onnx, YoloV8OnnxError> {
    info!("加载 ONNX 模型: {}", self.model_path);
    let load_error = |e: TractError| YoloV8OnnxError::ModelLoadError(format!("{:#}", e));

    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(load_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          f32::datum_type(),
          tvec!(1, 3, YOLOV8_INPUT_H, YOLOV8_INPUT_W),
        ),
      )
      .map_err(load_error)?
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;

    info!("模型加载完成");
    Ok(YoloV8Onnx {
      plan,
      nms_threshold: self.nms_threshold,
    })
  }
}

pub struct YoloV8Onnx {
  plan: OnnxPlan,
  nms_threshold: f32,
}

impl YoloV8Onnx {
  fn build_input(frame: &Frame) -> Tensor {
    let pixels = frame.resized_rgb(YOLOV8_INPUT_W as u32, YOLOV8_INPUT_H as u32);
    tract_ndarray::Array4::from_shape_fn(
      (1, 3, YOLOV8_INPUT_H, YOLOV8_INPUT_W),
      |(_, channel, y, x)| pixels[(y * YOLOV8_INPUT_W + x) * 3 + channel] as f32 / 255.0,
    )
    .into_tensor()
  }
}

/// 解码 `[4 + 类别数, 候选数]` 的输出矩阵
fn decode_candidates(
  rows: usize,
  candidates: usize,
  value: impl Fn(usize, usize) -> f32,
) -> Vec<DetectItem<DefectLabel>> {
  let classes = rows.saturating_sub(4);
  let mut items = Vec::new();

  for i in 0..candidates {
    let (mut score, mut class_id) = (f32::MIN, 0usize);
    for c in 0..classes {
      let s = value(4 + c, i);
      if s > score {
        score = s;
        class_id = c;
      }
    }

    if score <= YOLOV8_SCORE_THRESH {
      continue;
    }

    let (cx, cy, w, h) = (value(0, i), value(1, i), value(2, i), value(3, i));
    let (in_w, in_h) = (YOLOV8_INPUT_W as f32, YOLOV8_INPUT_H as f32);
    items.push(DetectItem {
      kind: DefectLabel::from_label_id(class_id as u32),
      score,
      bbox: [
        ((cx - w / 2.0) / in_w).clamp(0.0, 1.0),
        ((cy - h / 2.0) / in_h).clamp(0.0, 1.0),
        ((cx + w / 2.0) / in_w).clamp(0.0, 1.0),
        ((cy + h / 2.0) / in_h).clamp(0.0, 1.0),
      ],
    });
  }

  items
}

impl Model for YoloV8Onnx {
  type Input = Frame;
  type Output = DetectResult<DefectLabel>;
  type Error = YoloV8OnnxError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = Self::build_input(input);
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| YoloV8OnnxError::InferenceError(format!("{:#}", e)))?;

    let output = outputs
      .first()
      .ok_or_else(|| YoloV8OnnxError::InferenceError("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| YoloV8OnnxError::InferenceError(format!("{:#}", e)))?;

    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
      return Err(YoloV8OnnxError::InvalidOutputShape(shape));
    }

    let items = decode_candidates(shape[1], shape[2], |row, col| view[[0, row, col].as_slice()]);
    debug!("NMS 前候选数量: {}", items.len());

    Ok(DetectResult::from(nms(items, self.nms_threshold)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_center_boxes_into_normalized_corners() {
    // 2 个候选，5 个类别
    let rows = 4 + DefectLabel::COUNT;
    let mut matrix = vec![vec![0.0f32; 2]; rows];
    matrix[0][0] = 320.0;
    matrix[1][0] = 320.0;
    matrix[2][0] = 64.0;
    matrix[3][0] = 128.0;
    matrix[4 + 1][0] = 0.9; // hole
    matrix[4 + 2][1] = 0.1; // 低于预筛阈值

    let items = decode_candidates(rows, 2, |r, c| matrix[r][c]);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, DefectLabel::Hole);
    assert_eq!(items[0].bbox, [0.45, 0.4, 0.55, 0.6]);
  }

  #[test]
  fn builder_decodes_model_path() {
    let url = Url::parse("onnx:///opt/models/bottle caps/best.onnx?nms=0.3").unwrap();
    let builder = YoloV8OnnxBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/opt/models/bottle caps/best.onnx");
    assert_eq!(builder.nms_threshold, 0.3);
  }
}
