// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/model/yolo26.rs - RKNN YOLO26 缺陷检测模型
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

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_path,
  frame::Frame,
  model::{DefectLabel, DetectItem, DetectResult, Model, WithLabel},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = DefectLabel::COUNT;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
// 仅作预筛，最终保留阈值由检测器决定
const YOLO26_OBJECT_THRESH: f32 = 0.25;

pub struct Yolo26 {
  context: Context,
}

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl Yolo26Error {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolo26Builder {
      model_path: url_path(url),
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<Yolo26, Yolo26Error> {
    let model = std::fs::read(&self.model_path)?;
    info!(
      "加载 RKNN 模型: {} ({:.2} MB)",
      self.model_path,
      model.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model, self.flags)?;
    let version = context
      .sdk_version()
      .map_err(|e| Yolo26Error::invalid("无法查询 SDK 版本", e))?;
    if let (Ok(api), Ok(driver)) = (version.api_version(), version.driver_version()) {
      debug!("RKNN API {} / 驱动 {}", api, driver);
    }

    check_io_layout(&context)?;
    info!("模型加载完成");
    Ok(Yolo26 { context })
  }
}

/// 瓶盖模型只有一个输入和三个检测头（每头回归、分类各一个输出）
fn check_io_layout(context: &Context) -> Result<(), Yolo26Error> {
  let inputs = context
    .num_inputs()
    .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
  let outputs = context
    .num_outputs()
    .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

  if (inputs, outputs) == (YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS) {
    return Ok(());
  }

  let msg = format!(
    "模型输入/输出数量应为 {}/{}, 实际为 {}/{}",
    YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, inputs, outputs
  );
  error!("{}", msg);
  Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel))
}

/// 按长度区分回归与分类张量，RKNN 导出时两者顺序不固定
fn split_reg_cls<'a>(
  a: &'a [f32],
  b: &'a [f32],
  spatial: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  let (reg_len, cls_len) = (4 * spatial, YOLO26_CLASS_NUM * spatial);
  match (a.len(), b.len()) {
    (r, c) if r == reg_len && c == cls_len => Some((a, b)),
    (c, r) if r == reg_len && c == cls_len => Some((b, a)),
    (x, y) => {
      error!(
        "检测头张量长度不符: {} / {}, 期望回归 {} 分类 {}",
        x, y, reg_len, cls_len
      );
      None
    }
  }
}

/// 解码一个检测头，结果追加到 `items`
///
/// 回归张量按 `[左, 上, 右, 下] × 网格` 排列，单位为步长；分类张量为未经 sigmoid 的 logit。
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (rows, cols): (usize, usize),
  stride: f32,
  items: &mut Vec<DetectItem<DefectLabel>>,
) {
  let cells = rows * cols;
  let distance = |side: usize, cell: usize| reg[side * cells + cell];

  for cell in 0..cells {
    let Some((class_id, logit)) = (0..YOLO26_CLASS_NUM)
      .map(|c| (c, cls[c * cells + cell]))
      .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
      continue;
    };

    let score = sigmoid(logit);
    if score <= YOLO26_OBJECT_THRESH {
      continue;
    }

    // 网格中心
    let cx = (cell % cols) as f32 + 0.5;
    let cy = (cell / cols) as f32 + 0.5;
    let corner = |offset: f32, limit: f32| (offset * stride).clamp(0.0, limit) / limit;

    items.push(DetectItem {
      kind: DefectLabel::from_label_id(class_id as u32),
      score,
      bbox: [
        corner(cx - distance(0, cell), YOLO26_INPUT_W),
        corner(cy - distance(1, cell), YOLO26_INPUT_H),
        corner(cx + distance(2, cell), YOLO26_INPUT_W),
        corner(cy + distance(3, cell), YOLO26_INPUT_H),
      ],
    });
  }
}

impl Yolo26 {
  fn postprocess(output: rknpu::Output) -> DetectResult<DefectLabel> {
    let mut items = Vec::new();

    for (head, (&size, stride)) in YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate() {
      let tensors = output
        .get_f32(head * 2)
        .and_then(|a| output.get_f32(head * 2 + 1).map(|b| (a, b)));
      let (a, b) = match tensors {
        Ok(pair) => pair,
        Err(e) => {
          error!("读取检测头 {} 输出失败: {}", head, e);
          continue;
        }
      };

      if let Some((reg, cls)) = split_reg_cls(a, b, size.0 * size.1) {
        decode_head(reg, cls, size, stride, &mut items);
      }
    }

    debug!("预筛后候选 {} 个", items.len());
    DetectResult::from(items)
  }
}

impl Model for Yolo26 {
  type Input = Frame;
  type Output = DetectResult<DefectLabel>;
  type Error = Yolo26Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let data = input.resized_rgb(YOLO26_INPUT_W as u32, YOLO26_INPUT_H as u32);

    self
      .context
      .set_input(0, &data, rknpu::TensorFormat::NHWC, TensorType::UInt8)?;
    self.context.run()?;

    Ok(Self::postprocess(self.context.get_outputs()?))
  }
}

#[inline]
fn sigmoid(logit: f32) -> f32 {
  (1.0 + (-logit).exp()).recip()
}
