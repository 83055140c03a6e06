// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/output/draw.rs - 缺陷检测结果可视化
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

use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_text_mut, rect::Rect};

use crate::{
  detector::{BoundingBox, Detection},
  frame::Frame,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_GAP: i32 = 4; // 标签底部与边框之间的距离
const LABEL_MARGIN: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

/// 在帧上绘制检测框与置信度标签
///
/// 只改写边框线条与标签文字覆盖的像素。
pub struct Draw<'a> {
  font_size: f32,
  thickness: i32,
  color: [u8; 3],
  font: FontRef<'a>,
}

impl Draw<'static> {
  /// 使用内嵌字体
  pub fn embedded() -> Result<Self, InvalidFont> {
    Self::with_font(EMBEDDED_FONT)
  }
}

impl<'a> Draw<'a> {
  pub fn with_font(font_data: &'a [u8]) -> Result<Self, InvalidFont> {
    Ok(Self {
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
      font: FontRef::try_from_slice(font_data)?,
    })
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  pub fn label_text(confidence: f32) -> String {
    format!("Confidence: {:.2}", confidence)
  }

  fn scale(&self) -> PxScale {
    PxScale::from(self.font_size)
  }

  fn line_height(&self) -> i32 {
    self.font.as_scaled(self.scale()).height().ceil() as i32
  }

  /// 标签左上角位置，位于边框左上角上方
  fn label_origin(&self, bbox: &BoundingBox) -> (i32, i32) {
    let label_y = (bbox.y_min - LABEL_GAP - self.line_height()).max(0);
    (bbox.x_min.max(0), label_y)
  }

  /// 标签文字可能写入的区域（含少量边距）
  pub fn label_region(&self, detection: &Detection) -> Rect {
    let label = Self::label_text(detection.confidence);
    let (text_width, _) = imageproc::drawing::text_size(self.scale(), &self.font, &label);
    let (x, y) = self.label_origin(&detection.bbox);
    Rect::at(x - LABEL_MARGIN, y - LABEL_MARGIN).of_size(
      text_width + self.font_size.ceil() as u32 + 2 * LABEL_MARGIN as u32,
      (self.line_height() + 2 * LABEL_MARGIN) as u32,
    )
  }

  pub fn thickness(&self) -> i32 {
    self.thickness
  }

  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) -> bool {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return false;
    }

    let x_min = bbox.x_min.clamp(0, w - 1);
    let y_min = bbox.y_min.clamp(0, h - 1);
    let x_max = bbox.x_max.clamp(0, w - 1);
    let y_max = bbox.y_max.clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return false;
    }

    for thickness in 0..self.thickness {
      let x_min_t = (x_min + thickness).min(x_max);
      let y_min_t = (y_min + thickness).min(y_max);
      let x_max_t = (x_max - thickness).max(x_min);
      let y_max_t = (y_max - thickness).max(y_min);

      // 上下边
      for x in x_min_t..=x_max_t {
        image.put_pixel(x as u32, y_min_t as u32, color);
        image.put_pixel(x as u32, y_max_t as u32, color);
      }

      // 左右边
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t as u32, y as u32, color);
        image.put_pixel(x_max_t as u32, y as u32, color);
      }
    }

    true
  }

  fn draw_label(&self, image: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
    let label = Self::label_text(detection.confidence);
    let (x, y) = self.label_origin(&detection.bbox);
    draw_text_mut(image, color, x, y, self.scale(), &self.font, &label);
  }

  /// 在帧上绘制全部检测结果，保持帧原有的通道顺序
  pub fn draw_detections(&self, frame: &mut Frame, detections: &[Detection]) {
    if detections.is_empty() {
      return;
    }

    let color = frame.order().pixel(self.color);
    frame.with_image_mut(|image| {
      for detection in detections {
        if self.draw_bbox(image, &detection.bbox, color) {
          self.draw_label(image, detection, color);
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DefectLabel;

  fn detection(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Detection {
    Detection {
      bbox: BoundingBox {
        x_min,
        y_min,
        x_max,
        y_max,
      },
      confidence: 0.9,
      kind: DefectLabel::Hole,
    }
  }

  #[test]
  fn box_edges_are_painted_green() {
    let draw = Draw::embedded().unwrap();
    let mut frame = Frame::from(RgbImage::new(64, 64));
    draw.draw_detections(&mut frame, &[detection(10, 40, 30, 60)]);

    let image = frame.to_rgb_image();
    assert_eq!(image.get_pixel(10, 40), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(11, 50), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(30, 60), &Rgb(BOX_COLOR));
    // 边框内部不变
    assert_eq!(image.get_pixel(20, 50), &Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_draws_nothing() {
    let draw = Draw::embedded().unwrap();
    let original = Frame::from(RgbImage::from_pixel(16, 16, Rgb([7, 7, 7])));
    let mut frame = original.clone();
    draw.draw_detections(&mut frame, &[detection(8, 8, 8, 12)]);
    assert_eq!(frame, original);
  }

  #[test]
  fn bgr_frame_stores_color_in_its_own_order() {
    let draw = Draw::embedded().unwrap().with_color([255, 0, 0]);
    let mut frame = Frame::zeroed(32, 32, crate::frame::ChannelOrder::Bgr);
    draw.draw_detections(&mut frame, &[detection(4, 20, 20, 30)]);
    let idx = (20 * 32 + 4) * 3;
    assert_eq!(&frame.as_nhwc()[idx..idx + 3], &[0, 0, 255]);
  }

  #[test]
  fn label_sits_above_the_box() {
    let draw = Draw::embedded().unwrap();
    let d = detection(10, 40, 30, 60);
    let region = draw.label_region(&d);
    assert!(region.bottom() < 40);
    assert!(region.left() <= 10);
  }
}
