// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;

pub const FRAME_CHANNELS: usize = 3;

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl ChannelOrder {
  /// 将 RGB 颜色转为本顺序下的像素值
  pub fn pixel(&self, rgb: [u8; 3]) -> Rgb<u8> {
    match self {
      ChannelOrder::Rgb => Rgb(rgb),
      ChannelOrder::Bgr => Rgb([rgb[2], rgb[1], rgb[0]]),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一帧 NHWC 排列的三通道图像
///
/// 帧在一次采集周期内从摄像头流向检测器再流向显示端，不跨周期保留。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  width: u32,
  height: u32,
  order: ChannelOrder,
  data: Box<[u8]>,
}

impl Frame {
  pub fn new(
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = FRAME_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      order,
      data: data.into_boxed_slice(),
    })
  }

  pub fn zeroed(width: u32, height: u32, order: ChannelOrder) -> Self {
    let size = FRAME_CHANNELS * width as usize * height as usize;
    Self {
      width,
      height,
      order,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    FRAME_CHANNELS
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  /// 转为显示所需的 RGB 顺序图像
  pub fn to_rgb_image(&self) -> RgbImage {
    let width = self.width as usize;
    let data = &self.data;
    match self.order {
      ChannelOrder::Rgb => ImageBuffer::from_fn(self.width, self.height, |x, y| {
        let idx = (y as usize * width + x as usize) * FRAME_CHANNELS;
        Rgb([data[idx], data[idx + 1], data[idx + 2]])
      }),
      ChannelOrder::Bgr => ImageBuffer::from_fn(self.width, self.height, |x, y| {
        let idx = (y as usize * width + x as usize) * FRAME_CHANNELS;
        Rgb([data[idx + 2], data[idx + 1], data[idx]])
      }),
    }
  }

  /// 缩放为模型输入尺寸的 RGB NHWC 数据
  pub fn resized_rgb(&self, width: u32, height: u32) -> Vec<u8> {
    let image = self.to_rgb_image();
    if image.dimensions() == (width, height) {
      return image.into_raw();
    }
    image::imageops::resize(&image, width, height, FilterType::Triangle).into_raw()
  }

  /// 以原通道顺序把缓冲区视作 `RgbImage` 进行原地修改
  ///
  /// 闭包中写入的颜色需要先经过 [`ChannelOrder::pixel`] 转换。
  pub fn with_image_mut<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> R {
    let data = std::mem::take(&mut self.data).into_vec();
    // 构造时已校验长度等于 宽*高*3，from_raw 不会返回 None
    let image = RgbImage::from_raw(self.width, self.height, data);
    debug_assert!(image.is_some(), "帧缓冲区长度与尺寸不符");
    let mut image = image.unwrap_or_else(|| RgbImage::new(self.width, self.height));
    let result = f(&mut image);
    self.data = image.into_raw().into_boxed_slice();
    result
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      order: ChannelOrder::Rgb,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}
