// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/camera/v4l_camera.rs - V4L2 摄像头
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

use std::time::Duration;

use image::RgbImage;
use tracing::{info, warn};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

use crate::{
  FromUrl, FromUrlWithScheme, url_path,
  camera::{Camera, CameraError},
  config::{CameraConfig, Orientation, PixelFormat},
  frame::{ChannelOrder, FRAME_CHANNELS, Frame},
};

const V4L_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

// videodev2.h 中的控制项编号
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_CID_GAIN: u32 = 0x0098_0913;
const V4L2_EXPOSURE_MANUAL: i64 = 1;

/// 手动曝光与增益的控制值，曝光以 100 微秒为单位
fn exposure_controls(config: &CameraConfig) -> [(u32, i64); 3] {
  let exposure = (config.exposure_time.as_micros() / 100).max(1) as i64;
  [
    (V4L2_CID_EXPOSURE_AUTO, V4L2_EXPOSURE_MANUAL),
    (V4L2_CID_EXPOSURE_ABSOLUTE, exposure),
    // 增益单位由驱动决定，这里按倍数取整
    (V4L2_CID_GAIN, config.analogue_gain.round() as i64),
  ]
}

/// V4L2 mmap 摄像头
///
/// `v4l` 的 mmap 流只持有设备句柄的 `Arc`，不借用 `Device`，
/// 因此可以和设备一起保存在结构体中。
pub struct V4lCamera {
  device_path: String,
  device: Option<Device>,
  stream: Option<Stream<'static>>,
  width: u32,
  height: u32,
  stride: u32,
  pixel_format: PixelFormat,
  buffer_count: u32,
  orientation: Orientation,
}

impl FromUrlWithScheme for V4lCamera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCamera {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(V4lCamera {
      device_path: url_path(url),
      device: None,
      stream: None,
      width: 0,
      height: 0,
      stride: 0,
      pixel_format: PixelFormat::default(),
      buffer_count: 4,
      orientation: Orientation::IDENTITY,
    })
  }
}

impl V4lCamera {
  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height) as usize * FRAME_CHANNELS);

    for row in 0..height as usize {
      let start = row * stride as usize;
      let line = &yuyv[start..start + width as usize * 2];
      for chunk in line.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
          let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
          let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
          let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
          rgb.extend_from_slice(&[r, g, b]);
        }
      }
    }

    rgb
  }

  fn packed_rows(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let row_bytes = width as usize * FRAME_CHANNELS;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
      let start = row * stride as usize;
      pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
  }

  fn required_len(&self) -> usize {
    let row_bytes = match self.pixel_format {
      PixelFormat::Yuyv => self.width as usize * 2,
      _ => self.width as usize * FRAME_CHANNELS,
    };
    self.stride as usize * (self.height.max(1) as usize - 1) + row_bytes
  }
}

impl Camera for V4lCamera {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
    self.close()?;

    let device = Device::with_path(&self.device_path)?;

    let mut format = device.format()?;
    format.width = config.resolution.0;
    format.height = config.resolution.1;
    format.fourcc = FourCC::new(&config.pixel_format.fourcc());
    let format = device.set_format(&format)?;

    if format.fourcc != FourCC::new(&config.pixel_format.fourcc()) {
      return Err(CameraError::Unsupported(format!(
        "设备不支持像素格式 {:?}，实际为 {}",
        config.pixel_format, format.fourcc
      )));
    }

    if let Err(e) = device.set_params(&Parameters::with_fps(config.frame_rate)) {
      warn!("无法设置帧率 {}: {}", config.frame_rate, e);
    }

    for (id, value) in exposure_controls(config) {
      let control = Control {
        id,
        value: Value::Integer(value),
      };
      if let Err(e) = device.set_control(control) {
        warn!("无法设置控制项 {:#x} = {}: {}", id, value, e);
      }
    }

    info!(
      "V4L2 设备 {} 已配置: {}x{} {}",
      self.device_path, format.width, format.height, format.fourcc
    );

    self.width = format.width;
    self.height = format.height;
    self.stride = format.stride;
    self.pixel_format = config.pixel_format;
    self.buffer_count = config.buffer_count.max(1);
    self.orientation = config.orientation;
    self.device = Some(device);
    Ok(())
  }

  fn start(&mut self) -> Result<(), CameraError> {
    let device = self
      .device
      .as_ref()
      .ok_or_else(|| CameraError::Unsupported("启动前必须先配置".to_string()))?;
    let mut stream = Stream::with_buffers(device, Type::VideoCapture, self.buffer_count)?;
    stream.set_timeout(V4L_DEQUEUE_TIMEOUT);
    self.stream = Some(stream);
    Ok(())
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    let required = self.required_len();
    let (width, height, stride) = (self.width, self.height, self.stride);
    let pixel_format = self.pixel_format;

    let stream = self.stream.as_mut().ok_or(CameraError::NotStarted)?;
    let (buffer, _meta) = stream.next()?;

    if buffer.len() < required {
      return Err(CameraError::FrameError(crate::frame::FrameError::LengthMismatch {
        expected: required,
        actual: buffer.len(),
      }));
    }

    let (data, order) = match pixel_format {
      PixelFormat::Yuyv => (
        Self::yuyv_to_rgb(buffer, width, height, stride),
        ChannelOrder::Rgb,
      ),
      other => (
        Self::packed_rows(buffer, width, height, stride),
        other.channel_order(),
      ),
    };

    if self.orientation.is_identity() {
      return Ok(Frame::new(width, height, order, data)?);
    }

    let mut image = RgbImage::from_raw(width, height, data)
      .ok_or_else(|| CameraError::Unsupported("无法创建图像".to_string()))?;
    self.orientation.apply(&mut image);
    Ok(Frame::new(width, height, order, image.into_raw())?)
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    // 丢弃流即停止采集并释放缓冲
    self.stream.take();
    Ok(())
  }

  fn close(&mut self) -> Result<(), CameraError> {
    self.stream.take();
    self.device.take();
    Ok(())
  }
}
