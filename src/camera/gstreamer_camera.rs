// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/camera/gstreamer_camera.rs - GStreamer 摄像头
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

//! # GStreamer 摄像头
//!
//! 支持的 URL：
//!
//! - `gst://libcamera`：树莓派等平台的 `libcamerasrc`
//! - `gst://camera/dev/video0?io-mode=2`：`v4l2src`
//! - `gst://test`：`videotestsrc`，无需硬件
//!
//! 分辨率、像素格式、帧率、缓冲数量与方向变换来自 [`CameraConfig`]，
//! 管道输出统一转换为 RGB。
//!
//! ## 系统依赖
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_path,
  camera::{Camera, CameraError},
  config::CameraConfig,
  frame::{ChannelOrder, FRAME_CHANNELS, Frame},
};

// 单次取帧的最长等待时间
const PULL_TIMEOUT_MS: u64 = 500;

#[derive(Error, Debug)]
pub enum GStreamerCameraError {
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("No sample within {0} ms")]
  Timeout(u64),
}

enum SourceKind {
  Libcamera,
  V4l2 { device: String, io_mode: Option<u32> },
  Test,
}

impl SourceKind {
  fn to_pipeline(&self, config: &CameraConfig) -> String {
    let (width, height) = config.resolution;
    let caps = format!(
      "video/x-raw,format={},width={},height={},framerate={}/1",
      config.pixel_format.caps_name(),
      width,
      height,
      config.frame_rate
    );
    match self {
      SourceKind::Libcamera => format!(
        "libcamerasrc exposure-time={} analogue-gain={:.2} ! {}",
        config.exposure_time.as_micros(),
        config.analogue_gain,
        caps
      ),
      SourceKind::V4l2 { device, io_mode } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!("v4l2src device=\"{}\"{} ! {}", device, io_mode_str, caps)
      }
      SourceKind::Test => format!("videotestsrc is-live=true ! {}", caps),
    }
  }
}

pub struct GStreamerCamera {
  source: SourceKind,
  pipeline: Option<gst::Pipeline>,
  appsink: Option<gst_app::AppSink>,
  running: bool,
}

impl FromUrlWithScheme for GStreamerCamera {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerCamera {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let source = match url.host_str() {
      Some("libcamera") => SourceKind::Libcamera,
      Some("camera") => SourceKind::V4l2 {
        device: url_path(url),
        io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      },
      Some("test") => SourceKind::Test,
      other => {
        return Err(CameraError::Unsupported(format!(
          "未知的 GStreamer 摄像头类型: {:?}",
          other
        )));
      }
    };

    Ok(GStreamerCamera {
      source,
      pipeline: None,
      appsink: None,
      running: false,
    })
  }
}

impl GStreamerCamera {
  fn build_pipeline(
    &self,
    config: &CameraConfig,
  ) -> Result<(gst::Pipeline, gst_app::AppSink), GStreamerCameraError> {
    gst::init()?;

    let mut items = vec![self.source.to_pipeline(config)];
    if !config.orientation.is_identity() {
      items.push(format!(
        "videoflip method={}",
        config.orientation.videoflip_method()
      ));
    }
    items.push("videoconvert ! video/x-raw,format=RGB".to_string());
    items.push(format!(
      "appsink max-buffers={} drop=true name=sink",
      config.buffer_count.max(1)
    ));
    let description = items.join(" ! ");

    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerCameraError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerCameraError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerCameraError::AppSinkNotFound)?;

    Ok((pipeline, appsink))
  }

  fn set_state(&self, state: gst::State) -> Result<(), GStreamerCameraError> {
    if let Some(pipeline) = &self.pipeline {
      pipeline.set_state(state)?;
    }
    Ok(())
  }
}

impl Camera for GStreamerCamera {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
    self.close()?;
    let (pipeline, appsink) = self.build_pipeline(config)?;
    self.pipeline = Some(pipeline);
    self.appsink = Some(appsink);
    Ok(())
  }

  fn start(&mut self) -> Result<(), CameraError> {
    if self.pipeline.is_none() {
      return Err(CameraError::Unsupported("启动前必须先配置".to_string()));
    }
    self.set_state(gst::State::Playing)?;
    self.running = true;
    Ok(())
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    let appsink = match (&self.appsink, self.running) {
      (Some(appsink), true) => appsink,
      _ => return Err(CameraError::NotStarted),
    };

    let sample = appsink
      .try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
      .ok_or(GStreamerCameraError::Timeout(PULL_TIMEOUT_MS))?;
    Ok(convert_sample(sample)?)
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    if self.running {
      self.set_state(gst::State::Paused)?;
      self.running = false;
    }
    Ok(())
  }

  fn close(&mut self) -> Result<(), CameraError> {
    self.running = false;
    self.appsink = None;
    if let Some(pipeline) = self.pipeline.take() {
      pipeline
        .set_state(gst::State::Null)
        .map_err(GStreamerCameraError::from)?;
    }
    Ok(())
  }
}

impl Drop for GStreamerCamera {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

fn convert_sample(sample: gst::Sample) -> Result<Frame, GStreamerCameraError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerCameraError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerCameraError::VideoInfoError)?;

  let order = match video_info.format() {
    gst_video::VideoFormat::Rgb => ChannelOrder::Rgb,
    gst_video::VideoFormat::Bgr => ChannelOrder::Bgr,
    _ => return Err(GStreamerCameraError::UnsupportedFormat),
  };

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width * FRAME_CHANNELS;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerCameraError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * (height.max(1) - 1) + row_bytes;
  if data.len() < expected {
    return Err(GStreamerCameraError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 去除行对齐填充
  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in 0..height {
    let start = row * stride;
    pixels.extend_from_slice(&data[start..start + row_bytes]);
  }

  Frame::new(width as u32, height as u32, order, pixels).map_err(|e| {
    GStreamerCameraError::PipelineError(e.to_string())
  })
}
