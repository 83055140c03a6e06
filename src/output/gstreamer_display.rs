// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 窗口显示
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

//! # GStreamer 窗口显示
//!
//! 通过 `appsrc` 把画面推入本地视频窗口，并用 `textoverlay` 显示界面状态。
//!
//! ## URL Scheme
//!
//! `gstdisplay://`
//!
//! ## 参数说明
//!
//! - `width`: 视口宽度（像素），默认 640
//! - `height`: 视口高度（像素），默认 480
//! - `fps`: 标称帧率，默认 30
//! - `sink`: 视频 sink 元素，默认 `autovideosink`

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  app::Presenter,
  config::{DEFAULT_FRAME_RATE, DEFAULT_VIEWPORT},
  output::Surface,
};

#[derive(Error, Debug)]
pub enum GStreamerDisplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("找不到管道元素: {0}")]
  ElementNotFound(&'static str),
}

pub struct GStreamerDisplay {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  overlay: gst::Element,
  viewport: (u32, u32),
  fps: u32,
  frame_count: u64,
  status: String,
}

impl FromUrlWithScheme for GStreamerDisplay {
  const SCHEME: &'static str = "gstdisplay";
}

impl FromUrl for GStreamerDisplay {
  type Error = GStreamerDisplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerDisplayError::SchemeMismatch(url.scheme().to_string()));
    }

    gst::init()?;

    let mut viewport = DEFAULT_VIEWPORT;
    let mut fps = DEFAULT_FRAME_RATE;
    let mut sink = "autovideosink".to_string();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => viewport.0 = value.parse().unwrap_or(viewport.0),
        "height" => viewport.1 = value.parse().unwrap_or(viewport.1),
        "fps" => fps = value.parse().unwrap_or(fps).max(1),
        "sink" => sink = value.into_owned(),
        _ => {}
      }
    }

    let pipeline_desc = format!(
      "appsrc name=src is-live=true ! videoconvert ! textoverlay name=status valignment=top halignment=left font-desc=\"Sans 12\" ! videoconvert ! {}",
      sink
    );
    info!("创建显示管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayError::ElementNotFound("src"))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayError::PipelineError("src 不是 appsrc".to_string()))?;
    let overlay = pipeline
      .by_name("status")
      .ok_or(GStreamerDisplayError::ElementNotFound("status"))?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", viewport.0 as i32)
      .field("height", viewport.1 as i32)
      .field("framerate", gst::Fraction::new(fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("显示窗口已打开: {}x{}", viewport.0, viewport.1);

    Ok(Self {
      pipeline,
      appsrc,
      overlay,
      viewport,
      fps,
      frame_count: 0,
      status: String::new(),
    })
  }
}

impl GStreamerDisplay {
  /// 居中放入视口大小的黑色画布
  fn letterbox(&self, image: &RgbImage) -> RgbImage {
    let (view_w, view_h) = self.viewport;
    if image.dimensions() == self.viewport {
      return image.clone();
    }
    let mut canvas = RgbImage::from_pixel(view_w, view_h, Rgb([0, 0, 0]));
    let x = (view_w as i64 - image.width() as i64) / 2;
    let y = (view_h as i64 - image.height() as i64) / 2;
    image::imageops::overlay(&mut canvas, image, x, y);
    canvas
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerDisplayError> {
    let mut buffer = gst::Buffer::from_slice(data.to_vec());
    let duration = 1_000_000_000 / self.fps as u64;
    let timestamp = self.frame_count * duration;
    self.frame_count += 1;

    if let Some(buffer_ref) = buffer.get_mut() {
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerDisplayError::PipelineError(format!("推送缓冲区失败: {:?}", e)))?;
    Ok(())
  }
}

impl Surface for GStreamerDisplay {
  type Error = GStreamerDisplayError;

  fn viewport(&self) -> (u32, u32) {
    self.viewport
  }

  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    let canvas = self.letterbox(image);
    self.push_frame(canvas.as_raw())
  }

  fn update_status(&mut self, presenter: &Presenter) -> Result<(), Self::Error> {
    let status = presenter.overlay_text();
    if status != self.status {
      self.overlay.set_property("text", status.as_str());
      self.status = status;
    }
    Ok(())
  }
}

impl Drop for GStreamerDisplay {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("关闭显示管道失败: {}", e);
    }
    info!("显示窗口已关闭，共显示 {} 帧", self.frame_count);
  }
}
