// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/camera.rs - 摄像头采集
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
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, config::CameraConfig, frame::Frame};

/// 摄像头驱动的最小契约
///
/// 调用顺序为 `configure` → `start` → 若干次 `capture_frame` → `stop` → `close`。
/// `stop` 与 `close` 必须可以重复调用。
pub trait Camera {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError>;
  fn start(&mut self) -> Result<(), CameraError>;
  fn capture_frame(&mut self) -> Result<Frame, CameraError>;
  fn stop(&mut self) -> Result<(), CameraError>;
  fn close(&mut self) -> Result<(), CameraError>;
}

impl<C: Camera + ?Sized> Camera for Box<C> {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
    (**self).configure(config)
  }

  fn start(&mut self) -> Result<(), CameraError> {
    (**self).start()
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    (**self).capture_frame()
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    (**self).stop()
  }

  fn close(&mut self) -> Result<(), CameraError> {
    (**self).close()
  }
}

/// 在启动时打开摄像头
pub trait CameraSource {
  type Camera: Camera;

  fn open(&self) -> Result<Self::Camera, CameraError>;
}

mod image_file;
pub use self::image_file::ImageFileCamera;

#[cfg(feature = "gstreamer_camera")]
mod gstreamer_camera;
#[cfg(feature = "gstreamer_camera")]
pub use self::gstreamer_camera::{GStreamerCamera, GStreamerCameraError};

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::V4lCamera;

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("摄像头未启动")]
  NotStarted,
  #[error("摄像头已关闭")]
  Closed,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("帧错误: {0}")]
  FrameError(#[from] crate::frame::FrameError),
  #[error("配置不受支持: {0}")]
  Unsupported(String),
  #[cfg(feature = "gstreamer_camera")]
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] GStreamerCameraError),
}

/// 按 URL 方案选择的摄像头后端
pub enum CameraWrapper {
  ImageFile(ImageFileCamera),
  #[cfg(feature = "gstreamer_camera")]
  GStreamer(GStreamerCamera),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lCamera),
}

impl FromUrl for CameraWrapper {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileCamera::SCHEME => Ok(CameraWrapper::ImageFile(ImageFileCamera::from_url(url)?)),
      #[cfg(feature = "gstreamer_camera")]
      GStreamerCamera::SCHEME => Ok(CameraWrapper::GStreamer(GStreamerCamera::from_url(url)?)),
      #[cfg(feature = "v4l_camera")]
      V4lCamera::SCHEME => Ok(CameraWrapper::V4l(V4lCamera::from_url(url)?)),
      other => Err(CameraError::SchemeMismatch(other.to_string())),
    }
  }
}

impl CameraWrapper {
  fn inner(&mut self) -> &mut dyn Camera {
    match self {
      CameraWrapper::ImageFile(camera) => camera,
      #[cfg(feature = "gstreamer_camera")]
      CameraWrapper::GStreamer(camera) => camera,
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera,
    }
  }
}

impl Camera for CameraWrapper {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
    self.inner().configure(config)
  }

  fn start(&mut self) -> Result<(), CameraError> {
    self.inner().start()
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    self.inner().capture_frame()
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    self.inner().stop()
  }

  fn close(&mut self) -> Result<(), CameraError> {
    self.inner().close()
  }
}

/// 根据配置中的 URL 打开摄像头
#[derive(Debug, Clone)]
pub struct UrlCameraSource {
  url: Url,
}

impl UrlCameraSource {
  pub fn new(config: &CameraConfig) -> Self {
    Self {
      url: config.source.clone(),
    }
  }
}

impl CameraSource for UrlCameraSource {
  type Camera = CameraWrapper;

  fn open(&self) -> Result<Self::Camera, CameraError> {
    info!("打开摄像头: {}", self.url);
    CameraWrapper::from_url(&self.url)
  }
}
