// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/camera/image_file.rs - 静态图像摄像头
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

//! 每次采集都返回同一张图片，用于在没有硬件的机器上演示和调试。

use std::path::PathBuf;

use image::{ImageReader, RgbImage, imageops::FilterType};
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_path,
  camera::{Camera, CameraError},
  config::CameraConfig,
  frame::Frame,
};

pub struct ImageFileCamera {
  path: PathBuf,
  image: Option<RgbImage>,
  configured: Option<CameraConfig>,
  running: bool,
}

impl FromUrlWithScheme for ImageFileCamera {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileCamera {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(ImageFileCamera::new(url_path(url)))
  }
}

impl ImageFileCamera {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      image: None,
      configured: None,
      running: false,
    }
  }
}

impl Camera for ImageFileCamera {
  fn configure(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
    let decoded: RgbImage = ImageReader::open(&self.path)?.decode()?.into();
    let (width, height) = config.resolution;

    let mut image = if decoded.dimensions() == (width, height) {
      decoded
    } else {
      image::imageops::resize(&decoded, width, height, FilterType::Triangle)
    };
    config.orientation.apply(&mut image);

    info!(
      "图像摄像头已配置: {} -> {}x{}",
      self.path.display(),
      width,
      height
    );
    self.image = Some(image);
    self.configured = Some(config.clone());
    Ok(())
  }

  fn start(&mut self) -> Result<(), CameraError> {
    if self.configured.is_none() {
      return Err(CameraError::Unsupported("启动前必须先配置".to_string()));
    }
    self.running = true;
    Ok(())
  }

  fn capture_frame(&mut self) -> Result<Frame, CameraError> {
    if !self.running {
      return Err(CameraError::NotStarted);
    }
    let image = self.image.clone().ok_or(CameraError::Closed)?;
    Ok(Frame::from(image))
  }

  fn stop(&mut self) -> Result<(), CameraError> {
    self.running = false;
    Ok(())
  }

  fn close(&mut self) -> Result<(), CameraError> {
    self.running = false;
    self.image = None;
    Ok(())
  }
}
