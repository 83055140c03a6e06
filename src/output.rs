// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/output.rs - 显示与输出
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, app::Presenter};

/// 显示面
///
/// 接收已经转为 RGB 顺序并缩放到视口内的图像，以及界面状态。
pub trait Surface {
  type Error;

  fn viewport(&self) -> (u32, u32);
  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error>;
  fn update_status(&mut self, presenter: &Presenter) -> Result<(), Self::Error>;
}

pub mod draw;
pub mod snapshot;

mod headless;
pub use self::headless::HeadlessSurface;

#[cfg(feature = "gstreamer_display")]
mod gstreamer_display;
#[cfg(feature = "gstreamer_display")]
pub use self::gstreamer_display::{GStreamerDisplay, GStreamerDisplayError};

/// 保持宽高比缩放到视口内
pub fn fit_to_viewport(image: &RgbImage, viewport: (u32, u32)) -> RgbImage {
  let (width, height) = image.dimensions();
  let (view_w, view_h) = viewport;
  if width == 0 || height == 0 || view_w == 0 || view_h == 0 {
    return image.clone();
  }

  let scale = (view_w as f64 / width as f64).min(view_h as f64 / height as f64);
  let target_w = ((width as f64 * scale).round() as u32).clamp(1, view_w);
  let target_h = ((height as f64 * scale).round() as u32).clamp(1, view_h);

  if (target_w, target_h) == (width, height) {
    return image.clone();
  }
  image::imageops::resize(image, target_w, target_h, FilterType::CatmullRom)
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "gstreamer_display")]
  #[error("GStreamer 显示错误: {0}")]
  GStreamerDisplayError(#[from] GStreamerDisplayError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的显示面
pub enum SurfaceWrapper {
  Headless(HeadlessSurface),
  #[cfg(feature = "gstreamer_display")]
  GStreamerDisplay(GStreamerDisplay),
}

impl FromUrl for SurfaceWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      HeadlessSurface::SCHEME => Ok(SurfaceWrapper::Headless(HeadlessSurface::from_url(url)?)),
      #[cfg(feature = "gstreamer_display")]
      GStreamerDisplay::SCHEME => Ok(SurfaceWrapper::GStreamerDisplay(
        GStreamerDisplay::from_url(url)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Surface for SurfaceWrapper {
  type Error = OutputError;

  fn viewport(&self) -> (u32, u32) {
    match self {
      SurfaceWrapper::Headless(surface) => surface.viewport(),
      #[cfg(feature = "gstreamer_display")]
      SurfaceWrapper::GStreamerDisplay(surface) => surface.viewport(),
    }
  }

  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    match self {
      SurfaceWrapper::Headless(surface) => surface.present(image).map_err(|e| match e {}),
      #[cfg(feature = "gstreamer_display")]
      SurfaceWrapper::GStreamerDisplay(surface) => surface.present(image).map_err(OutputError::from),
    }
  }

  fn update_status(&mut self, presenter: &Presenter) -> Result<(), Self::Error> {
    match self {
      SurfaceWrapper::Headless(surface) => surface.update_status(presenter).map_err(|e| match e {}),
      #[cfg(feature = "gstreamer_display")]
      SurfaceWrapper::GStreamerDisplay(surface) => surface
        .update_status(presenter)
        .map_err(OutputError::from),
    }
  }
}
