// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/output/headless.rs - 无窗口显示面
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

use std::convert::Infallible;

use image::RgbImage;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  app::Presenter,
  config::DEFAULT_VIEWPORT,
  output::{OutputError, Surface},
};

/// 只保留最后一帧与状态文本，状态变化写入日志
#[derive(Debug)]
pub struct HeadlessSurface {
  viewport: (u32, u32),
  last_image: Option<RgbImage>,
  last_status: Option<String>,
  presented: u64,
}

impl HeadlessSurface {
  pub fn new(viewport: (u32, u32)) -> Self {
    Self {
      viewport,
      last_image: None,
      last_status: None,
      presented: 0,
    }
  }

  pub fn last_image(&self) -> Option<&RgbImage> {
    self.last_image.as_ref()
  }

  pub fn last_status(&self) -> Option<&str> {
    self.last_status.as_deref()
  }

  pub fn presented(&self) -> u64 {
    self.presented
  }
}

impl Default for HeadlessSurface {
  fn default() -> Self {
    Self::new(DEFAULT_VIEWPORT)
  }
}

impl FromUrlWithScheme for HeadlessSurface {
  const SCHEME: &'static str = "headless";
}

impl FromUrl for HeadlessSurface {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut viewport = DEFAULT_VIEWPORT;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "width" => viewport.0 = value.parse().unwrap_or(viewport.0),
        "height" => viewport.1 = value.parse().unwrap_or(viewport.1),
        _ => {}
      }
    }

    Ok(Self::new(viewport))
  }
}

impl Surface for HeadlessSurface {
  type Error = Infallible;

  fn viewport(&self) -> (u32, u32) {
    self.viewport
  }

  fn present(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    self.last_image = Some(image.clone());
    self.presented += 1;
    Ok(())
  }

  fn update_status(&mut self, presenter: &Presenter) -> Result<(), Self::Error> {
    let status = presenter.summary();
    if self.last_status.as_deref() != Some(status.as_str()) {
      info!("{}", status);
      self.last_status = Some(status);
    }
    Ok(())
  }
}
