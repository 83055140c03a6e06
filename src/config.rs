// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/config.rs - 运行配置
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

use std::{path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::frame::ChannelOrder;

pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_RESOLUTION: (u32, u32) = (1280, 720);
pub const DEFAULT_BUFFER_COUNT: u32 = 4;
pub const DEFAULT_EXPOSURE_TIME: Duration = Duration::from_micros(20_000);
pub const DEFAULT_ANALOGUE_GAIN: f32 = 1.0;
pub const DEFAULT_DISPLAY_THRESHOLD: f32 = 0.85;
pub const DEFAULT_CUTOFF: f32 = 0.5;
pub const DEFAULT_SAVE_DIRECTORY: &str = "captured_images";
pub const DEFAULT_VIEWPORT: (u32, u32) = (640, 480);
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(30);

/// 摄像头输出的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
  /// 三字节 RGB，内存中按 B、G、R 排列（libcamera 的 RGB888 约定）
  #[default]
  Rgb888,
  /// 三字节 BGR，内存中按 R、G、B 排列
  Bgr888,
  /// 打包 YUV 4:2:2
  Yuyv,
}

impl PixelFormat {
  /// 采集后帧的通道顺序
  pub fn channel_order(&self) -> ChannelOrder {
    match self {
      PixelFormat::Rgb888 => ChannelOrder::Bgr,
      PixelFormat::Bgr888 => ChannelOrder::Rgb,
      PixelFormat::Yuyv => ChannelOrder::Rgb,
    }
  }

  pub fn fourcc(&self) -> [u8; 4] {
    match self {
      PixelFormat::Rgb888 => *b"BGR3",
      PixelFormat::Bgr888 => *b"RGB3",
      PixelFormat::Yuyv => *b"YUYV",
    }
  }

  /// GStreamer caps 中的格式名
  pub fn caps_name(&self) -> &'static str {
    match self {
      PixelFormat::Rgb888 => "BGR",
      PixelFormat::Bgr888 => "RGB",
      PixelFormat::Yuyv => "YUY2",
    }
  }
}

impl FromStr for PixelFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "RGB888" => Ok(PixelFormat::Rgb888),
      "BGR888" => Ok(PixelFormat::Bgr888),
      "YUYV" | "YUY2" => Ok(PixelFormat::Yuyv),
      other => Err(format!("不支持的像素格式: {}", other)),
    }
  }
}

/// 图像方向变换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation {
  pub hflip: bool,
  pub vflip: bool,
}

impl Orientation {
  pub const IDENTITY: Orientation = Orientation {
    hflip: false,
    vflip: false,
  };

  pub const ROTATE_180: Orientation = Orientation {
    hflip: true,
    vflip: true,
  };

  pub fn is_identity(&self) -> bool {
    !self.hflip && !self.vflip
  }

  /// GStreamer `videoflip` 的 method 值
  pub fn videoflip_method(&self) -> u32 {
    match (self.hflip, self.vflip) {
      (false, false) => 0,
      (true, true) => 2,
      (true, false) => 4,
      (false, true) => 5,
    }
  }

  pub fn apply(&self, image: &mut image::RgbImage) {
    if self.hflip {
      image::imageops::flip_horizontal_in_place(image);
    }
    if self.vflip {
      image::imageops::flip_vertical_in_place(image);
    }
  }
}

impl Default for Orientation {
  fn default() -> Self {
    Orientation::ROTATE_180
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
  pub source: Url,
  pub resolution: (u32, u32),
  pub pixel_format: PixelFormat,
  pub frame_rate: u32,
  pub buffer_count: u32,
  pub orientation: Orientation,
  /// 手动曝光时间，关闭自动曝光
  pub exposure_time: Duration,
  /// 模拟增益，1.0 为不放大
  pub analogue_gain: f32,
}

impl CameraConfig {
  pub fn new(source: Url) -> Self {
    Self {
      source,
      resolution: DEFAULT_RESOLUTION,
      pixel_format: PixelFormat::default(),
      frame_rate: DEFAULT_FRAME_RATE,
      buffer_count: DEFAULT_BUFFER_COUNT,
      orientation: Orientation::default(),
      exposure_time: DEFAULT_EXPOSURE_TIME,
      analogue_gain: DEFAULT_ANALOGUE_GAIN,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
  /// 未指定时不加载模型，检测关闭
  pub model: Option<Url>,
  /// 模型原始输出的固定保留阈值
  pub cutoff: f32,
  /// 界面阈值滑块的初始值
  pub display_threshold: f32,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      model: None,
      cutoff: DEFAULT_CUTOFF,
      display_threshold: DEFAULT_DISPLAY_THRESHOLD,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentationConfig {
  pub viewport: (u32, u32),
  pub tick_period: Duration,
  pub save_directory: PathBuf,
}

impl Default for PresentationConfig {
  fn default() -> Self {
    Self {
      viewport: DEFAULT_VIEWPORT,
      tick_period: DEFAULT_TICK_PERIOD,
      save_directory: PathBuf::from(DEFAULT_SAVE_DIRECTORY),
    }
  }
}

/// 进程级不可变配置，启动时构造后传入各组件
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  pub camera: CameraConfig,
  pub detection: DetectionConfig,
  pub presentation: PresentationConfig,
}

impl AppConfig {
  pub fn new(camera_source: Url) -> Self {
    Self {
      camera: CameraConfig::new(camera_source),
      detection: DetectionConfig::default(),
      presentation: PresentationConfig::default(),
    }
  }
}
