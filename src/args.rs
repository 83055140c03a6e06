// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use capcheck::config::{
  AppConfig, CameraConfig, DEFAULT_ANALOGUE_GAIN, DEFAULT_BUFFER_COUNT, DEFAULT_CUTOFF, DEFAULT_DISPLAY_THRESHOLD,
  DEFAULT_FRAME_RATE, DEFAULT_SAVE_DIRECTORY, DetectionConfig, Orientation, PixelFormat,
  PresentationConfig,
};

/// 解析 `宽x高` 形式的尺寸
fn parse_size(s: &str) -> Result<(u32, u32), String> {
  let (w, h) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("尺寸格式应为 宽x高: {}", s))?;
  let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
  let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
  if w == 0 || h == 0 {
    return Err(format!("尺寸不能为零: {}", s));
  }
  Ok((w, h))
}

fn parse_gain(s: &str) -> Result<f32, String> {
  let value = s.parse::<f32>().map_err(|e| e.to_string())?;
  if !value.is_finite() || value < 1.0 {
    return Err(format!("增益不能小于 1.0: {}", value));
  }
  Ok(value)
}

fn parse_unit(s: &str) -> Result<f32, String> {
  let value = s.parse::<f32>().map_err(|e| e.to_string())?;
  if !(0.0..=1.0).contains(&value) {
    return Err(format!("取值应在 0.0 - 1.0 之间: {}", value));
  }
  Ok(value)
}

/// Capcheck 瓶盖质检参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头来源
  /// 支持格式:
  /// - 静态图片: image:///path/to/cap.jpg
  /// - GStreamer: gst://libcamera, gst://camera/dev/video0, gst://test
  /// - V4L2: v4l:///dev/video0
  #[arg(long, value_name = "SOURCE", default_value = "gst://libcamera")]
  pub camera: Url,

  /// 检测模型（yolo26:///model.rknn 或 onnx:///model.onnx），不指定时关闭检测
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 显示面（headless:// 或 gstdisplay://）
  #[arg(long, value_name = "SURFACE", default_value = "headless://local")]
  pub surface: Url,

  /// 采集分辨率
  #[arg(long, value_name = "WxH", default_value = "1280x720", value_parser = parse_size)]
  pub resolution: (u32, u32),

  /// 像素格式（RGB888、BGR888、YUYV）
  #[arg(long, value_name = "FORMAT", default_value = "RGB888")]
  pub pixel_format: PixelFormat,

  /// 帧率
  #[arg(long, value_name = "FPS", default_value_t = DEFAULT_FRAME_RATE)]
  pub frame_rate: u32,

  /// 驱动缓冲区数量
  #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_BUFFER_COUNT)]
  pub buffer_count: u32,

  /// 手动曝光时间（微秒）
  #[arg(long, value_name = "US", default_value_t = 20_000, value_parser = clap::value_parser!(u64).range(1..))]
  pub exposure_us: u64,

  /// 模拟增益
  #[arg(long, value_name = "GAIN", default_value_t = DEFAULT_ANALOGUE_GAIN, value_parser = parse_gain)]
  pub analogue_gain: f32,

  /// 关闭默认的 180 度旋转
  #[arg(long)]
  pub no_flip: bool,

  /// 模型输出的保留阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = DEFAULT_CUTOFF, value_parser = parse_unit)]
  pub cutoff: f32,

  /// 界面阈值初始值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = DEFAULT_DISPLAY_THRESHOLD, value_parser = parse_unit)]
  pub threshold: f32,

  /// 抓拍保存目录
  #[arg(long, value_name = "DIR", default_value = DEFAULT_SAVE_DIRECTORY)]
  pub save_dir: PathBuf,

  /// 显示视口
  #[arg(long, value_name = "WxH", default_value = "640x480", value_parser = parse_size)]
  pub viewport: (u32, u32),

  /// 采集周期（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 30)]
  pub tick_ms: u64,

  /// 最大周期数（0 表示无限制）
  #[arg(long, value_name = "COUNT", default_value_t = 0)]
  pub max_ticks: u64,

  /// 启动后立即打开摄像头
  #[arg(long)]
  pub autostart: bool,
}

impl Args {
  pub fn to_config(&self) -> AppConfig {
    AppConfig {
      camera: CameraConfig {
        source: self.camera.clone(),
        resolution: self.resolution,
        pixel_format: self.pixel_format,
        frame_rate: self.frame_rate,
        buffer_count: self.buffer_count,
        orientation: if self.no_flip {
          Orientation::IDENTITY
        } else {
          Orientation::ROTATE_180
        },
        exposure_time: Duration::from_micros(self.exposure_us),
        analogue_gain: self.analogue_gain,
      },
      detection: DetectionConfig {
        model: self.model.clone(),
        cutoff: self.cutoff,
        display_threshold: self.threshold,
      },
      presentation: PresentationConfig {
        viewport: self.viewport,
        tick_period: Duration::from_millis(self.tick_ms.max(1)),
        save_directory: self.save_dir.clone(),
      },
    }
  }
}
