// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{
  io::BufRead,
  ops::ControlFlow,
  sync::mpsc::{self, Sender},
  thread,
};

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};

use capcheck::{
  FromUrl,
  app::{Application, Command},
  camera::UrlCameraSource,
  detector::BottleCapDetector,
  model::ModelWrapper,
  output::SurfaceWrapper,
  task::{RepeatingTask, install_interrupt_handler},
};

/// 从标准输入逐行读取操作命令
fn spawn_command_reader(tx: Sender<Command>) {
  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let line = match line {
        Ok(line) => line,
        Err(e) => {
          warn!("读取标准输入失败: {}", e);
          break;
        }
      };
      if line.trim().is_empty() {
        continue;
      }
      match line.parse::<Command>() {
        Ok(command) => {
          if tx.send(command).is_err() {
            break;
          }
        }
        Err(e) => warn!("{}", e),
      }
    }
    debug!("标准输入已关闭");
  });
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = args.to_config();

  info!("摄像头来源: {}", config.camera.source);
  info!("显示面: {}", args.surface);
  info!("保存目录: {}", config.presentation.save_directory.display());

  let detector = match &config.detection.model {
    Some(url) => {
      info!("正在加载模型: {}", url);
      let model = ModelWrapper::from_url(url)?;
      info!("模型加载完成，保留阈值: {}", config.detection.cutoff);
      Some(BottleCapDetector::with_cutoff(model, config.detection.cutoff)?)
    }
    None => None,
  };

  let surface = SurfaceWrapper::from_url(&args.surface)?;
  let source = UrlCameraSource::new(&config.camera);
  let mut app = Application::new(&config, source, detector, surface);

  let (tx, rx) = mpsc::channel();
  let interrupt_tx = tx.clone();
  install_interrupt_handler(move || {
    let _ = interrupt_tx.send(Command::Quit);
  })?;
  spawn_command_reader(tx);

  if args.autostart {
    app.start_camera();
  }
  app.refresh_status()?;

  let task = RepeatingTask::new(config.presentation.tick_period)
    .with_max_ticks(Some(args.max_ticks));
  task.run(|| {
    while let Ok(command) = rx.try_recv() {
      if app.handle(command).is_break() {
        return ControlFlow::Break(());
      }
    }
    if let Err(e) = app.tick() {
      error!("显示失败: {}", e);
      return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
  });

  app.shutdown();
  Ok(())
}
