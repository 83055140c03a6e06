// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/task.rs - 周期任务
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

use std::{
  ops::ControlFlow,
  thread,
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, info, warn};

/// 中断后强制退出前的等待时间
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// 在当前线程上按固定周期重复执行回调
///
/// 每次回调返回后，下一个截止时间为 `max(上一个截止时间 + 周期, 当前时间)`，
/// 因此回调之间不会重叠，超时的回调只会推迟下一次执行，不会补跑。
#[derive(Debug, Clone)]
pub struct RepeatingTask {
  period: Duration,
  max_ticks: Option<u64>,
}

impl RepeatingTask {
  pub fn new(period: Duration) -> Self {
    Self {
      period,
      max_ticks: None,
    }
  }

  pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
    self.max_ticks = max_ticks.filter(|&n| n > 0);
    self
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  /// 运行直到回调返回 `Break` 或达到次数上限，返回执行的次数
  pub fn run<F>(&self, mut tick: F) -> u64
  where
    F: FnMut() -> ControlFlow<()>,
  {
    info!("开始周期任务，周期: {:.2?}", self.period);
    let mut deadline = Instant::now();
    let mut count = 0u64;

    loop {
      let now = Instant::now();
      if deadline > now {
        thread::sleep(deadline - now);
      }

      count += 1;
      if tick().is_break() {
        debug!("回调请求退出");
        break;
      }
      if self.max_ticks.is_some_and(|n| count >= n) {
        info!("达到指定次数 {}, 退出任务循环", count);
        break;
      }

      deadline = (deadline + self.period).max(Instant::now());
    }

    info!("周期任务结束，共执行 {} 次", count);
    count
  }
}

/// 注册 Ctrl-C 处理；超时未退出时强制结束进程
pub fn install_interrupt_handler<F>(on_interrupt: F) -> anyhow::Result<()>
where
  F: Fn() + Send + 'static,
{
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    on_interrupt();
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_AFTER);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")
}
