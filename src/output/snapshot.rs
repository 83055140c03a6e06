// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// src/output/snapshot.rs - 快照保存
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
  fs::{File, OpenOptions},
  io::{BufWriter, ErrorKind, Write},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::Frame;

pub const SNAPSHOT_PREFIX: &str = "captured_image_";
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

// 同一秒内的最大序号，超过后放弃
const MAX_DISAMBIGUATOR: u32 = 10_000;

#[derive(Error, Debug)]
pub enum SnapshotError {
  #[error("无法创建目录 {path}: {source}")]
  CreateDirectory {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("目录 {0} 中同一时刻的快照过多")]
  Exhausted(PathBuf),
}

/// 把帧保存为带时间戳的 JPEG 文件
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
  quality: u8,
}

impl Default for SnapshotWriter {
  fn default() -> Self {
    Self {
      quality: SNAPSHOT_JPEG_QUALITY,
    }
  }
}

impl SnapshotWriter {
  pub fn with_quality(mut self, quality: u8) -> Self {
    self.quality = quality.clamp(1, 100);
    self
  }

  pub fn file_name(timestamp: &DateTime<Local>, disambiguator: u32) -> String {
    let stamp = timestamp.format(SNAPSHOT_TIMESTAMP_FORMAT);
    if disambiguator == 0 {
      format!("{}{}.jpg", SNAPSHOT_PREFIX, stamp)
    } else {
      format!("{}{}_{}.jpg", SNAPSHOT_PREFIX, stamp, disambiguator)
    }
  }

  /// 独占创建一个尚不存在的文件
  fn reserve(&self, directory: &Path, timestamp: &DateTime<Local>) -> Result<(PathBuf, File), SnapshotError> {
    for disambiguator in 0..MAX_DISAMBIGUATOR {
      let path = directory.join(Self::file_name(timestamp, disambiguator));
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => return Ok((path, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          debug!("快照文件已存在，尝试下一个序号: {}", path.display());
        }
        Err(e) => return Err(SnapshotError::IoError(e)),
      }
    }
    Err(SnapshotError::Exhausted(directory.to_path_buf()))
  }

  pub fn save(&self, frame: &Frame, directory: &Path) -> Result<PathBuf, SnapshotError> {
    self.save_at(frame, directory, &Local::now())
  }

  /// 以指定时间戳保存，返回写入的路径
  pub fn save_at(
    &self,
    frame: &Frame,
    directory: &Path,
    timestamp: &DateTime<Local>,
  ) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(directory).map_err(|source| SnapshotError::CreateDirectory {
      path: directory.to_path_buf(),
      source,
    })?;

    let (path, file) = self.reserve(directory, timestamp)?;
    let image = frame.to_rgb_image();

    let written = (|| -> Result<(), SnapshotError> {
      let mut writer = BufWriter::new(file);
      JpegEncoder::new_with_quality(&mut writer, self.quality).encode_image(&image)?;
      writer.flush()?;
      Ok(())
    })();

    if let Err(e) = written {
      // 不留下半截文件
      let _ = std::fs::remove_file(&path);
      return Err(e);
    }

    info!("快照已保存: {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  fn frame() -> Frame {
    Frame::from(RgbImage::from_pixel(8, 6, Rgb([200, 30, 30])))
  }

  #[test]
  fn file_name_uses_local_timestamp() {
    let timestamp = Local::now();
    let expected = format!("captured_image_{}.jpg", timestamp.format("%Y%m%d_%H%M%S"));
    assert_eq!(SnapshotWriter::file_name(&timestamp, 0), expected);
    assert!(SnapshotWriter::file_name(&timestamp, 2).ends_with("_2.jpg"));
  }

  #[test]
  fn creates_missing_directory_and_writes_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("captures");
    let path = SnapshotWriter::default().save(&frame(), &target).unwrap();

    assert!(path.starts_with(&target));
    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 6));
  }

  #[test]
  fn same_second_saves_get_distinct_paths() {
    let dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::default();
    let timestamp = Local::now();

    let first = writer.save_at(&frame(), dir.path(), &timestamp).unwrap();
    let second = writer.save_at(&frame(), dir.path(), &timestamp).unwrap();

    assert_ne!(first, second);
    assert!(first.exists() && second.exists());
    assert!(second.to_string_lossy().ends_with("_1.jpg"));
  }

  #[test]
  fn directory_blocked_by_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let result = SnapshotWriter::default().save(&frame(), &blocker);
    assert!(matches!(result, Err(SnapshotError::CreateDirectory { .. })));
  }
}
