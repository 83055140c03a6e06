// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// tests/acquisition.rs - 采集循环与检测器测试
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

mod common;

use capcheck::{
  acquisition::{AcquisitionLoop, LoopState, TickOutcome},
  detector::{BottleCapDetector, BoundingBox, DefectDetector, Detection},
  error::Fault,
  model::DefectLabel,
  output::draw::Draw,
  session::SessionSettings,
};
use common::{Failure, ScriptedModel, ScriptedSource, pattern_frame, test_config};

type Loop = AcquisitionLoop<ScriptedSource, BottleCapDetector<ScriptedModel>>;

fn settings() -> SessionSettings {
  SessionSettings::from_config(&test_config())
}

fn acquisition(source: ScriptedSource, model: Option<ScriptedModel>) -> Loop {
  let detector = model.map(|m| BottleCapDetector::new(m).unwrap());
  AcquisitionLoop::new(source, test_config().camera, detector)
}

#[test]
fn single_detection_is_reported_and_drawn() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(64, 64)),
    Some(ScriptedModel::single(0.9, [0.25, 0.5, 0.5, 0.75])),
  );
  acquisition.start().unwrap();

  let TickOutcome::Frame { frame, outcome } = acquisition.tick(&settings()) else {
    panic!("expected a frame");
  };
  let outcome = outcome.unwrap();
  assert!(outcome.any_defect);
  assert!((outcome.max_confidence - 0.9).abs() < 1e-6);
  assert_eq!(outcome.detections.len(), 1);
  assert_eq!(
    outcome.detections[0].bbox,
    BoundingBox {
      x_min: 16,
      y_min: 32,
      x_max: 32,
      y_max: 48,
    }
  );

  let image = frame.to_rgb_image();
  assert_eq!(image.get_pixel(16, 32).0, [0, 255, 0]);
  assert_eq!(image.get_pixel(32, 48).0, [0, 255, 0]);
  assert_eq!(image.get_pixel(24, 40).0, pattern_frame(64, 64).to_rgb_image().get_pixel(24, 40).0);
}

#[test]
fn zero_detections_report_no_defect() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(32, 32)),
    Some(ScriptedModel::returning(vec![])),
  );
  acquisition.start().unwrap();

  let TickOutcome::Frame { frame, outcome } = acquisition.tick(&settings()) else {
    panic!("expected a frame");
  };
  let outcome = outcome.unwrap();
  assert!(!outcome.any_defect);
  assert_eq!(outcome.max_confidence, 0.0);
  assert_eq!(frame, pattern_frame(32, 32));
}

#[test]
fn display_threshold_never_filters() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(32, 32)),
    Some(ScriptedModel::single(0.6, [0.1, 0.1, 0.4, 0.4])),
  );
  acquisition.start().unwrap();

  let mut settings = settings();
  for threshold in [0.0, 0.3, 0.59, 0.61, 0.95, 1.0] {
    settings.set_threshold(threshold);
    let TickOutcome::Frame { outcome, .. } = acquisition.tick(&settings) else {
      panic!("expected a frame");
    };
    assert!(outcome.unwrap().any_defect, "threshold {}", threshold);
  }
}

#[test]
fn display_threshold_never_promotes_weak_scores() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(32, 32)),
    Some(ScriptedModel::single(0.4, [0.1, 0.1, 0.4, 0.4])),
  );
  acquisition.start().unwrap();

  let mut settings = settings();
  for threshold in [0.0, 0.3] {
    settings.set_threshold(threshold);
    let TickOutcome::Frame { frame, outcome } = acquisition.tick(&settings) else {
      panic!("expected a frame");
    };
    let outcome = outcome.unwrap();
    assert!(!outcome.any_defect, "threshold {}", threshold);
    assert!(outcome.detections.is_empty());
    assert_eq!(frame, pattern_frame(32, 32));
  }
}

#[test]
fn start_failure_leaves_loop_stopped() {
  let source = ScriptedSource::failing(pattern_frame(8, 8), Failure::Open);
  let mut acquisition = acquisition(source, None);

  assert!(matches!(
    acquisition.start(),
    Err(Fault::CameraUnavailable(_))
  ));
  assert_eq!(acquisition.state(), LoopState::Stopped);
  assert!(!acquisition.timer_active());
  assert!(matches!(acquisition.tick(&settings()), TickOutcome::Idle));
}

#[test]
fn failed_camera_start_closes_the_camera() {
  let source = ScriptedSource::failing(pattern_frame(8, 8), Failure::Start);
  let log = source.log.clone();
  let mut acquisition = acquisition(source, None);

  assert!(acquisition.start().is_err());
  assert_eq!(acquisition.state(), LoopState::Stopped);
  assert!(!acquisition.timer_active());
  assert_eq!(log.borrow().closes, 1);
}

#[test]
fn stop_is_idempotent() {
  let source = ScriptedSource::new(pattern_frame(8, 8));
  let log = source.log.clone();
  let mut acquisition = acquisition(source, None);

  acquisition.stop();
  assert_eq!(log.borrow().closes, 0);

  acquisition.start().unwrap();
  assert_eq!(acquisition.state(), LoopState::Running);
  acquisition.stop();
  acquisition.stop();

  assert_eq!(acquisition.state(), LoopState::Stopped);
  assert!(!acquisition.timer_active());
  let log = log.borrow();
  assert_eq!((log.stops, log.closes), (1, 1));
}

#[test]
fn drop_releases_running_camera() {
  let source = ScriptedSource::new(pattern_frame(8, 8));
  let log = source.log.clone();
  {
    let mut acquisition = acquisition(source, None);
    acquisition.start().unwrap();
  }
  assert_eq!(log.borrow().closes, 1);
}

#[test]
fn capture_failure_skips_tick_and_keeps_running() {
  let source = ScriptedSource::failing(pattern_frame(8, 8), Failure::Capture);
  let mut acquisition = acquisition(source, None);
  acquisition.start().unwrap();

  assert!(matches!(
    acquisition.tick(&settings()),
    TickOutcome::Skipped(Fault::FrameAcquisition(_))
  ));
  assert_eq!(acquisition.state(), LoopState::Running);
  assert!(acquisition.timer_active());
}

#[test]
fn inference_failure_keeps_raw_frame() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(16, 16)),
    Some(ScriptedModel::failing("model not loaded")),
  );
  acquisition.start().unwrap();

  let TickOutcome::Frame { frame, outcome } = acquisition.tick(&settings()) else {
    panic!("expected a frame");
  };
  let outcome = outcome.unwrap();
  assert!(outcome.is_failure());
  assert!(!outcome.any_defect);
  assert_eq!(frame, pattern_frame(16, 16));
  assert_eq!(acquisition.state(), LoopState::Running);
}

#[test]
fn disabled_detection_passes_frame_through() {
  let mut acquisition = acquisition(
    ScriptedSource::new(pattern_frame(16, 16)),
    Some(ScriptedModel::single(0.9, [0.1, 0.1, 0.9, 0.9])),
  );
  acquisition.start().unwrap();

  let mut settings = settings();
  settings.set_detection_active(false);
  let TickOutcome::Frame { frame, outcome } = acquisition.tick(&settings) else {
    panic!("expected a frame");
  };
  assert!(outcome.is_none());
  assert_eq!(frame, pattern_frame(16, 16));
}

#[test]
fn annotate_only_touches_box_and_label() {
  let detector = BottleCapDetector::new(ScriptedModel::returning(vec![])).unwrap();
  let draw = Draw::embedded().unwrap();
  let original = pattern_frame(160, 120);
  let detection = Detection {
    bbox: BoundingBox {
      x_min: 40,
      y_min: 50,
      x_max: 100,
      y_max: 90,
    },
    confidence: 0.87,
    kind: DefectLabel::Stain,
  };

  let annotated = detector.annotate(original.clone(), &[detection.clone()]);
  assert_ne!(annotated, original);

  let before = original.to_rgb_image();
  let after = annotated.to_rgb_image();
  let label = draw.label_region(&detection);
  let bbox = detection.bbox;
  let t = draw.thickness();

  for (x, y, pixel) in after.enumerate_pixels() {
    if pixel == before.get_pixel(x, y) {
      continue;
    }
    let (x, y) = (x as i32, y as i32);
    let on_border = bbox.contains(x, y)
      && (x - bbox.x_min < t || bbox.x_max - x < t || y - bbox.y_min < t || bbox.y_max - y < t);
    let in_label =
      x >= label.left() && x <= label.right() && y >= label.top() && y <= label.bottom();
    assert!(on_border || in_label, "unexpected change at ({}, {})", x, y);
  }
}
