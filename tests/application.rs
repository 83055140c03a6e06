// 该文件是 Capcheck （瓶盖质检） 项目的一部分。
// tests/application.rs - 应用端到端测试
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

use std::ops::ControlFlow;

use capcheck::{
  acquisition::LoopState,
  app::{Application, Command, Tone},
  camera::UrlCameraSource,
  config::{AppConfig, Orientation},
  detector::BottleCapDetector,
  output::HeadlessSurface,
};
use common::{Failure, ScriptedModel, ScriptedSource, pattern_frame, test_config};
use image::{Rgb, RgbImage};
use url::Url;

type App = Application<ScriptedSource, BottleCapDetector<ScriptedModel>, HeadlessSurface>;

fn app(source: ScriptedSource, model: Option<ScriptedModel>, viewport: (u32, u32)) -> App {
  let detector = model.map(|m| BottleCapDetector::new(m).unwrap());
  Application::new(&test_config(), source, detector, HeadlessSurface::new(viewport))
}

#[test]
fn start_detect_and_render_one_defect() {
  let mut app = app(
    ScriptedSource::new(pattern_frame(64, 48)),
    Some(ScriptedModel::single(0.9, [0.25, 0.5, 0.5, 0.75])),
    (64, 48),
  );
  assert_eq!(app.presenter().status_message(), "Ready");

  app.start_camera();
  assert_eq!(app.state(), LoopState::Running);
  assert_eq!(app.presenter().camera_label(), "Camera: Running");
  assert_eq!(app.presenter().start_button_label(), "Stop Camera");
  assert_eq!(app.presenter().status_message(), "Camera running");
  assert!(app.presenter().capture_enabled());

  app.tick().unwrap();
  assert_eq!(
    app.presenter().detection_label(),
    "Defects detected! Confidence: 0.90"
  );
  assert_eq!(app.presenter().detection_tone(), Tone::Alert);

  let shown = app.surface().last_image().unwrap();
  assert_eq!(shown.dimensions(), (64, 48));
  assert_eq!(shown.get_pixel(16, 24).0, [0, 255, 0]);
  assert_eq!(shown.get_pixel(32, 36).0, [0, 255, 0]);
}

#[test]
fn zero_detections_show_clear_label() {
  let mut app = app(
    ScriptedSource::new(pattern_frame(32, 32)),
    Some(ScriptedModel::single(0.3, [0.1, 0.1, 0.2, 0.2])),
    (32, 32),
  );
  app.start_camera();
  app.tick().unwrap();

  assert_eq!(app.presenter().detection_label(), "No defects detected");
  assert_eq!(app.presenter().detection_tone(), Tone::Clear);
  assert_eq!(
    app.surface().last_image().unwrap(),
    &pattern_frame(32, 32).to_rgb_image()
  );
}

#[test]
fn inference_failure_shows_degraded_label_and_raw_frame() {
  let mut app = app(
    ScriptedSource::new(pattern_frame(32, 32)),
    Some(ScriptedModel::failing("npu reset")),
    (32, 32),
  );
  app.start_camera();
  app.tick().unwrap();

  assert_eq!(app.presenter().detection_label(), "Detection error");
  assert_eq!(app.presenter().detection_tone(), Tone::Degraded);
  assert_eq!(
    app.surface().last_image().unwrap(),
    &pattern_frame(32, 32).to_rgb_image()
  );
  assert_eq!(app.state(), LoopState::Running);
}

#[test]
fn frames_are_fitted_to_viewport() {
  let mut app = app(ScriptedSource::new(pattern_frame(128, 72)), None, (64, 64));
  app.start_camera();
  app.tick().unwrap();
  assert_eq!(app.surface().last_image().unwrap().dimensions(), (64, 36));
}

#[test]
fn capture_without_camera_writes_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let target = dir.path().join("captures");
  let mut app = app(ScriptedSource::new(pattern_frame(8, 8)), None, (8, 8));
  app.settings_mut().set_save_directory(&target);

  assert_eq!(app.capture_image().unwrap(), None);
  assert!(!target.exists());
  assert_eq!(app.presenter().status_message(), "Ready");
}

#[test]
fn captures_in_same_second_are_distinct() {
  let dir = tempfile::tempdir().unwrap();
  let mut app = app(ScriptedSource::new(pattern_frame(16, 16)), None, (16, 16));
  app.settings_mut().set_save_directory(dir.path());
  app.start_camera();

  let first = app.capture_image().unwrap().unwrap();
  let second = app.capture_image().unwrap().unwrap();

  assert_ne!(first, second);
  assert!(first.exists() && second.exists());
  assert_eq!(
    app.presenter().status_message(),
    format!("Image saved as {}", second.display())
  );
}

#[test]
fn capture_into_unwritable_directory_reports_error() {
  let dir = tempfile::tempdir().unwrap();
  let blocker = dir.path().join("file");
  std::fs::write(&blocker, b"not a directory").unwrap();

  let mut app = app(ScriptedSource::new(pattern_frame(16, 16)), None, (16, 16));
  app.settings_mut().set_save_directory(&blocker);
  app.start_camera();

  assert!(app.capture_image().is_err());
  assert!(
    app
      .presenter()
      .status_message()
      .starts_with("Error capturing image: ")
  );
  assert_eq!(app.state(), LoopState::Running);
}

#[test]
fn start_failure_reports_error_and_stays_stopped() {
  let mut app = app(
    ScriptedSource::failing(pattern_frame(8, 8), Failure::Open),
    None,
    (8, 8),
  );
  app.start_camera();

  assert_eq!(app.state(), LoopState::Stopped);
  assert!(!app.timer_active());
  assert_eq!(app.presenter().camera_label(), "Camera: Stopped");
  assert!(app.presenter().status_message().starts_with("Error: "));
}

#[test]
fn commands_drive_the_application() {
  let mut app = app(ScriptedSource::new(pattern_frame(8, 8)), None, (8, 8));

  assert!(app.handle(Command::Toggle).is_continue());
  assert_eq!(app.state(), LoopState::Running);
  assert!(app.handle(Command::Toggle).is_continue());
  assert_eq!(app.state(), LoopState::Stopped);
  assert_eq!(app.presenter().status_message(), "Camera stopped");

  assert!(app.handle(Command::Stop).is_continue());
  assert_eq!(app.state(), LoopState::Stopped);

  assert!(app.handle(Command::Threshold(1.4)).is_continue());
  assert_eq!(app.settings().threshold(), 1.0);
  assert_eq!(app.presenter().threshold_label(), "Threshold: 1.00");

  assert!(app.handle(Command::Detect(false)).is_continue());
  assert!(!app.settings().detection_active());

  assert_eq!(app.handle(Command::Quit), ControlFlow::Break(()));
}

#[test]
fn still_image_camera_runs_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cap.png");
  let mut source_image = RgbImage::from_pixel(40, 30, Rgb([10, 20, 30]));
  source_image.put_pixel(0, 0, Rgb([250, 250, 250]));
  source_image.save(&path).unwrap();

  let url = Url::parse(&format!("image://{}", path.display())).unwrap();
  let mut config = AppConfig::new(url);
  config.camera.resolution = (40, 30);
  config.camera.orientation = Orientation::IDENTITY;

  let source = UrlCameraSource::new(&config.camera);
  let mut app: Application<_, BottleCapDetector<ScriptedModel>, _> =
    Application::new(&config, source, None, HeadlessSurface::new((40, 30)));

  app.start_camera();
  assert_eq!(app.state(), LoopState::Running);
  app.tick().unwrap();
  app.tick().unwrap();

  let surface = app.surface();
  assert_eq!(surface.presented(), 2);
  let shown = surface.last_image().unwrap();
  assert_eq!(shown.get_pixel(0, 0).0, [250, 250, 250]);
  assert_eq!(shown.get_pixel(5, 5).0, [10, 20, 30]);

  app.shutdown();
  assert_eq!(app.state(), LoopState::Stopped);
  assert_eq!(app.presenter().camera_label(), "Camera: Stopped");
}
