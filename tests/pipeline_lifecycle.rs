mod common;

use codescan::camera::{CameraInfo, CameraLock, LensFacing, SessionState, SyntheticBackend, SyntheticConfig};
use codescan::convert::{ConverterKind, SinkFactory};
use codescan::geometry::{DeviceOrientation, NormalizedRect, Resolution};
use codescan::{ErrorKind, ScanError, ScanPipeline};
use common::{eventually, pipeline, pump_until, test_config, Recorder, Seen};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn open(p: &mut codescan::ScanPipeline, orientation: DeviceOrientation, width: u32, height: u32) {
    p.set_preview_size(width, height).unwrap();
    p.open_camera(orientation).unwrap();
}

#[test]
fn test_open_reports_upright_size_and_rotation() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Up, 720, 1280);
    assert!(pump_until(&mut p, &mut recorder, WAIT, Recorder::opened));
    assert_eq!(
        recorder.lifecycle,
        vec![Seen::OpenSuccess {
            width: 720,
            height: 1280,
            rotation: 0
        }]
    );
    assert_eq!(p.state(), SessionState::Streaming);
    assert!(!camera_lock.is_held());

    p.close_camera();
    assert_eq!(p.state(), SessionState::Idle);
}

#[test]
fn test_close_during_open_leaks_nothing() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig {
        open_delay: Duration::from_millis(200),
        ..SyntheticConfig::default()
    });
    let stats = backend.stats();
    let mut first = pipeline(backend, &camera_lock, test_config());

    open(&mut first, DeviceOrientation::Left, 1280, 720);
    first.close_camera();

    assert_eq!(first.state(), SessionState::Idle);
    assert_eq!(stats.live_devices(), 0);
    assert_eq!(stats.unclosed_drops(), 0);
    assert!(!camera_lock.is_held());

    // A fresh instance gets the camera within the lock timeout.
    let second_backend = SyntheticBackend::new(SyntheticConfig::default());
    let second_stats = second_backend.stats();
    let mut second = pipeline(second_backend, &camera_lock, test_config());
    let mut recorder = Recorder::default();
    open(&mut second, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut second, &mut recorder, Duration::from_millis(2500), Recorder::opened));
    assert_eq!(second_stats.live_devices(), 1);

    drop(second);
    assert_eq!(second_stats.live_devices(), 0);
    assert_eq!(stats.peak_live_devices(), 1);
}

#[test]
fn test_rapid_reopen_never_overlaps_devices() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig {
        open_delay: Duration::from_millis(20),
        ..SyntheticConfig::default()
    });
    let stats = backend.stats();
    let mut p = pipeline(backend, &camera_lock, test_config());
    p.set_preview_size(1280, 720).unwrap();

    for orientation in DeviceOrientation::ALL.into_iter().cycle().take(8) {
        p.open_camera(orientation).unwrap();
        p.close_camera();
    }

    assert_eq!(stats.live_devices(), 0);
    assert!(stats.peak_live_devices() <= 1);
    assert_eq!(stats.unclosed_drops(), 0);
}

#[test]
fn test_lock_timeout_is_an_open_error() {
    let camera_lock = CameraLock::new();
    let mut config = test_config();
    config.camera.lock_timeout_ms = 100;
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, config);
    let mut recorder = Recorder::default();

    let guard = camera_lock.try_acquire_for(Duration::ZERO).unwrap();
    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.lifecycle.is_empty()));
    assert_eq!(recorder.lifecycle, vec![Seen::OpenError(ErrorKind::LockTimeout)]);
    assert_eq!(p.state(), SessionState::Error(ErrorKind::LockTimeout));

    drop(guard);
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, WAIT, Recorder::opened));
}

#[test]
fn test_no_permission() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig {
        permission_granted: false,
        ..SyntheticConfig::default()
    });
    let mut p = pipeline(backend, &camera_lock, test_config());
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Up, 720, 1280);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.lifecycle.is_empty()));
    assert_eq!(recorder.lifecycle, vec![Seen::NoPermission]);
    assert!(!camera_lock.is_held());
}

#[test]
fn test_device_failures_release_everything() {
    for config in [
        SyntheticConfig {
            fail_open: true,
            ..SyntheticConfig::default()
        },
        SyntheticConfig {
            fail_configure: true,
            ..SyntheticConfig::default()
        },
        SyntheticConfig {
            reject_repeating: true,
            ..SyntheticConfig::default()
        },
    ] {
        let expected = if config.fail_open {
            ErrorKind::DeviceUnavailable
        } else {
            ErrorKind::ConfigurationFailed
        };
        let camera_lock = CameraLock::new();
        let backend = SyntheticBackend::new(config);
        let stats = backend.stats();
        let mut p = pipeline(backend, &camera_lock, test_config());
        let mut recorder = Recorder::default();

        open(&mut p, DeviceOrientation::Left, 1280, 720);
        assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.lifecycle.is_empty()));
        assert_eq!(recorder.lifecycle, vec![Seen::OpenError(expected)]);
        assert_eq!(stats.live_devices(), 0);
        assert_eq!(stats.live_sessions(), 0);
        assert!(!camera_lock.is_held());
    }
}

#[test]
fn test_disconnect_tears_down() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig {
        frame_interval: Duration::from_millis(5),
        disconnect_after_frames: Some(5),
        ..SyntheticConfig::default()
    });
    let stats = backend.stats();
    let mut p = pipeline(backend, &camera_lock, test_config());
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| r.lifecycle.contains(&Seen::Disconnected)));
    assert_eq!(p.state(), SessionState::Error(ErrorKind::Disconnected));
    assert_eq!(stats.live_devices(), 0);
    assert!(!camera_lock.is_held());

    // Reopening after a disconnect works.
    recorder.lifecycle.clear();
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, WAIT, Recorder::opened));
}

#[test]
fn test_flash_toggles_torch() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig::default());
    let stats = backend.stats();
    let mut p = pipeline(backend, &camera_lock, test_config());
    let mut recorder = Recorder::default();

    p.open_flash();
    assert!(!p.is_flash_on());

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, Recorder::opened));

    p.open_flash();
    assert!(eventually(WAIT, || p.is_flash_on() && stats.torch_on()));
    p.close_flash();
    assert!(eventually(WAIT, || !p.is_flash_on() && !stats.torch_on()));

    p.open_flash();
    assert!(eventually(WAIT, || p.is_flash_on()));
    p.close_camera();
    assert!(!p.is_flash_on());
    assert!(!stats.torch_on());
}

#[test]
fn test_brightness_and_misses_are_reported() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.brightness.is_empty() && r.decodes.len() >= 2));
    // Synthetic frames are flat mid-gray.
    assert_eq!(recorder.brightness, vec![128]);
    assert!(recorder.decodes.iter().all(|d| d.text.is_none()));
    assert!(recorder.confirmed.is_empty());
}

#[test]
fn test_brightness_feedback_can_be_disabled() {
    let camera_lock = CameraLock::new();
    let mut config = test_config();
    config.camera.brightness_feedback = false;
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, config);
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| r.decodes.len() >= 2));
    assert!(recorder.brightness.is_empty());
}

#[test]
fn test_region_of_interest_follows_orientation() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    // Before the stream size is known the whole frame is decoded.
    p.set_preview_size(720, 1280).unwrap();
    p.set_region_of_interest(0, 0, 360, 640);
    assert_eq!(p.crop(), NormalizedRect::FULL);

    p.open_camera(DeviceOrientation::Up).unwrap();
    assert!(pump_until(&mut p, &mut recorder, WAIT, Recorder::opened));
    // Top-left quarter of a portrait view is the bottom-left quarter of the landscape sensor.
    assert_eq!(p.crop(), NormalizedRect::new(0.0, 0.5, 0.5, 1.0));

    p.set_region_of_interest(100, 100, 100, 400);
    assert!(p.crop().is_empty());

    p.clear_region_of_interest();
    assert_eq!(p.crop(), NormalizedRect::FULL);
}

#[test]
fn test_open_needs_preview_size() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    assert!(p.open_camera(DeviceOrientation::Up).is_err());
    assert_eq!(p.state(), SessionState::Idle);
}

#[test]
fn test_legacy_session_streams() {
    let camera_lock = CameraLock::new();
    let mut config = test_config();
    config.camera.api = codescan::camera::CameraApi::Legacy;
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, config);
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Right, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| r.opened() && !r.decodes.is_empty()));
    assert_eq!(
        recorder.lifecycle[0],
        Seen::OpenSuccess {
            width: 1280,
            height: 720,
            rotation: 90
        }
    );
}

#[test]
fn test_converter_failure_is_an_open_error() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig::default());
    let stats = backend.stats();
    let requested = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requested);
    let mut p = ScanPipeline::builder()
        .backend(backend)
        .camera_lock(camera_lock.clone())
        .config(test_config())
        .sink_factory(SinkFactory::new(move |kind, input, output, _callback| {
            seen.lock().unwrap().push((kind, input, output));
            Err(ScanError::GpuResource("texture allocation failed".into()))
        }))
        .build()
        .unwrap();
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.lifecycle.is_empty()));
    assert_eq!(recorder.lifecycle, vec![Seen::OpenError(ErrorKind::GpuResource)]);
    assert_eq!(p.state(), SessionState::Error(ErrorKind::GpuResource));
    assert!(!camera_lock.is_held());
    assert_eq!(stats.live_devices(), 0);
    assert_eq!(stats.devices_opened(), 0);
    assert_eq!(
        *requested.lock().unwrap(),
        vec![(
            ConverterKind::ImageReader,
            Resolution::new(1280, 720),
            Resolution::new(1280, 720)
        )]
    );
}

#[test]
fn test_oversized_stream_fails_gpu_open() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig {
        cameras: vec![CameraInfo {
            id: "huge".into(),
            name: "Huge Sensor".into(),
            facing: LensFacing::Back,
            output_sizes: vec![Resolution::new(100_000, 100_000)],
        }],
        ..SyntheticConfig::default()
    });
    let stats = backend.stats();
    let mut config = test_config();
    config.camera.converter = ConverterKind::Gpu;
    let mut p = pipeline(backend, &camera_lock, config);
    let mut recorder = Recorder::default();

    open(&mut p, DeviceOrientation::Left, 1280, 720);
    assert!(pump_until(&mut p, &mut recorder, WAIT, |r| !r.lifecycle.is_empty()));
    assert_eq!(recorder.lifecycle, vec![Seen::OpenError(ErrorKind::GpuResource)]);
    assert!(!camera_lock.is_held());
    assert_eq!(stats.live_devices(), 0);
}
