mod common;

use codescan::camera::{CameraLock, SyntheticBackend, SyntheticConfig};
use codescan::decode::{DecodeEngine, Symbol, SymbolType};
use codescan::geometry::{DeviceOrientation, NormalizedRect, PixelRect};
use codescan::ScanPipeline;
use common::{pipeline, pump_until, qr_image, test_config, Recorder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const PAYLOAD: &str = "HELLO-WORLD-123";

fn open_still(image: &image::DynamicImage, camera_lock: &CameraLock) -> ScanPipeline {
    let backend = SyntheticBackend::new(SyntheticConfig {
        frame_interval: Duration::from_millis(10),
        ..SyntheticConfig::still_image(image)
    });
    let mut p = pipeline(backend, camera_lock, test_config());
    p.set_preview_size(image.width(), image.height()).unwrap();
    p.open_camera(DeviceOrientation::Left).unwrap();
    p
}

#[test]
fn test_qr_stream_is_confirmed_once() {
    let camera_lock = CameraLock::new();
    let mut p = open_still(&qr_image(PAYLOAD, 6), &camera_lock);
    let mut recorder = Recorder::default();

    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(10), |r| !r.confirmed.is_empty()));
    // Keep streaming the same symbol; it must not be confirmed again.
    pump_until(&mut p, &mut recorder, Duration::from_millis(300), |_| false);
    assert_eq!(recorder.confirmed, vec![PAYLOAD.to_string()]);

    let hit = recorder.decodes.iter().find(|d| d.text.is_some()).unwrap();
    assert_eq!(hit.text.as_deref(), Some(PAYLOAD));
    assert_eq!(hit.symbol_type, Some(SymbolType::QrCode));
    assert_eq!(hit.symbol_type.map(SymbolType::code), Some(64));
    assert_eq!(hit.request_code, 0);
}

#[test]
fn test_still_image_round_trip() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    p.decode_for_result(&qr_image(PAYLOAD, 4), NormalizedRect::FULL, 7).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));
    assert_eq!(recorder.decodes[0].text.as_deref(), Some(PAYLOAD));
    assert_eq!(recorder.decodes[0].request_code, 7);
    // One-off requests never count towards confirmation.
    assert!(recorder.confirmed.is_empty());
}

#[test]
fn test_still_image_crop_excludes_symbol() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    let qr = qr_image(PAYLOAD, 4).to_luma8();
    let mut canvas = image::GrayImage::from_pixel(qr.width() * 2, qr.height(), image::Luma([255]));
    image::imageops::overlay(&mut canvas, &qr, 0, 0);
    let canvas = image::DynamicImage::ImageLuma8(canvas);

    p.decode_for_result(&canvas, NormalizedRect::new(0.5, 0.0, 1.0, 1.0), 1).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| r.decodes.len() == 1));
    assert_eq!(recorder.decodes[0].text, None);

    p.decode_for_result(&canvas, NormalizedRect::new(0.0, 0.0, 0.5, 1.0), 2).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| r.decodes.len() == 2));
    assert_eq!(recorder.decodes[1].text.as_deref(), Some(PAYLOAD));
    assert_eq!(recorder.decodes[1].request_code, 2);
}

#[test]
fn test_image_file_round_trip() {
    let path = std::env::temp_dir().join(format!("codescan-qr-{}.png", std::process::id()));
    qr_image(PAYLOAD, 4).save(&path).unwrap();

    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();
    p.decode_file_for_result(&path, NormalizedRect::EMPTY, 3).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));
    assert_eq!(recorder.decodes[0].text.as_deref(), Some(PAYLOAD));

    let _ = std::fs::remove_file(&path);
    assert!(p.decode_file_for_result(&path, NormalizedRect::FULL, 4).is_err());
}

#[test]
fn test_disabled_qr_symbology_finds_nothing() {
    let camera_lock = CameraLock::new();
    let mut config = test_config();
    config.decoder.symbologies = vec![SymbolType::Ean13, SymbolType::Code128];
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, config);
    let mut recorder = Recorder::default();

    p.decode_for_result(&qr_image(PAYLOAD, 4), NormalizedRect::FULL, 1).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));
    assert_eq!(recorder.decodes[0].text, None);
}

/// Takes `delay` per frame and records any overlapping calls.
struct SlowEngine {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

impl DecodeEngine for SlowEngine {
    fn configure_symbologies(&mut self, _symbologies: &[SymbolType]) {}

    fn decode(&mut self, _luma: &[u8], _width: u32, _height: u32, _crop: PixelRect) -> anyhow::Result<Vec<Symbol>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.busy.store(false, Ordering::SeqCst);
        Ok(vec![Symbol {
            text: "A".into(),
            symbol_type: SymbolType::Code128,
            quality: 1,
        }])
    }

    fn release(&mut self) {}
}

#[test]
fn test_slow_decoder_drops_frames() {
    let calls = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));
    let backend = SyntheticBackend::new(SyntheticConfig {
        frame_interval: Duration::from_millis(2),
        ..SyntheticConfig::default()
    });
    let stats = backend.stats();
    let mut p = ScanPipeline::builder()
        .backend(backend)
        .camera_lock(CameraLock::new())
        .config(test_config())
        .engine(SlowEngine {
            delay: Duration::from_millis(100),
            calls: Arc::clone(&calls),
            busy: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::clone(&overlapped),
        })
        .build()
        .unwrap();
    let mut recorder = Recorder::default();

    p.set_preview_size(640, 480).unwrap();
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), Recorder::opened));
    let started = Instant::now();
    pump_until(&mut p, &mut recorder, Duration::from_millis(700), |_| false);
    p.close_camera();
    let elapsed = started.elapsed();

    let calls = calls.load(Ordering::SeqCst) as u64;
    let budget = elapsed.as_millis() as u64 / 100 + 3;
    assert!(calls >= 2);
    assert!(calls <= budget, "{calls} decodes in {elapsed:?}");
    assert!(stats.frames_delivered() > calls * 2);
    assert!(p.dropped_frames() > 0);
    assert!(!overlapped.load(Ordering::SeqCst));
    // Four identical reads in a row confirm exactly once.
    assert_eq!(recorder.confirmed, vec!["A".to_string()]);
}

#[test]
fn test_stop_decode_silences_results() {
    let camera_lock = CameraLock::new();
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, test_config());
    let mut recorder = Recorder::default();

    p.set_preview_size(640, 480).unwrap();
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));

    p.stop_decode();
    assert!(p.wait_decode_idle(Duration::from_secs(5)));
    pump_until(&mut p, &mut recorder, Duration::from_millis(100), |_| false);
    recorder.decodes.clear();
    pump_until(&mut p, &mut recorder, Duration::from_millis(200), |_| false);
    assert!(recorder.decodes.is_empty());

    p.start_decode();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));
}

#[test]
fn test_start_delay_holds_back_decoding() {
    let camera_lock = CameraLock::new();
    let mut config = test_config();
    config.decoder.start_delay_ms = 300;
    let mut p = pipeline(SyntheticBackend::new(SyntheticConfig::default()), &camera_lock, config);
    let mut recorder = Recorder::default();

    p.set_preview_size(640, 480).unwrap();
    let started = Instant::now();
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), |r| !r.decodes.is_empty()));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn test_detach_stops_everything() {
    let camera_lock = CameraLock::new();
    let backend = SyntheticBackend::new(SyntheticConfig::default());
    let stats = backend.stats();
    let mut p = pipeline(backend, &camera_lock, test_config());
    let mut recorder = Recorder::default();

    p.set_preview_size(640, 480).unwrap();
    p.open_camera(DeviceOrientation::Left).unwrap();
    assert!(pump_until(&mut p, &mut recorder, Duration::from_secs(5), Recorder::opened));

    p.detach();
    assert_eq!(stats.live_devices(), 0);
    assert!(!camera_lock.is_held());
    assert!(p.decode_for_result(&qr_image(PAYLOAD, 4), NormalizedRect::FULL, 1).is_err());
}
