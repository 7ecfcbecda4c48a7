#![allow(dead_code)]

use codescan::camera::{CameraLock, SyntheticBackend};
use codescan::config::ScannerConfig;
use codescan::convert::ConverterKind;
use codescan::decode::DecodeResult;
use codescan::{ErrorKind, ScanError, ScanListener, ScanPipeline};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    OpenSuccess { width: u32, height: u32, rotation: u32 },
    OpenError(ErrorKind),
    NoPermission,
    Disconnected,
}

/// Records everything a pipeline reports.
#[derive(Default)]
pub struct Recorder {
    pub lifecycle: Vec<Seen>,
    pub brightness: Vec<u8>,
    pub decodes: Vec<DecodeResult>,
    pub confirmed: Vec<String>,
}

impl Recorder {
    pub fn opened(&self) -> bool {
        self.lifecycle.iter().any(|s| matches!(s, Seen::OpenSuccess { .. }))
    }
}

impl ScanListener for Recorder {
    fn on_open_success(&mut self, width: u32, height: u32, rotation_degrees: u32) {
        self.lifecycle.push(Seen::OpenSuccess {
            width,
            height,
            rotation: rotation_degrees,
        });
    }

    fn on_open_error(&mut self, error: &ScanError) {
        self.lifecycle.push(Seen::OpenError(error.kind()));
    }

    fn on_no_permission(&mut self) {
        self.lifecycle.push(Seen::NoPermission);
    }

    fn on_disconnected(&mut self) {
        self.lifecycle.push(Seen::Disconnected);
    }

    fn on_brightness_changed(&mut self, mean_luma: u8) {
        self.brightness.push(mean_luma);
    }

    fn on_decode_complete(&mut self, result: &DecodeResult) {
        self.decodes.push(result.clone());
    }

    fn on_decode_confirmed(&mut self, text: &str, _result: &DecodeResult) {
        self.confirmed.push(text.to_string());
    }
}

/// CPU converter, short lock timeout.
pub fn test_config() -> ScannerConfig {
    let mut config = ScannerConfig::default();
    config.camera.converter = ConverterKind::ImageReader;
    config.camera.lock_timeout_ms = 1000;
    config
}

pub fn pipeline(backend: SyntheticBackend, camera_lock: &CameraLock, config: ScannerConfig) -> ScanPipeline {
    ScanPipeline::builder()
        .backend(backend)
        .camera_lock(camera_lock.clone())
        .config(config)
        .build()
        .unwrap()
}

/// Dispatches events until `done` holds or `timeout` passes.
pub fn pump_until(
    pipeline: &mut ScanPipeline,
    recorder: &mut Recorder,
    timeout: Duration,
    done: impl Fn(&Recorder) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done(recorder) {
            return true;
        }
        pipeline.dispatch(recorder, Duration::from_millis(20));
    }
    done(recorder)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// A QR symbol rendered black on white with a four-module quiet zone.
pub fn qr_image(payload: &str, module_px: u32) -> image::DynamicImage {
    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4;
    let side = (modules + 2 * quiet) * module_px;

    let image = image::GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / module_px, y / module_px);
        let dark = mx >= quiet
            && my >= quiet
            && mx < quiet + modules
            && my < quiet + modules
            && colors[((my - quiet) * modules + (mx - quiet)) as usize] == qrcode::Color::Dark;
        image::Luma([if dark { 0 } else { 255 }])
    });
    image::DynamicImage::ImageLuma8(image)
}
