//! Scripted camera backend for tests, demos and headless runs.
//!
//! Behaves like an asynchronous camera stack: opens and configures complete on
//! helper threads after configurable delays, and a stream thread pushes frames
//! into every configured target while a repeating request is active.

use super::{
    CameraBackend, CameraDevice, CameraInfo, CaptureRequest, CaptureSession, DeviceCallback, FlashMode,
    LensFacing, StreamConfig,
};
use crate::error::ScanError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::geometry::Resolution;
use crate::utils::lock;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Script for a [`SyntheticBackend`].
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub permission_granted: bool,
    pub cameras: Vec<CameraInfo>,
    /// Frames delivered in a loop. Empty means a mid-gray frame at the stream size.
    pub frames: Vec<VideoFrame>,
    pub frame_interval: Duration,
    pub open_delay: Duration,
    pub configure_delay: Duration,
    pub fail_open: bool,
    pub fail_configure: bool,
    pub reject_repeating: bool,
    /// Report a disconnect after this many frames.
    pub disconnect_after_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            permission_granted: true,
            cameras: vec![CameraInfo {
                id: "synthetic-0".into(),
                name: "Synthetic Camera".into(),
                facing: LensFacing::Back,
                output_sizes: vec![
                    Resolution::new(640, 480),
                    Resolution::new(1280, 720),
                    Resolution::new(1920, 1080),
                ],
            }],
            frames: Vec::new(),
            frame_interval: Duration::from_millis(33),
            open_delay: Duration::ZERO,
            configure_delay: Duration::ZERO,
            fail_open: false,
            fail_configure: false,
            reject_repeating: false,
            disconnect_after_frames: None,
        }
    }
}

impl SyntheticConfig {
    /// A single back camera streaming `image` at its native size.
    pub fn still_image(image: &image::DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let size = Resolution::new(rgb.width().max(1), rgb.height().max(1));
        let frame = VideoFrame::from_data(size.width, size.height, PixelFormat::Rgb, rgb.into_raw());
        Self {
            cameras: vec![CameraInfo {
                id: "synthetic-still".into(),
                name: "Still Image".into(),
                facing: LensFacing::Back,
                output_sizes: vec![size],
            }],
            frames: vec![frame],
            ..Self::default()
        }
    }
}

/// Counters describing what the backend has handed out.
#[derive(Debug, Default)]
pub struct SyntheticStats {
    live_devices: AtomicUsize,
    peak_live_devices: AtomicUsize,
    devices_opened: AtomicUsize,
    unclosed_drops: AtomicUsize,
    live_sessions: AtomicUsize,
    frames_delivered: AtomicU64,
    torch_on: AtomicBool,
    last_request: Mutex<Option<CaptureRequest>>,
}

impl SyntheticStats {
    /// Devices opened and not yet closed.
    pub fn live_devices(&self) -> usize {
        self.live_devices.load(Ordering::SeqCst)
    }

    /// Most devices that were ever open at the same time.
    pub fn peak_live_devices(&self) -> usize {
        self.peak_live_devices.load(Ordering::SeqCst)
    }

    pub fn devices_opened(&self) -> usize {
        self.devices_opened.load(Ordering::SeqCst)
    }

    /// Devices dropped without an explicit close.
    pub fn unclosed_drops(&self) -> usize {
        self.unclosed_drops.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CaptureRequest> {
        *lock(&self.last_request)
    }

    fn device_opened(&self) {
        self.devices_opened.fetch_add(1, Ordering::SeqCst);
        let live = self.live_devices.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live_devices.fetch_max(live, Ordering::SeqCst);
    }
}

/// Camera backend driven by a [`SyntheticConfig`].
pub struct SyntheticBackend {
    config: Arc<SyntheticConfig>,
    stats: Arc<SyntheticStats>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::default(),
        }
    }

    /// Shared counters; stays valid after the backend moves into a session.
    pub fn stats(&self) -> Arc<SyntheticStats> {
        Arc::clone(&self.stats)
    }
}

impl CameraBackend for SyntheticBackend {
    fn has_permission(&self) -> bool {
        self.config.permission_granted
    }

    fn cameras(&mut self) -> Result<Vec<CameraInfo>> {
        Ok(self.config.cameras.clone())
    }

    fn open_device(&mut self, camera_id: &str, callback: DeviceCallback) -> Result<()> {
        if !self.config.cameras.iter().any(|c| c.id == camera_id) {
            return Err(anyhow!("unknown synthetic camera {camera_id:?}"));
        }
        let config = Arc::clone(&self.config);
        let stats = Arc::clone(&self.stats);
        let id = camera_id.to_string();
        thread::Builder::new()
            .name("synthetic-open".into())
            .spawn(move || {
                thread::sleep(config.open_delay);
                if config.fail_open {
                    callback.open_failed(ScanError::DeviceUnavailable(format!("{id} is in use")));
                    return;
                }
                stats.device_opened();
                debug!("Synthetic device {} opened", id);
                callback.opened(Box::new(SyntheticDevice {
                    id,
                    config,
                    stats,
                    closed: false,
                    stream: None,
                }));
            })?;
        Ok(())
    }
}

struct StreamControl {
    repeating: AtomicBool,
    closed: AtomicBool,
}

struct SyntheticDevice {
    id: String,
    config: Arc<SyntheticConfig>,
    stats: Arc<SyntheticStats>,
    closed: bool,
    stream: Option<(Arc<StreamControl>, JoinHandle<()>)>,
}

impl SyntheticDevice {
    fn stop_stream(&mut self) {
        if let Some((control, handle)) = self.stream.take() {
            control.closed.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }
}

impl CameraDevice for SyntheticDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(&mut self, stream: StreamConfig, callback: DeviceCallback) -> Result<()> {
        if self.closed {
            return Err(anyhow!("device {} is closed", self.id));
        }
        self.stop_stream();

        let control = Arc::new(StreamControl {
            repeating: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let config = Arc::clone(&self.config);
        let stats = Arc::clone(&self.stats);
        let thread_control = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name("synthetic-stream".into())
            .spawn(move || run_stream(config, stats, thread_control, stream, callback))?;
        self.stream = Some((control, handle));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop_stream();
        self.stats.live_devices.fetch_sub(1, Ordering::SeqCst);
        debug!("Synthetic device {} closed", self.id);
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        if !self.closed {
            self.stats.unclosed_drops.fetch_add(1, Ordering::SeqCst);
            self.close();
        }
    }
}

fn run_stream(
    config: Arc<SyntheticConfig>,
    stats: Arc<SyntheticStats>,
    control: Arc<StreamControl>,
    stream: StreamConfig,
    callback: DeviceCallback,
) {
    thread::sleep(config.configure_delay);
    if control.closed.load(Ordering::SeqCst) {
        return;
    }
    if config.fail_configure {
        callback.configure_failed("synthetic stream configuration rejected");
        return;
    }
    stats.live_sessions.fetch_add(1, Ordering::SeqCst);
    callback.configured(Box::new(SyntheticCapture {
        control: Arc::clone(&control),
        stats: Arc::clone(&stats),
        reject_repeating: config.reject_repeating,
        closed: false,
    }));

    let gray;
    let frames: &[VideoFrame] = if config.frames.is_empty() {
        let size = stream.stream_size;
        gray = [VideoFrame::from_data(
            size.width,
            size.height,
            PixelFormat::Gray,
            vec![128; size.pixels() as usize],
        )];
        &gray
    } else {
        &config.frames
    };

    let started = Instant::now();
    let mut delivered: u64 = 0;
    while !control.closed.load(Ordering::SeqCst) {
        if control.repeating.load(Ordering::SeqCst) {
            let frame = frames[(delivered % frames.len() as u64) as usize]
                .clone()
                .with_timestamp(started.elapsed().as_micros() as u64);
            for target in &stream.targets {
                target.surface.on_frame(&frame);
            }
            delivered += 1;
            stats.frames_delivered.fetch_add(1, Ordering::SeqCst);

            if config.disconnect_after_frames == Some(delivered) {
                info!("Synthetic camera disconnecting after {} frames", delivered);
                callback.disconnected();
                return;
            }
        }
        thread::sleep(config.frame_interval);
    }
}

struct SyntheticCapture {
    control: Arc<StreamControl>,
    stats: Arc<SyntheticStats>,
    reject_repeating: bool,
    closed: bool,
}

impl CaptureSession for SyntheticCapture {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        if self.closed {
            return Err(anyhow!("capture session closed"));
        }
        if self.reject_repeating {
            return Err(anyhow!("synthetic device rejected the repeating request"));
        }
        *lock(&self.stats.last_request) = Some(*request);
        self.stats
            .torch_on
            .store(request.flash == FlashMode::Torch, Ordering::SeqCst);
        self.control.repeating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        self.control.repeating.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.control.repeating.store(false, Ordering::SeqCst);
        self.stats.torch_on.store(false, Ordering::SeqCst);
        self.stats.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        self.close();
    }
}
