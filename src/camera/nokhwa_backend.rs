//! Nokhwa-based webcam backend.
//!
//! A nokhwa `Camera` stays on the thread that created it, so every opened
//! device gets its own camera thread. The session talks to it over a channel.

use super::{
    CameraBackend, CameraDevice, CameraInfo, CaptureRequest, CaptureSession, DeviceCallback, FlashMode,
    LensFacing, StreamConfig, StreamTarget,
};
use crate::error::ScanError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::geometry::Resolution;
use anyhow::{anyhow, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as NokhwaResolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Consecutive frame failures treated as an unplugged camera.
const MAX_FRAME_FAILURES: u32 = 30;

/// Seed formats tried in order until one opens a stream.
/// Uncompressed first (built-in cameras), MJPEG for USB webcams.
fn seed_formats() -> Vec<CameraFormat> {
    let mut seeds = Vec::new();
    for (w, h) in [(1920, 1080), (1280, 720), (640, 480)] {
        for fps in [30, 15] {
            for format in [FrameFormat::NV12, FrameFormat::YUYV, FrameFormat::MJPEG] {
                seeds.push(CameraFormat::new(NokhwaResolution::new(w, h), format, fps));
            }
        }
    }
    seeds
}

/// Webcams found through nokhwa's platform backend.
#[derive(Debug, Default)]
pub struct NokhwaBackend {
    device: Option<u32>,
}

impl NokhwaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only reports the camera at `index`.
    pub fn with_device(index: u32) -> Self {
        Self { device: Some(index) }
    }
}

impl CameraBackend for NokhwaBackend {
    fn has_permission(&self) -> bool {
        // Desktop platforms prompt on first stream open; denial shows up as an open failure.
        true
    }

    fn cameras(&mut self) -> Result<Vec<CameraInfo>> {
        let devices = nokhwa::query(ApiBackend::Auto)?;
        Ok(devices
            .into_iter()
            .map(|d| (d.index().as_index().unwrap_or(0), d))
            .filter(|(index, _)| self.device.map_or(true, |wanted| wanted == *index))
            .map(|(index, d)| CameraInfo {
                id: index.to_string(),
                name: d.human_name().to_string(),
                facing: LensFacing::External,
                output_sizes: vec![
                    Resolution::new(640, 480),
                    Resolution::new(1280, 720),
                    Resolution::new(1920, 1080),
                ],
            })
            .collect())
    }

    fn open_device(&mut self, camera_id: &str, callback: DeviceCallback) -> Result<()> {
        let index: u32 = camera_id
            .parse()
            .map_err(|_| anyhow!("invalid camera index {camera_id:?}"))?;
        let id = camera_id.to_string();
        let (commands_tx, commands_rx) = mpsc::channel();
        let repeating = Arc::new(AtomicBool::new(false));
        let thread_repeating = Arc::clone(&repeating);

        // The device handle owns the join handle, so hand it over through a channel.
        let (handle_tx, handle_rx) = mpsc::channel::<JoinHandle<()>>();
        let handle = thread::Builder::new()
            .name(format!("nokhwa-camera-{index}"))
            .spawn(move || {
                let camera = match open_camera(index) {
                    Ok(camera) => camera,
                    Err(e) => {
                        callback.open_failed(ScanError::DeviceUnavailable(format!("{e:#}")));
                        return;
                    }
                };
                let Ok(handle) = handle_rx.recv() else {
                    return;
                };
                callback.opened(Box::new(NokhwaDevice {
                    id,
                    commands: commands_tx,
                    repeating: Arc::clone(&thread_repeating),
                    worker: Some(handle),
                }));
                camera_loop(camera, commands_rx, thread_repeating, callback);
            })?;
        let _ = handle_tx.send(handle);
        Ok(())
    }
}

fn open_camera(index: u32) -> Result<Camera> {
    for seed in seed_formats() {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(seed));
        if let Ok(mut camera) = Camera::new(CameraIndex::Index(index), requested) {
            // Creating the object isn't enough for some drivers; the stream must open too.
            if camera.open_stream().is_ok() {
                info!("Verified connection with seed format: {:?}", seed);
                return Ok(camera);
            }
        }
    }
    Err(anyhow!(
        "Could not connect to and open stream on camera index {} with any standard format.",
        index
    ))
}

enum DeviceCommand {
    Configure(StreamConfig, DeviceCallback),
    Close,
}

fn camera_loop(
    mut camera: Camera,
    commands: Receiver<DeviceCommand>,
    repeating: Arc<AtomicBool>,
    device_callback: DeviceCallback,
) {
    let mut targets: Vec<StreamTarget> = Vec::new();
    let mut failures = 0u32;
    let started = Instant::now();

    loop {
        let command = if targets.is_empty() || !repeating.load(Ordering::SeqCst) {
            match commands.recv_timeout(Duration::from_millis(50)) {
                Ok(command) => Some(command),
                Err(mpsc::RecvTimeoutError::Timeout) => None,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        };

        match command {
            Some(DeviceCommand::Close) => break,
            Some(DeviceCommand::Configure(config, callback)) => {
                let size = config.stream_size;
                let wanted = CameraFormat::new(NokhwaResolution::new(size.width, size.height), FrameFormat::MJPEG, 30);
                let _ = camera.stop_stream();
                let reopened = camera
                    .set_camera_requset(RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted)))
                    .is_ok()
                    && camera.open_stream().is_ok();
                if !reopened && camera.open_stream().is_err() {
                    callback.configure_failed(format!("camera refused a {} stream", size));
                    continue;
                }
                info!("Camera streaming with resolution: {}", camera.resolution());
                targets = config.targets;
                callback.configured(Box::new(NokhwaCapture {
                    repeating: Arc::clone(&repeating),
                    torch_warned: false,
                }));
            }
            None => {}
        }

        if targets.is_empty() || !repeating.load(Ordering::SeqCst) {
            continue;
        }

        match grab_frame(&mut camera) {
            Ok(frame) => {
                failures = 0;
                let frame = frame.with_timestamp(started.elapsed().as_micros() as u64);
                for target in &targets {
                    target.surface.on_frame(&frame);
                }
            }
            Err(e) => {
                failures += 1;
                warn!("Frame capture error: {:#}", e);
                if failures >= MAX_FRAME_FAILURES {
                    device_callback.disconnected();
                    repeating.store(false, Ordering::SeqCst);
                    targets.clear();
                }
            }
        }
    }

    let _ = camera.stop_stream();
    info!("Camera thread finished");
}

fn grab_frame(camera: &mut Camera) -> Result<VideoFrame> {
    let frame = camera.frame()?;
    let decoded = frame.decode_image::<RgbFormat>()?;
    let (width, height) = decoded.dimensions();
    Ok(VideoFrame::from_data(width, height, PixelFormat::Rgb, decoded.into_raw()))
}

struct NokhwaDevice {
    id: String,
    commands: Sender<DeviceCommand>,
    repeating: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CameraDevice for NokhwaDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(&mut self, config: StreamConfig, callback: DeviceCallback) -> Result<()> {
        self.commands
            .send(DeviceCommand::Configure(config, callback))
            .map_err(|_| anyhow!("camera thread for {} has exited", self.id))
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.repeating.store(false, Ordering::SeqCst);
        let _ = self.commands.send(DeviceCommand::Close);
        // Closing from the camera thread itself (session already gone) must not self-join.
        if worker.thread().id() != thread::current().id() && worker.join().is_err() {
            warn!("Camera thread for {} panicked", self.id);
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct NokhwaCapture {
    repeating: Arc<AtomicBool>,
    torch_warned: bool,
}

impl CaptureSession for NokhwaCapture {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        if request.flash == FlashMode::Torch && !self.torch_warned {
            warn!("Torch control is not available through nokhwa; ignoring");
            self.torch_warned = true;
        }
        self.repeating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<()> {
        self.repeating.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.repeating.store(false, Ordering::SeqCst);
    }
}
