//! Composition root: camera session, frame converter, decoder and the caller's event pump.
//!
//! All outbound notifications are queued as [`ScanEvent`]s and delivered on
//! the caller's thread by [`ScanPipeline::dispatch`].

use crate::camera::{
    CameraBackend, CameraLock, CameraSession, OpenRequest, SessionEvent, SessionNotifier, SessionState,
};
use crate::config::{DecoderConfig, ScannerConfig};
use crate::convert::{FrameCallback, FrameSurface, SinkFactory};
use crate::decode::{DecodeEngine, DecodeResult, Decoder, ResultConfirmer, RqrrEngine, SubmitOutcome};
use crate::error::ScanError;
use crate::frame::FrameBuffer;
use crate::geometry::{DeviceOrientation, NormalizedRect, Resolution, ViewRect};
use crate::orientation;
use crate::utils::{lock, FpsCounter};
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Notifications for the caller.
#[derive(Debug)]
pub enum ScanEvent {
    OpenSuccess {
        /// Frame width as the user sees it
        width: u32,
        /// Frame height as the user sees it
        height: u32,
        rotation_degrees: u32,
        /// Size of the luma buffers handed to the decoder
        decode: Resolution,
    },
    OpenError(ScanError),
    NoPermission,
    Disconnected,
    BrightnessChanged(u8),
    DecodeComplete(DecodeResult),
}

/// Caller-side handlers, all invoked from [`ScanPipeline::dispatch`].
pub trait ScanListener {
    fn on_open_success(&mut self, _width: u32, _height: u32, _rotation_degrees: u32) {}

    fn on_open_error(&mut self, _error: &ScanError) {}

    fn on_no_permission(&mut self) {}

    fn on_disconnected(&mut self) {}

    /// Mean frame luma, sampled on every converted frame but reported only when it changes.
    fn on_brightness_changed(&mut self, _mean_luma: u8) {}

    /// Every completed decode, including misses.
    fn on_decode_complete(&mut self, _result: &DecodeResult) {}

    /// A camera result read the same way enough times in a row.
    fn on_decode_confirmed(&mut self, _text: &str, _result: &DecodeResult) {}
}

/// Inputs of the region-of-interest projection and its cached output.
struct RoiState {
    region: Option<ViewRect>,
    view: Option<Resolution>,
    stream: Option<Resolution>,
    orientation: DeviceOrientation,
    crop: NormalizedRect,
}

impl RoiState {
    fn recompute(&mut self) {
        self.crop = match (self.view, self.stream) {
            (Some(view), Some(stream)) => orientation::project(self.region, view, stream, self.orientation),
            _ => NormalizedRect::FULL,
        };
        debug!(crop = ?self.crop, "Region of interest projected");
    }
}

/// Builds a [`ScanPipeline`].
pub struct ScanPipelineBuilder {
    backend: Option<Box<dyn CameraBackend>>,
    config: ScannerConfig,
    camera_lock: Option<CameraLock>,
    engine: Option<Box<dyn DecodeEngine>>,
    sinks: Option<SinkFactory>,
}

impl ScanPipelineBuilder {
    pub fn backend(mut self, backend: impl CameraBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn boxed_backend(mut self, backend: Box<dyn CameraBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Lock shared with other pipelines. Defaults to [`CameraLock::global`].
    pub fn camera_lock(mut self, camera_lock: CameraLock) -> Self {
        self.camera_lock = Some(camera_lock);
        self
    }

    /// Decode engine. Defaults to [`RqrrEngine`].
    pub fn engine(mut self, engine: impl DecodeEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Overrides how frame sinks are built on each open.
    pub fn sink_factory(mut self, sinks: SinkFactory) -> Self {
        self.sinks = Some(sinks);
        self
    }

    pub fn build(self) -> Result<ScanPipeline, ScanError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => default_backend()?,
        };
        let engine = self.engine.unwrap_or_else(|| Box::new(RqrrEngine::new()));
        let camera_lock = self.camera_lock.unwrap_or_else(CameraLock::global);
        let config = self.config;

        let (events_tx, events) = mpsc::channel();
        let roi = Arc::new(Mutex::new(RoiState {
            region: None,
            view: None,
            stream: None,
            orientation: DeviceOrientation::default(),
            crop: NormalizedRect::FULL,
        }));

        let decoder = {
            let events = events_tx.clone();
            Arc::new(Decoder::new(
                engine,
                &config.decoder.symbologies,
                Arc::new(move |result| {
                    let _ = events.send(ScanEvent::DecodeComplete(result));
                }),
            )?)
        };

        let frame_callback = frame_callback(
            Arc::clone(&decoder),
            Arc::clone(&roi),
            config.camera.brightness_feedback.then(|| events_tx.clone()),
        );
        let notify = session_notifier(events_tx, Arc::clone(&roi));
        let mut options = config.camera.session_options();
        if let Some(sinks) = self.sinks {
            options.sinks = sinks;
        }
        let session = CameraSession::spawn(
            backend,
            options,
            camera_lock,
            frame_callback,
            notify,
        )?;

        Ok(ScanPipeline {
            session,
            decoder,
            roi,
            events,
            confirmer: ResultConfirmer::new(config.decoder.confirm_threshold),
            config,
        })
    }
}

#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
fn default_backend() -> Result<Box<dyn CameraBackend>, ScanError> {
    Ok(Box::new(crate::camera::NokhwaBackend::new()))
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn default_backend() -> Result<Box<dyn CameraBackend>, ScanError> {
    Err(ScanError::DeviceUnavailable("no camera backend for this platform".into()))
}

/// Converted frames: brightness report, then the decoder with the cached crop.
fn frame_callback(decoder: Arc<Decoder>, roi: Arc<Mutex<RoiState>>, brightness: Option<Sender<ScanEvent>>) -> FrameCallback {
    let last_luma = AtomicU16::new(u16::MAX);
    let meter = Mutex::new(FpsCounter::new("convert"));
    Arc::new(move |buffer: FrameBuffer| {
        lock(&meter).update();
        if let Some(events) = &brightness {
            let mean = buffer.mean_luma();
            if last_luma.swap(u16::from(mean), Ordering::Relaxed) != u16::from(mean) {
                let _ = events.send(ScanEvent::BrightnessChanged(mean));
            }
        }
        let crop = lock(&roi).crop;
        match decoder.decode(buffer, crop) {
            SubmitOutcome::Replaced => debug!("Decoder busy, replaced pending frame"),
            SubmitOutcome::Skipped => debug!("Still image pending, camera frame skipped"),
            _ => {}
        }
    })
}

fn session_notifier(events: Sender<ScanEvent>, roi: Arc<Mutex<RoiState>>) -> SessionNotifier {
    Box::new(move |event| {
        let event = match event {
            SessionEvent::Opened {
                stream,
                upright,
                decode,
                orientation,
                rotation_degrees,
            } => {
                {
                    let mut roi = lock(&roi);
                    roi.stream = Some(stream);
                    roi.orientation = orientation;
                    roi.recompute();
                }
                ScanEvent::OpenSuccess {
                    width: upright.width,
                    height: upright.height,
                    rotation_degrees,
                    decode,
                }
            }
            SessionEvent::OpenFailed(error) => ScanEvent::OpenError(error),
            SessionEvent::NoPermission => ScanEvent::NoPermission,
            SessionEvent::Disconnected => ScanEvent::Disconnected,
        };
        let _ = events.send(event);
    })
}

/// A camera feeding a barcode decoder, driven from one caller thread.
pub struct ScanPipeline {
    session: CameraSession,
    decoder: Arc<Decoder>,
    roi: Arc<Mutex<RoiState>>,
    events: Receiver<ScanEvent>,
    confirmer: ResultConfirmer,
    config: ScannerConfig,
}

impl ScanPipeline {
    pub fn builder() -> ScanPipelineBuilder {
        ScanPipelineBuilder {
            backend: None,
            config: ScannerConfig::default(),
            camera_lock: None,
            engine: None,
            sinks: None,
        }
    }

    /// Starts opening the camera for a host window in `orientation`.
    ///
    /// Needs the preview size. The outcome arrives as an event.
    pub fn open_camera(&mut self, orientation: DeviceOrientation) -> Result<(), ScanError> {
        let preview = {
            let mut roi = lock(&self.roi);
            let preview = roi.view.ok_or(ScanError::InvalidState("preview size not set"))?;
            roi.orientation = orientation;
            roi.stream = None;
            roi.recompute();
            preview
        };
        self.confirmer.reset();
        if self.config.decoder.start_delay_ms > 0 {
            self.decoder
                .start_decode_delay(Duration::from_millis(self.config.decoder.start_delay_ms));
        }
        self.session.open(OpenRequest { orientation, preview });
        Ok(())
    }

    /// Closes the camera; returns once the device is released.
    pub fn close_camera(&mut self) {
        self.session.close();
        self.confirmer.reset();
    }

    /// Closes the camera, stops the decode worker and releases the engine.
    /// The pipeline is unusable afterwards.
    pub fn detach(&mut self) {
        self.session.shutdown();
        self.decoder.detach();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn set_preview_size(&self, width: u32, height: u32) -> Result<(), ScanError> {
        let view = Resolution::try_new(width, height).ok_or(ScanError::InvalidState("empty preview size"))?;
        let mut roi = lock(&self.roi);
        roi.view = Some(view);
        roi.recompute();
        Ok(())
    }

    /// Restricts decoding to a region of the preview, in view pixels.
    /// Applies from the next converted frame.
    pub fn set_region_of_interest(&self, left: i32, top: i32, right: i32, bottom: i32) {
        let mut roi = lock(&self.roi);
        roi.region = Some(ViewRect::new(left, top, right, bottom));
        roi.recompute();
        info!(left, top, right, bottom, crop = ?roi.crop, "Region of interest set");
    }

    pub fn clear_region_of_interest(&self) {
        let mut roi = lock(&self.roi);
        roi.region = None;
        roi.recompute();
    }

    /// The crop handed to the decoder with each frame.
    pub fn crop(&self) -> NormalizedRect {
        lock(&self.roi).crop
    }

    /// Live preview target, used from the next open.
    pub fn set_preview_surface(&self, surface: Option<Arc<dyn FrameSurface>>) {
        self.session.set_preview_surface(surface);
    }

    pub fn open_flash(&self) {
        self.session.set_flash(true);
    }

    pub fn close_flash(&self) {
        self.session.set_flash(false);
    }

    pub fn is_flash_on(&self) -> bool {
        self.session.is_flash_on()
    }

    pub fn start_decode(&self) {
        self.decoder.start_decode();
    }

    pub fn stop_decode(&self) {
        self.decoder.stop_decode();
    }

    pub fn start_decode_delay(&self, delay: Duration) {
        self.decoder.start_decode_delay(delay);
    }

    pub fn decode_for_result(
        &self,
        image: &DynamicImage,
        crop: NormalizedRect,
        request_code: i32,
    ) -> Result<SubmitOutcome, ScanError> {
        self.decoder.decode_for_result(image, crop, request_code)
    }

    pub fn decode_file_for_result(
        &self,
        path: impl AsRef<Path>,
        crop: NormalizedRect,
        request_code: i32,
    ) -> Result<SubmitOutcome, ScanError> {
        self.decoder.decode_file_for_result(path, crop, request_code)
    }

    /// Applies reloaded decoder settings without reopening the camera.
    pub fn apply_decoder_config(&mut self, decoder: DecoderConfig) {
        self.decoder.configure_symbologies(&decoder.symbologies);
        if decoder.confirm_threshold != self.confirmer.threshold() {
            self.confirmer = ResultConfirmer::new(decoder.confirm_threshold);
        }
        self.config.decoder = decoder;
    }

    pub fn dropped_frames(&self) -> u64 {
        self.decoder.dropped_frames()
    }

    /// Blocks until no frame is waiting or being decoded.
    pub fn wait_decode_idle(&self, timeout: Duration) -> bool {
        self.decoder.wait_idle(timeout)
    }

    /// Waits up to `timeout` for the first event, then delivers everything
    /// queued to `listener`. Returns the number of events delivered.
    pub fn dispatch(&mut self, listener: &mut dyn ScanListener, timeout: Duration) -> usize {
        let first = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return 0,
        };
        let mut delivered = 0;
        let mut next = Some(first);
        while let Some(event) = next {
            self.deliver(listener, event);
            delivered += 1;
            next = self.events.try_recv().ok();
        }
        delivered
    }

    fn deliver(&mut self, listener: &mut dyn ScanListener, event: ScanEvent) {
        match event {
            ScanEvent::OpenSuccess {
                width,
                height,
                rotation_degrees,
                ..
            } => listener.on_open_success(width, height, rotation_degrees),
            ScanEvent::OpenError(error) => listener.on_open_error(&error),
            ScanEvent::NoPermission => listener.on_no_permission(),
            ScanEvent::Disconnected => {
                self.confirmer.reset();
                listener.on_disconnected();
            }
            ScanEvent::BrightnessChanged(mean) => listener.on_brightness_changed(mean),
            ScanEvent::DecodeComplete(result) => {
                listener.on_decode_complete(&result);
                // Still-image requests bypass confirmation.
                if result.request_code == 0 {
                    if let Some(text) = self.confirmer.observe(result.text.as_deref()) {
                        info!(%text, "Decode confirmed");
                        listener.on_decode_confirmed(&text, &result);
                    }
                }
            }
        }
    }
}

impl Drop for ScanPipeline {
    fn drop(&mut self) {
        self.detach();
    }
}
