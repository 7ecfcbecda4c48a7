//! Decoder adapter between frame sinks and a [`DecodeEngine`].

use super::queue::{DecodeQueue, SubmitOutcome};
use super::{DecodeEngine, DecodeResult, SymbolType};
use crate::error::ScanError;
use crate::frame::{FrameBuffer, PixelFormat, VideoFrame};
use crate::geometry::NormalizedRect;
use crate::utils::{lock, FpsCounter};
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Receives every completed decode, on the decode worker thread.
pub type DecodeNotifier = Arc<dyn Fn(DecodeResult) + Send + Sync>;

enum DecodeJob {
    /// A camera frame, decoded only while decoding is enabled.
    Frame { buffer: FrameBuffer, crop: NormalizedRect },
    /// A one-off still image requested by the caller.
    Still {
        buffer: FrameBuffer,
        crop: NormalizedRect,
        request_code: i32,
    },
}

struct DecoderShared {
    /// Guards every engine call, including release.
    engine: Mutex<Option<Box<dyn DecodeEngine>>>,
    enabled: AtomicBool,
    resume_at: Mutex<Option<Instant>>,
    detached: AtomicBool,
    notify: DecodeNotifier,
}

impl DecoderShared {
    fn is_decoding(&self) -> bool {
        if self.detached.load(Ordering::SeqCst) {
            return false;
        }
        if self.enabled.load(Ordering::SeqCst) {
            return true;
        }
        let mut resume_at = lock(&self.resume_at);
        match *resume_at {
            Some(at) if Instant::now() >= at => {
                *resume_at = None;
                self.enabled.store(true, Ordering::SeqCst);
                debug!("Decode delay elapsed, decoding resumed");
                true
            }
            _ => false,
        }
    }

    fn run(&self, job: DecodeJob, meter: &mut FpsCounter) {
        let (buffer, crop, request_code, from_camera) = match job {
            DecodeJob::Frame { buffer, crop } => (buffer, crop, 0, true),
            DecodeJob::Still {
                buffer,
                crop,
                request_code,
            } => (buffer, crop, request_code, false),
        };
        if from_camera && !self.is_decoding() {
            return;
        }

        let started = Instant::now();
        let rect = crop.to_pixels(buffer.width, buffer.height);
        let outcome = {
            let mut engine = lock(&self.engine);
            let Some(engine) = engine.as_mut() else {
                return;
            };
            engine.decode(&buffer.data, buffer.width, buffer.height, rect)
        };
        trace!(elapsed = ?started.elapsed(), ?rect, "Decode finished");
        meter.update();

        let result = match outcome {
            Ok(symbols) => symbols
                .into_iter()
                .max_by_key(|s| s.quality)
                .map(|s| DecodeResult::hit(s, request_code))
                .unwrap_or_else(|| DecodeResult::miss(request_code)),
            Err(e) => {
                debug!("Decode failed: {:#}", e);
                DecodeResult::miss(request_code)
            }
        };

        // Decoding may have been stopped while the engine ran.
        if self.detached.load(Ordering::SeqCst) || (from_camera && !self.is_decoding()) {
            return;
        }
        (self.notify)(result);
    }
}

/// Feeds luma frames to a decode engine on one worker thread.
///
/// Frames arriving while a decode is running wait in a single slot; newer
/// frames replace older ones. Results go to the notifier.
pub struct Decoder {
    shared: Arc<DecoderShared>,
    queue: DecodeQueue<DecodeJob>,
}

impl Decoder {
    /// Starts the decode worker. Decoding starts enabled.
    pub fn new(mut engine: Box<dyn DecodeEngine>, symbologies: &[SymbolType], notify: DecodeNotifier) -> Result<Self, ScanError> {
        engine.configure_symbologies(symbologies);
        let shared = Arc::new(DecoderShared {
            engine: Mutex::new(Some(engine)),
            enabled: AtomicBool::new(true),
            resume_at: Mutex::new(None),
            detached: AtomicBool::new(false),
            notify,
        });

        let worker_shared = Arc::clone(&shared);
        let mut meter = FpsCounter::new("decode");
        let queue = DecodeQueue::spawn("decode-worker", move |job| worker_shared.run(job, &mut meter))?;
        Ok(Self { shared, queue })
    }

    pub fn start_decode(&self) {
        *lock(&self.shared.resume_at) = None;
        self.shared.enabled.store(true, Ordering::SeqCst);
        debug!("Decoding started");
    }

    /// Disables decoding and drops any pending frame.
    pub fn stop_decode(&self) {
        *lock(&self.shared.resume_at) = None;
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.queue.clear();
        debug!("Decoding stopped");
    }

    /// Disables decoding now and re-enables it once `delay` has passed.
    pub fn start_decode_delay(&self, delay: Duration) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        *lock(&self.shared.resume_at) = Some(Instant::now() + delay);
        debug!(?delay, "Decoding delayed");
    }

    pub fn is_decoding(&self) -> bool {
        self.shared.is_decoding()
    }

    /// Offers one camera frame. Frames are skipped while decoding is off.
    pub fn decode(&self, buffer: FrameBuffer, crop: NormalizedRect) -> SubmitOutcome {
        if !self.shared.is_decoding() {
            return SubmitOutcome::Rejected;
        }
        self.queue.submit(DecodeJob::Frame { buffer, crop })
    }

    /// One-off decode of a still image; the result carries `request_code`.
    /// Any pending camera frame is dropped first, and camera frames arriving
    /// before the worker picks the image up are skipped.
    pub fn decode_for_result(
        &self,
        image: &DynamicImage,
        crop: NormalizedRect,
        request_code: i32,
    ) -> Result<SubmitOutcome, ScanError> {
        if self.shared.detached.load(Ordering::SeqCst) {
            return Err(ScanError::InvalidState("decoder detached"));
        }
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let buffer = VideoFrame::from_data(width, height, PixelFormat::Rgb, rgb.into_raw()).to_luma()?;

        self.queue.clear();
        info!(request_code, "Decoding still image {}x{}", width, height);
        Ok(self.queue.submit_held(DecodeJob::Still {
            buffer,
            crop,
            request_code,
        }))
    }

    /// [`Decoder::decode_for_result`] on an image file.
    pub fn decode_file_for_result(
        &self,
        path: impl AsRef<Path>,
        crop: NormalizedRect,
        request_code: i32,
    ) -> Result<SubmitOutcome, ScanError> {
        let image = image::open(path.as_ref())?;
        self.decode_for_result(&image, crop, request_code)
    }

    pub fn configure_symbologies(&self, symbologies: &[SymbolType]) {
        if let Some(engine) = lock(&self.shared.engine).as_mut() {
            engine.configure_symbologies(symbologies);
            info!("Decoder symbologies: {:?}", symbologies);
        }
    }

    /// Frames dropped by backpressure, stop or detach.
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }

    /// Blocks until no frame is waiting or being decoded.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    /// Stops the worker and releases the engine. Later calls do nothing.
    pub fn detach(&self) {
        if self.shared.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.queue.shutdown();

        if let Some(mut engine) = lock(&self.shared.engine).take() {
            engine.release();
        }
        info!(dropped = self.queue.dropped(), "Decoder detached");
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.detach();
    }
}
