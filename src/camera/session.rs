//! Camera session: one background thread owning the device, capture session and converter.
//!
//! Every device callback and every caller command is a message in one inbox,
//! so handles are only ever touched from the session thread. Each open attempt
//! gets a generation number; callbacks from an older generation are stale and
//! whatever they carry (a late device, a late capture session) is closed on
//! arrival instead of being adopted.

use super::{
    CameraApi, CameraBackend, CameraDevice, CameraLock, CameraLockGuard, CaptureRequest, CaptureSession,
    LensFacing, StreamConfig, StreamTarget, TargetRole, DEFAULT_LOCK_TIMEOUT,
};
use crate::convert::{ConverterKind, FrameCallback, FrameSink, FrameSurface, SinkFactory};
use crate::error::{ErrorKind, ScanError};
use crate::frame::VideoFrame;
use crate::geometry::{DeviceOrientation, Resolution};
use crate::sizing::{self, DEFAULT_MAX_DECODE_PIXELS};
use crate::utils::lock;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Configuring,
    Streaming,
    Closing,
    Error(ErrorKind),
}

/// Inputs of the session state machine.
///
/// Open, configure and disconnect failures are all `Failed`, tagged with the
/// error kind that ends up in [`SessionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open,
    DeviceOpened,
    SessionConfigured,
    Failed(ErrorKind),
    Close,
    Released,
}

impl SessionState {
    /// The transition table. `None` marks an illegal transition.
    pub fn next(self, transition: Transition) -> Option<SessionState> {
        use SessionState::*;
        match (self, transition) {
            (Idle | Error(_), Transition::Open) => Some(Opening),
            (Opening, Transition::DeviceOpened) => Some(Configuring),
            (Configuring, Transition::SessionConfigured) => Some(Streaming),
            (Opening | Configuring | Streaming, Transition::Failed(kind)) => Some(Error(kind)),
            (Opening | Configuring | Streaming | Closing | Error(_), Transition::Close) => Some(Closing),
            (Closing, Transition::Released) => Some(Idle),
            _ => None,
        }
    }

    /// True while the session holds, or is acquiring, a device.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Error(_))
    }
}

/// Per-open parameters from the host window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    pub orientation: DeviceOrientation,
    /// Preview view size in view pixels
    pub preview: Resolution,
}

/// Lifecycle notifications, emitted on the session thread.
#[derive(Debug)]
pub enum SessionEvent {
    Opened {
        /// Stream size in sensor orientation
        stream: Resolution,
        /// Stream size as the user sees it
        upright: Resolution,
        /// Luma buffer size delivered to the decoder
        decode: Resolution,
        orientation: DeviceOrientation,
        rotation_degrees: u32,
    },
    OpenFailed(ScanError),
    NoPermission,
    Disconnected,
}

pub type SessionNotifier = Box<dyn Fn(SessionEvent) + Send>;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub api: CameraApi,
    pub converter: ConverterKind,
    pub facing: LensFacing,
    pub lock_timeout: Duration,
    pub max_decode_pixels: u64,
    pub sinks: SinkFactory,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            api: CameraApi::Modern,
            converter: ConverterKind::Gpu,
            facing: LensFacing::Back,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_decode_pixels: DEFAULT_MAX_DECODE_PIXELS,
            sinks: SinkFactory::default(),
        }
    }
}

enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    OpenFailed(ScanError),
    Disconnected,
    Configured(Box<dyn CaptureSession>),
    ConfigureFailed(String),
}

impl DeviceEvent {
    fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Opened(_) => "opened",
            DeviceEvent::OpenFailed(_) => "open-failed",
            DeviceEvent::Disconnected => "disconnected",
            DeviceEvent::Configured(_) => "configured",
            DeviceEvent::ConfigureFailed(_) => "configure-failed",
        }
    }
}

enum Command {
    Open(OpenRequest),
    Close(Option<Sender<()>>),
    Flash(bool),
    Device { generation: u64, event: DeviceEvent },
    Shutdown,
}

/// Handle given to backends for reporting asynchronous device outcomes.
///
/// If the session is already gone, devices and capture sessions passed in are
/// closed immediately.
#[derive(Clone)]
pub struct DeviceCallback {
    generation: u64,
    inbox: Sender<Command>,
}

impl DeviceCallback {
    fn post(&self, event: DeviceEvent) -> Result<(), mpsc::SendError<Command>> {
        self.inbox.send(Command::Device {
            generation: self.generation,
            event,
        })
    }

    pub fn opened(&self, device: Box<dyn CameraDevice>) {
        if let Err(mpsc::SendError(Command::Device { event: DeviceEvent::Opened(mut device), .. })) =
            self.post(DeviceEvent::Opened(device))
        {
            warn!("Camera session gone, closing device {}", device.id());
            device.close();
        }
    }

    pub fn open_failed(&self, error: ScanError) {
        let _ = self.post(DeviceEvent::OpenFailed(error));
    }

    pub fn disconnected(&self) {
        let _ = self.post(DeviceEvent::Disconnected);
    }

    pub fn configured(&self, session: Box<dyn CaptureSession>) {
        if let Err(mpsc::SendError(Command::Device { event: DeviceEvent::Configured(mut session), .. })) =
            self.post(DeviceEvent::Configured(session))
        {
            warn!("Camera session gone, closing capture session");
            session.close();
        }
    }

    pub fn configure_failed(&self, reason: impl Into<String>) {
        let _ = self.post(DeviceEvent::ConfigureFailed(reason.into()));
    }
}

/// Resources owned in each state.
enum Phase {
    Idle,
    Opening {
        guard: Option<CameraLockGuard>,
    },
    Configuring {
        guard: CameraLockGuard,
        device: Box<dyn CameraDevice>,
    },
    Streaming {
        device: Box<dyn CameraDevice>,
        capture: Box<dyn CaptureSession>,
    },
    /// Closed while a device open was still in flight. The lock stays held until
    /// the device for `awaiting` shows up (and is closed) or `deadline` passes.
    Closing {
        guard: CameraLockGuard,
        awaiting: u64,
        deadline: Instant,
    },
    Failed(ErrorKind),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Opening { .. } => SessionState::Opening,
            Phase::Configuring { .. } => SessionState::Configuring,
            Phase::Streaming { .. } => SessionState::Streaming,
            Phase::Closing { .. } => SessionState::Closing,
            Phase::Failed(kind) => SessionState::Error(*kind),
        }
    }
}

/// Converter and stream parameters of the current open attempt.
struct Active {
    sink: Box<dyn FrameSink>,
    orientation: DeviceOrientation,
    stream_size: Resolution,
    request: CaptureRequest,
}

/// Sends one stream to both the preview and the converter.
struct TeeSurface {
    preview: Arc<dyn FrameSurface>,
    decode: Arc<dyn FrameSurface>,
}

impl FrameSurface for TeeSurface {
    fn on_frame(&self, frame: &VideoFrame) {
        self.preview.on_frame(frame);
        self.decode.on_frame(frame);
    }
}

struct SessionShared {
    state: Mutex<SessionState>,
    flash_on: AtomicBool,
    preview: Mutex<Option<Arc<dyn FrameSurface>>>,
}

struct SessionWorker {
    backend: Box<dyn CameraBackend>,
    options: SessionOptions,
    camera_lock: CameraLock,
    notify: SessionNotifier,
    frame_callback: FrameCallback,
    shared: Arc<SessionShared>,
    inbox: Sender<Command>,
    generation: u64,
    state: SessionState,
    phase: Phase,
    active: Option<Active>,
    close_waiters: Vec<Sender<()>>,
    deferred_open: Option<OpenRequest>,
    shutting_down: bool,
}

impl SessionWorker {
    fn run(mut self, commands: Receiver<Command>) {
        loop {
            let deadline = match &self.phase {
                Phase::Closing { deadline, .. } => Some(*deadline),
                _ => None,
            };
            let command = match deadline {
                Some(deadline) => {
                    match commands.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            warn!("Pending camera open never reported back; releasing the camera lock");
                            self.generation += 1;
                            self.finish_close();
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match commands.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            self.handle(command);
            debug_assert_eq!(self.state, self.phase.state(), "session phase out of sync with state");

            if self.shutting_down && !matches!(self.phase, Phase::Closing { .. }) {
                break;
            }
        }
        debug!("Camera session thread finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open(request) => self.open(request),
            Command::Close(done) => self.close(done),
            Command::Flash(on) => self.set_flash(on),
            Command::Device { generation, event } => self.on_device_event(generation, event),
            Command::Shutdown => {
                self.shutting_down = true;
                self.deferred_open = None;
                self.close(None);
            }
        }
    }

    fn advance(&mut self, transition: Transition) {
        match self.state.next(transition) {
            Some(next) => {
                debug!(from = ?self.state, to = ?next, ?transition, "camera session transition");
                self.state = next;
                *lock(&self.shared.state) = next;
            }
            None => {
                warn!(state = ?self.state, ?transition, "illegal camera session transition");
                debug_assert!(false, "illegal transition {:?} from {:?}", transition, self.state);
            }
        }
    }

    fn callback(&self) -> DeviceCallback {
        DeviceCallback {
            generation: self.generation,
            inbox: self.inbox.clone(),
        }
    }

    fn open(&mut self, request: OpenRequest) {
        if self.shutting_down {
            return;
        }
        match self.state {
            SessionState::Idle | SessionState::Error(_) => {}
            SessionState::Closing => {
                debug!("Open deferred until the pending device is released");
                self.deferred_open = Some(request);
                return;
            }
            state => {
                warn!(?state, "Open ignored, camera session already active");
                return;
            }
        }

        self.generation += 1;
        self.advance(Transition::Open);
        self.phase = Phase::Opening { guard: None };
        info!(
            orientation = ?request.orientation,
            preview = %request.preview,
            "Opening camera"
        );

        match self.begin_open(&request) {
            Ok(guard) => self.phase = Phase::Opening { guard: Some(guard) },
            Err(error) => self.fail(error),
        }
    }

    /// Permission, lock, enumeration, sizing and converter setup, then the device request.
    fn begin_open(&mut self, request: &OpenRequest) -> Result<CameraLockGuard, ScanError> {
        if !self.backend.has_permission() {
            return Err(ScanError::PermissionDenied);
        }
        let guard = self.camera_lock.try_acquire_for(self.options.lock_timeout)?;

        let cameras = self.backend.cameras()?;
        let camera = match cameras.iter().find(|c| c.facing == self.options.facing) {
            Some(camera) => camera,
            None => {
                let camera = cameras
                    .first()
                    .ok_or_else(|| ScanError::DeviceUnavailable("no camera found".into()))?;
                warn!(
                    "No {:?}-facing camera, falling back to {} ({:?})",
                    self.options.facing, camera.name, camera.facing
                );
                camera
            }
        };

        // Sensor sizes are landscape; a portrait preview needs its axes swapped.
        let preview_min = if request.orientation.is_portrait() {
            request.preview.transposed()
        } else {
            request.preview
        };
        let stream_size = sizing::biggest_size_at_least(&camera.output_sizes, preview_min)
            .ok_or_else(|| ScanError::ConfigurationFailed(format!("camera {} reports no stream sizes", camera.id)))?;

        let (converter, decode_size) = match self.options.api {
            CameraApi::Modern => {
                let fits: Vec<Resolution> = camera
                    .output_sizes
                    .iter()
                    .copied()
                    .filter(|s| s.width <= stream_size.width && s.height <= stream_size.height)
                    .collect();
                let decode_size = sizing::largest_size_under_budget(&fits, stream_size, self.options.max_decode_pixels)
                    .unwrap_or(stream_size);
                (self.options.converter, decode_size)
            }
            CameraApi::Legacy => (ConverterKind::ImageReader, stream_size),
        };
        info!(
            camera = %camera.name,
            stream = %stream_size,
            decode = %decode_size,
            ?converter,
            "Camera stream selected"
        );

        let sink = self
            .options
            .sinks
            .build(converter, stream_size, decode_size, self.frame_callback.clone())?;
        self.active = Some(Active {
            sink,
            orientation: request.orientation,
            stream_size,
            request: CaptureRequest::preview(),
        });

        let camera_id = camera.id.clone();
        let callback = self.callback();
        self.backend
            .open_device(&camera_id, callback)
            .map_err(|e| ScanError::DeviceUnavailable(format!("{e:#}")))?;
        Ok(guard)
    }

    fn on_device_event(&mut self, generation: u64, event: DeviceEvent) {
        if generation != self.generation {
            self.on_stale_event(generation, event);
            return;
        }
        debug!(event = event.name(), state = ?self.state, "Camera device event");
        match event {
            DeviceEvent::Opened(device) => self.on_opened(device),
            DeviceEvent::Configured(capture) => self.on_configured(capture),
            DeviceEvent::OpenFailed(error) => self.fail(error),
            DeviceEvent::Disconnected => self.fail(ScanError::Disconnected),
            DeviceEvent::ConfigureFailed(reason) => self.fail(ScanError::ConfigurationFailed(reason)),
        }
    }

    fn on_stale_event(&mut self, generation: u64, event: DeviceEvent) {
        let settles_open = matches!(event, DeviceEvent::Opened(_) | DeviceEvent::OpenFailed(_));
        match event {
            DeviceEvent::Opened(mut device) => {
                info!("Closing device {} opened by a cancelled attempt", device.id());
                device.close();
            }
            DeviceEvent::Configured(mut capture) => {
                debug!("Closing capture session configured for a cancelled attempt");
                capture.close();
            }
            other => debug!(event = other.name(), generation, "Ignoring stale camera event"),
        }

        if settles_open {
            if let Phase::Closing { awaiting, .. } = &self.phase {
                if *awaiting == generation {
                    self.finish_close();
                }
            }
        }
    }

    fn on_opened(&mut self, device: Box<dyn CameraDevice>) {
        match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Opening { guard: Some(guard) } => {
                info!("Camera device {} opened", device.id());
                self.advance(Transition::DeviceOpened);
                self.phase = Phase::Configuring { guard, device };
                if let Err(error) = self.configure() {
                    self.fail(error);
                }
            }
            other => {
                self.phase = other;
                warn!(state = ?self.state, "Unexpected device open, closing it");
                let mut device = device;
                device.close();
            }
        }
    }

    /// Builds the capture session: preview surface (if any) plus the converter input.
    fn configure(&mut self) -> Result<(), ScanError> {
        let callback = self.callback();
        let preview = lock(&self.shared.preview).clone();
        let Some(active) = self.active.as_ref() else {
            return Err(ScanError::InvalidState("configuring without a converter"));
        };
        let Phase::Configuring { device, .. } = &mut self.phase else {
            return Err(ScanError::InvalidState("configuring without a device"));
        };

        let decode = active.sink.surface();
        let targets = match (self.options.api, preview) {
            (CameraApi::Modern, Some(preview)) => vec![
                StreamTarget { role: TargetRole::Preview, surface: preview },
                StreamTarget { role: TargetRole::Decode, surface: decode },
            ],
            (CameraApi::Legacy, Some(preview)) => vec![StreamTarget {
                role: TargetRole::Preview,
                surface: Arc::new(TeeSurface { preview, decode }),
            }],
            (_, None) => vec![StreamTarget { role: TargetRole::Decode, surface: decode }],
        };

        device
            .create_session(
                StreamConfig {
                    stream_size: active.stream_size,
                    targets,
                },
                callback,
            )
            .map_err(|e| ScanError::ConfigurationFailed(format!("{e:#}")))
    }

    fn on_configured(&mut self, mut capture: Box<dyn CaptureSession>) {
        let (guard, device) = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Configuring { guard, device } => (guard, device),
            other => {
                self.phase = other;
                warn!(state = ?self.state, "Unexpected capture session, closing it");
                capture.close();
                return;
            }
        };

        let request = self
            .active
            .as_ref()
            .map(|a| a.request)
            .unwrap_or_else(CaptureRequest::preview);
        if let Err(e) = capture.set_repeating_request(&request) {
            capture.close();
            self.phase = Phase::Configuring { guard, device };
            self.fail(ScanError::ConfigurationFailed(format!("repeating request rejected: {e:#}")));
            return;
        }

        self.advance(Transition::SessionConfigured);
        self.phase = Phase::Streaming { device, capture };
        drop(guard);

        if let Some(active) = &self.active {
            let event = SessionEvent::Opened {
                stream: active.stream_size,
                upright: active.orientation.upright(active.stream_size),
                decode: active.sink.resolution(),
                orientation: active.orientation,
                rotation_degrees: active.orientation.display_rotation_degrees(),
            };
            info!("Camera streaming at {}", active.stream_size);
            (self.notify)(event);
        }
    }

    fn set_flash(&mut self, on: bool) {
        let (Phase::Streaming { capture, .. }, Some(active)) = (&mut self.phase, self.active.as_mut()) else {
            debug!("Flash change ignored, camera not streaming");
            return;
        };
        let request = active.request.with_torch(on);
        match capture.set_repeating_request(&request) {
            Ok(()) => {
                active.request = request;
                self.shared.flash_on.store(on, Ordering::SeqCst);
                info!("Torch {}", if on { "on" } else { "off" });
            }
            Err(e) => warn!("Failed to switch torch: {:#}", e),
        }
    }

    fn close(&mut self, done: Option<Sender<()>>) {
        let phase = mem::replace(&mut self.phase, Phase::Idle);
        match phase {
            Phase::Idle => {
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Phase::Closing { .. } => {
                self.phase = phase;
                self.close_waiters.extend(done);
            }
            Phase::Opening { guard: Some(guard) } => {
                // The device request is in flight. Keep the lock until it lands.
                let awaiting = self.generation;
                self.generation += 1;
                self.advance(Transition::Close);
                if let Some(mut active) = self.active.take() {
                    active.sink.close();
                }
                self.phase = Phase::Closing {
                    guard,
                    awaiting,
                    deadline: Instant::now() + self.options.lock_timeout,
                };
                self.close_waiters.extend(done);
                info!("Close requested while opening; waiting for the pending device");
            }
            other => {
                self.generation += 1;
                self.advance(Transition::Close);
                self.teardown(other);
                self.advance(Transition::Released);
                info!("Camera closed");
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }
    }

    fn finish_close(&mut self) {
        // Dropping the phase drops the lock guard.
        self.phase = Phase::Idle;
        self.advance(Transition::Released);
        info!("Camera closed after pending open settled");
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
        if let Some(request) = self.deferred_open.take() {
            self.open(request);
        }
    }

    /// Best-effort release of everything `phase` and the active converter hold.
    fn teardown(&mut self, phase: Phase) {
        let (guard, device, capture) = match phase {
            Phase::Idle | Phase::Failed(_) => (None, None, None),
            Phase::Opening { guard } => (guard, None, None),
            Phase::Configuring { guard, device } => (Some(guard), Some(device), None),
            Phase::Streaming { device, capture } => (None, Some(device), Some(capture)),
            Phase::Closing { guard, .. } => (Some(guard), None, None),
        };

        // Releasing a device is serialized with other sessions' opens.
        let guard = match guard {
            Some(guard) => Some(guard),
            None if device.is_some() => match self.camera_lock.try_acquire_for(self.options.lock_timeout) {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!("Releasing camera without the lock: {}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(mut capture) = capture {
            if let Err(e) = capture.stop_repeating() {
                debug!("stop_repeating during teardown failed: {:#}", e);
            }
            capture.close();
        }
        if let Some(mut device) = device {
            device.close();
        }
        if let Some(mut active) = self.active.take() {
            active.sink.close();
        }
        self.shared.flash_on.store(false, Ordering::SeqCst);
        drop(guard);
    }

    /// Tears down, enters `Error`, then tells the caller.
    fn fail(&mut self, error: ScanError) {
        let kind = error.kind();
        warn!(?kind, "Camera session failed: {}", error);
        let phase = mem::replace(&mut self.phase, Phase::Idle);
        self.teardown(phase);
        self.generation += 1;
        self.advance(Transition::Failed(kind));
        self.phase = Phase::Failed(kind);

        let event = match error {
            ScanError::PermissionDenied => SessionEvent::NoPermission,
            ScanError::Disconnected => SessionEvent::Disconnected,
            other => SessionEvent::OpenFailed(other),
        };
        (self.notify)(event);
    }
}

/// Handle to a camera session running on its own thread.
///
/// Dropping the handle closes the camera and joins the thread.
pub struct CameraSession {
    commands: Sender<Command>,
    shared: Arc<SessionShared>,
    worker: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl CameraSession {
    /// Starts the session thread. Nothing is opened until [`CameraSession::open`].
    pub fn spawn(
        backend: Box<dyn CameraBackend>,
        options: SessionOptions,
        camera_lock: CameraLock,
        frame_callback: FrameCallback,
        notify: SessionNotifier,
    ) -> Result<Self, ScanError> {
        let (commands, inbox) = mpsc::channel();
        let shared = Arc::new(SessionShared {
            state: Mutex::new(SessionState::Idle),
            flash_on: AtomicBool::new(false),
            preview: Mutex::new(None),
        });
        let close_timeout = options.lock_timeout * 2 + Duration::from_millis(500);

        let worker = SessionWorker {
            backend,
            options,
            camera_lock,
            notify,
            frame_callback,
            shared: Arc::clone(&shared),
            inbox: commands.clone(),
            generation: 0,
            state: SessionState::Idle,
            phase: Phase::Idle,
            active: None,
            close_waiters: Vec::new(),
            deferred_open: None,
            shutting_down: false,
        };
        let handle = thread::Builder::new()
            .name("camera-session".into())
            .spawn(move || worker.run(inbox))
            .map_err(|e| ScanError::Backend(anyhow::anyhow!("failed to spawn camera thread: {e}")))?;

        Ok(Self {
            commands,
            shared,
            worker: Some(handle),
            close_timeout,
        })
    }

    /// Starts an open; the outcome arrives through the session notifier.
    pub fn open(&self, request: OpenRequest) {
        let _ = self.commands.send(Command::Open(request));
    }

    /// Closes the camera and waits until the device is released.
    pub fn close(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.commands.send(Command::Close(Some(done_tx))).is_err() {
            return;
        }
        if done_rx.recv_timeout(self.close_timeout).is_err() {
            warn!("Camera close did not complete within {:?}", self.close_timeout);
        }
    }

    pub fn set_flash(&self, on: bool) {
        let _ = self.commands.send(Command::Flash(on));
    }

    pub fn is_flash_on(&self) -> bool {
        self.shared.flash_on.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    /// Live preview target used by the next configure.
    pub fn set_preview_surface(&self, surface: Option<Arc<dyn FrameSurface>>) {
        *lock(&self.shared.preview) = surface;
    }

    /// Closes the camera and joins the session thread.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if worker.join().is_err() {
            warn!("Camera session thread panicked");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
