//! Camera devices, the cross-session device lock and the session state machine.
//!
//! Backends are asynchronous in the same way mobile camera stacks are: opening a
//! device and configuring a capture session report back through a
//! [`DeviceCallback`] from whatever thread the backend uses.

mod lock;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
mod nokhwa_backend;
mod session;
pub mod synthetic;

pub use lock::{CameraLock, CameraLockGuard, DEFAULT_LOCK_TIMEOUT};
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use nokhwa_backend::NokhwaBackend;
pub use session::{
    CameraSession, DeviceCallback, OpenRequest, SessionEvent, SessionNotifier, SessionOptions,
    SessionState, Transition,
};
pub use synthetic::{SyntheticBackend, SyntheticConfig, SyntheticStats};

use crate::convert::FrameSurface;
use crate::geometry::Resolution;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    #[default]
    Back,
    Front,
    External,
}

/// Which session flavour drives the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CameraApi {
    /// Preview and decode targets on one capture session, converter chosen by config
    #[default]
    Modern,
    /// One stream converted on the CPU at the stream size
    Legacy,
}

/// A camera reported by a backend.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub facing: LensFacing,
    /// Stream sizes the device can deliver, sensor orientation
    pub output_sizes: Vec<Resolution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Off,
    ContinuousPicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    Off,
    Torch,
}

/// Settings of the repeating capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub focus: FocusMode,
    pub exposure: ExposureMode,
    pub flash: FlashMode,
}

impl CaptureRequest {
    /// Continuous autofocus, auto exposure, torch off.
    pub fn preview() -> Self {
        Self {
            focus: FocusMode::ContinuousPicture,
            exposure: ExposureMode::On,
            flash: FlashMode::Off,
        }
    }

    pub fn with_torch(self, on: bool) -> Self {
        Self {
            exposure: ExposureMode::On,
            flash: if on { FlashMode::Torch } else { FlashMode::Off },
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    Preview,
    Decode,
}

/// One output of a capture session.
#[derive(Clone)]
pub struct StreamTarget {
    pub role: TargetRole,
    pub surface: Arc<dyn FrameSurface>,
}

/// Stream layout handed to [`CameraDevice::create_session`].
#[derive(Clone)]
pub struct StreamConfig {
    pub stream_size: Resolution,
    pub targets: Vec<StreamTarget>,
}

/// Entry point to a camera stack.
pub trait CameraBackend: Send {
    /// Whether the process may use cameras at all.
    fn has_permission(&self) -> bool;

    /// Enumerates cameras and their stream sizes.
    fn cameras(&mut self) -> Result<Vec<CameraInfo>>;

    /// Starts opening `camera_id`. The device, or the failure, arrives through `callback`.
    fn open_device(&mut self, camera_id: &str, callback: DeviceCallback) -> Result<()>;
}

/// An opened camera device.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Starts building a capture session. Completion arrives through `callback`.
    fn create_session(&mut self, config: StreamConfig, callback: DeviceCallback) -> Result<()>;

    /// Releases the device. Must be idempotent.
    fn close(&mut self);
}

/// A configured capture session.
pub trait CaptureSession: Send {
    /// Replaces the repeating request; frames flow to every target until stopped.
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()>;

    fn stop_repeating(&mut self) -> Result<()>;

    /// Releases the session. Must be idempotent.
    fn close(&mut self);
}
