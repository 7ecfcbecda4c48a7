//! Frame sinks turning camera frames into decoder-ready luma buffers.
//!
//! A sink owns the surface the camera streams into and calls back with one
//! freshly allocated [`FrameBuffer`] per converted frame. The GPU sink does the
//! work on its own render thread; the image-reader sink converts on the CPU.

mod gpu_context;
mod gpu_sink;
mod image_reader;
mod luma_pipeline;

pub use gpu_context::GpuContext;
pub use gpu_sink::GpuFrameSink;
pub use image_reader::ImageReaderSink;
pub use luma_pipeline::{LumaPipeline, LUMA_SHADER};

use crate::error::ScanError;
use crate::frame::{FrameBuffer, VideoFrame};
use crate::geometry::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Receives every converted frame.
pub type FrameCallback = Arc<dyn Fn(FrameBuffer) + Send + Sync>;

/// A stream target a camera backend writes frames into.
///
/// Called on the camera's own thread; implementations must return quickly.
pub trait FrameSurface: Send + Sync {
    fn on_frame(&self, frame: &VideoFrame);
}

/// A luma converter fed through its [`FrameSurface`].
pub trait FrameSink: Send {
    /// Surface to register as a capture target.
    fn surface(&self) -> Arc<dyn FrameSurface>;

    /// Size of the luma buffers this sink produces.
    fn resolution(&self) -> Resolution;

    /// Stops delivery and releases resources. Safe to call more than once.
    fn close(&mut self);
}

/// Which converter a session builds for its decode stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConverterKind {
    /// WGSL luma-packing shader on a dedicated render thread
    #[default]
    Gpu,
    /// CPU luma extraction on the camera thread
    ImageReader,
}

/// Builds the sink for `kind`, fed with `input` sized camera frames and producing
/// `resolution` sized luma. GPU setup failures surface as [`ScanError::GpuResource`].
pub fn create_sink(
    kind: ConverterKind,
    input: Resolution,
    resolution: Resolution,
    callback: FrameCallback,
) -> Result<Box<dyn FrameSink>, ScanError> {
    match kind {
        ConverterKind::Gpu => Ok(Box::new(GpuFrameSink::spawn(input, resolution, callback)?)),
        ConverterKind::ImageReader => Ok(Box::new(ImageReaderSink::new(resolution, callback))),
    }
}

type BuildSink =
    dyn Fn(ConverterKind, Resolution, Resolution, FrameCallback) -> Result<Box<dyn FrameSink>, ScanError> + Send + Sync;

/// How a session builds its sink on every open. Defaults to [`create_sink`].
#[derive(Clone)]
pub struct SinkFactory(Arc<BuildSink>);

impl SinkFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(ConverterKind, Resolution, Resolution, FrameCallback) -> Result<Box<dyn FrameSink>, ScanError>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(build))
    }

    pub fn build(
        &self,
        kind: ConverterKind,
        input: Resolution,
        resolution: Resolution,
        callback: FrameCallback,
    ) -> Result<Box<dyn FrameSink>, ScanError> {
        (self.0)(kind, input, resolution, callback)
    }
}

impl Default for SinkFactory {
    fn default() -> Self {
        Self::new(create_sink)
    }
}

impl fmt::Debug for SinkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SinkFactory")
    }
}
