//! GPU frame sink: a render thread that owns the wgpu context.
//!
//! The camera thread only parks the newest frame in a slot and signals the
//! render thread. Upload, draw and readback all happen on the render thread.

use super::gpu_context::GpuContext;
use super::luma_pipeline::LumaPipeline;
use super::{FrameCallback, FrameSink, FrameSurface};
use crate::error::ScanError;
use crate::frame::VideoFrame;
use crate::geometry::Resolution;
use crate::utils::{lock, FpsCounter};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

enum Signal {
    FrameAvailable,
    Shutdown,
}

/// Camera-facing side of the GPU sink.
struct ExternalSurface {
    latest: Mutex<Option<VideoFrame>>,
    listener: Mutex<Option<Sender<Signal>>>,
}

impl ExternalSurface {
    fn take_latest(&self) -> Option<VideoFrame> {
        lock(&self.latest).take()
    }

    /// Stops frame-available signals; frames arriving afterwards are ignored.
    fn detach(&self) {
        let mut listener = lock(&self.listener);
        *listener = None;
        lock(&self.latest).take();
    }
}

impl FrameSurface for ExternalSurface {
    fn on_frame(&self, frame: &VideoFrame) {
        let listener = lock(&self.listener);
        let Some(signals) = listener.as_ref() else {
            return;
        };
        // Overwrite: the render thread only ever wants the newest frame.
        *lock(&self.latest) = Some(frame.clone());
        let _ = signals.send(Signal::FrameAvailable);
    }
}

/// Luma converter backed by [`LumaPipeline`] on a dedicated render thread.
pub struct GpuFrameSink {
    surface: Arc<ExternalSurface>,
    signals: Sender<Signal>,
    worker: Option<JoinHandle<()>>,
    resolution: Resolution,
}

impl GpuFrameSink {
    /// Starts the render thread and waits until its GPU objects exist.
    ///
    /// Every texture is allocated here, sized for `input` camera frames and
    /// `resolution` luma, so sizes the device cannot handle fail the open.
    pub fn spawn(input: Resolution, resolution: Resolution, callback: FrameCallback) -> Result<Self, ScanError> {
        let (signal_tx, signal_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<anyhow::Result<()>>(1);
        let surface = Arc::new(ExternalSurface {
            latest: Mutex::new(None),
            listener: Mutex::new(Some(signal_tx.clone())),
        });

        let render_surface = Arc::clone(&surface);
        let worker = thread::Builder::new()
            .name("frame-converter".into())
            .spawn(move || {
                let pipeline = match GpuContext::new_headless().and_then(|ctx| LumaPipeline::new(ctx, input, resolution)) {
                    Ok(pipeline) => {
                        let _ = ready_tx.send(Ok(()));
                        pipeline
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                render_loop(pipeline, &render_surface, signal_rx, callback);
                render_surface.detach();
            })
            .map_err(|e| ScanError::GpuResource(format!("failed to spawn render thread: {e}")))?;

        let ready = ready_rx.recv();
        match ready {
            Ok(Ok(())) => {
                info!("GPU frame converter ready at {}", resolution);
                Ok(Self {
                    surface,
                    signals: signal_tx,
                    worker: Some(worker),
                    resolution,
                })
            }
            Ok(Err(e)) => {
                surface.detach();
                let _ = worker.join();
                Err(ScanError::GpuResource(format!("{e:#}")))
            }
            Err(_) => {
                surface.detach();
                let _ = worker.join();
                Err(ScanError::GpuResource("render thread exited during setup".into()))
            }
        }
    }
}

fn render_loop(
    mut pipeline: LumaPipeline,
    surface: &ExternalSurface,
    signals: Receiver<Signal>,
    callback: FrameCallback,
) {
    let mut fps = FpsCounter::new("gpu-converter");
    while let Ok(signal) = signals.recv() {
        match signal {
            Signal::Shutdown => break,
            Signal::FrameAvailable => {
                // Several signals may share one frame; later ones find the slot empty.
                let Some(frame) = surface.take_latest() else {
                    continue;
                };
                match pipeline.convert(&frame) {
                    Ok(buffer) => {
                        fps.update();
                        callback(buffer);
                    }
                    Err(e) => warn!("GPU luma conversion failed: {:#}", e),
                }
            }
        }
    }
    pipeline.release();
    debug!("Render thread finished");
}

impl FrameSink for GpuFrameSink {
    fn surface(&self) -> Arc<dyn FrameSurface> {
        self.surface.clone()
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // Detach before the GPU objects go away so late camera frames are dropped.
        self.surface.detach();
        let _ = self.signals.send(Signal::Shutdown);
        if worker.join().is_err() {
            warn!("Render thread panicked during shutdown");
        }
        info!("GPU frame converter closed");
    }
}

impl Drop for GpuFrameSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn surface() -> (ExternalSurface, Receiver<Signal>) {
        let (tx, rx) = mpsc::channel();
        let surface = ExternalSurface {
            latest: Mutex::new(None),
            listener: Mutex::new(Some(tx)),
        };
        (surface, rx)
    }

    fn frame(value: u8) -> VideoFrame {
        VideoFrame::from_data(2, 2, PixelFormat::Gray, vec![value; 4])
    }

    #[test]
    fn test_surface_keeps_newest_frame() {
        let (surface, signals) = surface();
        surface.on_frame(&frame(1));
        surface.on_frame(&frame(2));

        assert_eq!(signals.try_iter().count(), 2);
        assert_eq!(surface.take_latest().map(|f| f.data[0]), Some(2));
        assert!(surface.take_latest().is_none());
    }

    #[test]
    fn test_detached_surface_ignores_frames() {
        let (surface, signals) = surface();
        surface.on_frame(&frame(1));
        surface.detach();
        assert!(surface.take_latest().is_none());

        surface.on_frame(&frame(2));
        assert!(surface.take_latest().is_none());
        // One signal from before the detach, then the sender is gone.
        assert_eq!(signals.try_iter().count(), 1);
        assert!(signals.recv().is_err());
    }

    #[test]
    fn test_oversized_input_fails_setup() {
        let callback: FrameCallback = Arc::new(|_| {});
        let result = GpuFrameSink::spawn(Resolution::new(100_000, 100_000), Resolution::new(640, 480), callback);
        // Without an adapter setup fails earlier, with the same error kind.
        assert!(matches!(result, Err(ScanError::GpuResource(_))));
    }
}
