//! CPU image-reader sink: extracts luma directly on the camera thread.

use super::{FrameCallback, FrameSink, FrameSurface};
use crate::frame::VideoFrame;
use crate::geometry::Resolution;
use crate::utils::{lock, FpsCounter};
use std::sync::{Arc, Mutex};
use tracing::warn;

struct ReaderSurface {
    resolution: Resolution,
    callback: Mutex<Option<FrameCallback>>,
    fps: Mutex<FpsCounter>,
}

impl FrameSurface for ReaderSurface {
    fn on_frame(&self, frame: &VideoFrame) {
        let Some(callback) = lock(&self.callback).clone() else {
            return;
        };
        let converted = frame
            .to_luma()
            .and_then(|luma| luma.resized(self.resolution.width, self.resolution.height));
        match converted {
            Ok(buffer) => {
                lock(&self.fps).update();
                callback(buffer);
            }
            Err(e) => warn!("Image reader dropped a frame: {:#}", e),
        }
    }
}

/// Converter without GPU involvement, also used by the single-stream session.
pub struct ImageReaderSink {
    surface: Arc<ReaderSurface>,
}

impl ImageReaderSink {
    pub fn new(resolution: Resolution, callback: FrameCallback) -> Self {
        Self {
            surface: Arc::new(ReaderSurface {
                resolution,
                callback: Mutex::new(Some(callback)),
                fps: Mutex::new(FpsCounter::new("image-reader")),
            }),
        }
    }
}

impl FrameSink for ImageReaderSink {
    fn surface(&self) -> Arc<dyn FrameSurface> {
        self.surface.clone()
    }

    fn resolution(&self) -> Resolution {
        self.surface.resolution
    }

    fn close(&mut self) {
        lock(&self.surface.callback).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameBuffer, PixelFormat};

    #[test]
    fn test_converts_and_stops_after_close() {
        let received: Arc<Mutex<Vec<FrameBuffer>>> = Arc::default();
        let sink_received = received.clone();
        let mut sink = ImageReaderSink::new(
            Resolution::new(2, 1),
            Arc::new(move |buffer| sink_received.lock().unwrap().push(buffer)),
        );

        let frame = VideoFrame::from_data(4, 2, PixelFormat::Gray, vec![50; 8]);
        sink.surface().on_frame(&frame);
        sink.close();
        sink.surface().on_frame(&frame);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!((received[0].width, received[0].height), (2, 1));
        assert_eq!(received[0].data, vec![50, 50]);
    }
}
