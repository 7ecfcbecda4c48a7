//! Codescan: camera frame acquisition and barcode decoding.
//!
//! Opens a camera, converts its stream into luma buffers on the GPU (or the
//! CPU), projects a preview-space region of interest into sensor space and
//! feeds a decode engine under latest-frame-wins backpressure.

pub mod camera;
pub mod config;
pub mod convert;
pub mod decode;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod orientation;
pub mod pipeline;
pub mod sizing;
mod utils;

pub use error::{ErrorKind, ScanError};
pub use pipeline::{ScanEvent, ScanListener, ScanPipeline, ScanPipelineBuilder};
pub use utils::FpsCounter;
