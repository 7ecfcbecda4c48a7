//! Codescan: barcode scanner CLI.

use anyhow::{anyhow, Result};
use clap::Parser;
use codescan::camera::{CameraApi, CameraBackend, SyntheticBackend, SyntheticConfig};
use codescan::config::{ConfigWatcher, ScannerConfig};
use codescan::convert::ConverterKind;
use codescan::decode::DecodeResult;
use codescan::geometry::{DeviceOrientation, NormalizedRect, Resolution, ViewRect};
use codescan::{ScanError, ScanListener, ScanPipeline};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Scan barcodes from a webcam or an image.
#[derive(Parser, Debug)]
#[command(name = "codescan")]
#[command(about = "Decode barcodes and QR codes from a camera stream")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(short, long)]
    device: Option<u32>,

    /// List available cameras and exit
    #[arg(long)]
    list_devices: bool,

    /// Stream this image from a synthetic camera instead of a webcam
    #[arg(long, value_name = "IMAGE")]
    synthetic: Option<PathBuf>,

    /// Host window rotation: 0, 90, 180 or 270
    #[arg(long, default_value = "90", value_parser = parse_rotation)]
    rotation: DeviceOrientation,

    /// Preview view size
    #[arg(long, default_value = "1280x720")]
    preview: Resolution,

    /// Region of interest in preview pixels: left,top,right,bottom
    #[arg(long)]
    roi: Option<ViewRect>,

    /// Frame converter
    #[arg(long, value_enum)]
    converter: Option<ConverterKind>,

    /// Use the single-stream session with CPU conversion
    #[arg(long)]
    legacy: bool,

    /// Turn the torch on once streaming
    #[arg(long)]
    flash: bool,

    /// Decode one image file and exit
    #[arg(long, value_name = "IMAGE")]
    decode_file: Option<PathBuf>,

    /// Reload decoder settings when the config file changes
    #[arg(long)]
    watch_config: bool,
}

fn parse_rotation(s: &str) -> Result<DeviceOrientation, String> {
    let degrees: u32 = s.parse().map_err(|e| format!("{e}"))?;
    DeviceOrientation::from_degrees(degrees).ok_or_else(|| format!("rotation must be 0, 90, 180 or 270, got {degrees}"))
}

/// Prints results and remembers whether the camera is gone.
struct CliListener {
    flash: bool,
    streaming: bool,
    failed: bool,
    last_result: Option<DecodeResult>,
}

impl ScanListener for CliListener {
    fn on_open_success(&mut self, width: u32, height: u32, rotation_degrees: u32) {
        info!("Camera open: {}x{} upright, rotate preview by {} degrees", width, height, rotation_degrees);
        self.streaming = true;
    }

    fn on_open_error(&mut self, error: &ScanError) {
        error!("Failed to open camera: {}", error);
        self.failed = true;
    }

    fn on_no_permission(&mut self) {
        error!("No permission to use the camera");
        self.failed = true;
    }

    fn on_disconnected(&mut self) {
        warn!("Camera disconnected");
        self.failed = true;
    }

    fn on_brightness_changed(&mut self, mean_luma: u8) {
        tracing::debug!(mean_luma, "brightness");
    }

    fn on_decode_complete(&mut self, result: &DecodeResult) {
        self.last_result = Some(result.clone());
    }

    fn on_decode_confirmed(&mut self, text: &str, result: &DecodeResult) {
        let symbology = result.symbol_type.map(|s| s.to_string()).unwrap_or_default();
        println!("[{}] {}", symbology, text);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };
    if args.legacy {
        config.camera.api = CameraApi::Legacy;
    }
    if let Some(converter) = args.converter {
        config.camera.converter = converter;
    }

    if let Some(path) = &args.decode_file {
        return decode_file(path, config);
    }

    run_scanner(args, config)
}

fn list_devices() -> Result<()> {
    println!("Available cameras:");
    match default_backend(None)?.cameras() {
        Ok(cameras) => {
            for camera in cameras {
                println!("  [{}] {} ({:?})", camera.id, camera.name, camera.facing);
            }
        }
        Err(e) => eprintln!("Failed to list devices: {}", e),
    }
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
fn default_backend(device: Option<u32>) -> Result<Box<dyn CameraBackend>> {
    use codescan::camera::NokhwaBackend;
    Ok(Box::new(match device {
        Some(index) => NokhwaBackend::with_device(index),
        None => NokhwaBackend::new(),
    }))
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn default_backend(_device: Option<u32>) -> Result<Box<dyn CameraBackend>> {
    Err(anyhow!("no webcam backend on this platform; use --synthetic"))
}

fn decode_file(path: &PathBuf, config: ScannerConfig) -> Result<()> {
    let mut pipeline = ScanPipeline::builder()
        .backend(SyntheticBackend::new(SyntheticConfig::default()))
        .config(config)
        .build()?;
    pipeline.decode_file_for_result(path, NormalizedRect::FULL, 1)?;

    let mut listener = CliListener {
        flash: false,
        streaming: false,
        failed: false,
        last_result: None,
    };
    let deadline = Instant::now() + Duration::from_secs(10);
    while listener.last_result.is_none() && Instant::now() < deadline {
        pipeline.dispatch(&mut listener, Duration::from_millis(100));
    }
    pipeline.detach();

    match listener.last_result.and_then(|r| r.text.map(|text| (r.symbol_type, text))) {
        Some((symbol_type, text)) => {
            let symbology = symbol_type.map(|s| s.to_string()).unwrap_or_default();
            println!("[{}] {}", symbology, text);
            Ok(())
        }
        None => Err(anyhow!("no symbol found in {:?}", path)),
    }
}

fn run_scanner(args: Args, config: ScannerConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let builder = ScanPipeline::builder().config(config.clone());
    let builder = match &args.synthetic {
        Some(path) => {
            let image = image::open(path)?;
            info!("Streaming {:?} from a synthetic camera", path);
            builder.backend(SyntheticBackend::new(SyntheticConfig::still_image(&image)))
        }
        None => builder.boxed_backend(default_backend(args.device)?),
    };
    let mut pipeline = builder.build()?;

    let mut watcher = match (&args.config, args.watch_config) {
        (Some(path), true) => match ConfigWatcher::new(path.clone(), config) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        },
        _ => None,
    };

    pipeline.set_preview_size(args.preview.width, args.preview.height)?;
    if let Some(roi) = args.roi {
        pipeline.set_region_of_interest(roi.left, roi.top, roi.right, roi.bottom);
    }
    pipeline.open_camera(args.rotation)?;

    let mut listener = CliListener {
        flash: args.flash,
        streaming: false,
        failed: false,
        last_result: None,
    };
    let mut flash_requested = false;

    while running.load(Ordering::SeqCst) && !listener.failed {
        pipeline.dispatch(&mut listener, Duration::from_millis(100));

        if listener.flash && listener.streaming && !flash_requested {
            pipeline.open_flash();
            flash_requested = true;
        }
        if let Some(decoder) = watcher.as_mut().and_then(|w| w.check_for_changes()) {
            info!("Applying reloaded decoder settings");
            pipeline.apply_decoder_config(decoder);
        }
    }

    info!(dropped = pipeline.dropped_frames(), "Shutting down");
    pipeline.close_camera();
    pipeline.detach();
    Ok(())
}
