//! YAML scanner configuration and file watching.

use crate::camera::{CameraApi, LensFacing, SessionOptions, DEFAULT_LOCK_TIMEOUT};
use crate::convert::ConverterKind;
use crate::decode::{SymbolType, DEFAULT_CONFIRM_THRESHOLD};
use crate::sizing::DEFAULT_MAX_DECODE_PIXELS;
use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub api: CameraApi,
    /// Ignored by the legacy API, which always converts on the CPU.
    pub converter: ConverterKind,
    pub lock_timeout_ms: u64,
    pub max_decode_pixels: u64,
    pub brightness_feedback: bool,
    pub facing: LensFacing,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            api: CameraApi::Modern,
            converter: ConverterKind::Gpu,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            max_decode_pixels: DEFAULT_MAX_DECODE_PIXELS,
            brightness_feedback: true,
            facing: LensFacing::Back,
        }
    }
}

impl CameraConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            api: self.api,
            converter: self.converter,
            facing: self.facing,
            lock_timeout: self.lock_timeout(),
            max_decode_pixels: self.max_decode_pixels,
            ..SessionOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub symbologies: Vec<SymbolType>,
    pub confirm_threshold: u32,
    pub start_delay_ms: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            symbologies: SymbolType::default_set(),
            confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
            start_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub camera: CameraConfig,
    pub decoder: DecoderConfig,
}

impl ScannerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Watches a config file and re-reads it when it changes.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
    current: ScannerConfig,
}

impl ConfigWatcher {
    /// Starts watching `path`; `current` is what the running pipeline uses.
    pub fn new(path: PathBuf, current: ScannerConfig) -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file {:?}", path))?;
        info!("Watching config file {:?} for changes", path);
        Ok(Self {
            path,
            _watcher: watcher,
            rx,
            current,
        })
    }

    /// Returns the new decoder settings if the file changed them.
    ///
    /// Camera settings only apply on the next open; changes to them are logged.
    pub fn check_for_changes(&mut self) -> Option<DecoderConfig> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) => {
                    needs_reload = true;
                }
                Ok(_) => {}
                Err(e) => warn!("Config watch error: {}", e),
            }
        }
        if !needs_reload {
            return None;
        }

        info!("Config file changed, checking for updates...");
        let new_config = match ScannerConfig::load(&self.path) {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                return None;
            }
        };
        if new_config.camera != self.current.camera {
            warn!("Camera settings changed; they take effect on the next open");
        }
        let changed = (new_config.decoder != self.current.decoder).then(|| new_config.decoder.clone());
        self.current = new_config;
        changed
    }

    pub fn current(&self) -> &ScannerConfig {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ScannerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.camera.lock_timeout(), Duration::from_millis(2500));
        assert_eq!(config.decoder.confirm_threshold, 4);
    }

    #[test]
    fn test_partial_document() {
        let yaml = "
camera:
  api: legacy
  converter: image-reader
  facing: front
decoder:
  symbologies: [qr-code, ean13]
  start_delay_ms: 300
";
        let config = ScannerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.camera.api, CameraApi::Legacy);
        assert_eq!(config.camera.converter, ConverterKind::ImageReader);
        assert_eq!(config.camera.facing, LensFacing::Front);
        assert_eq!(config.camera.max_decode_pixels, 2_073_600);
        assert_eq!(config.decoder.symbologies, vec![SymbolType::QrCode, SymbolType::Ean13]);
        assert_eq!(config.decoder.start_delay_ms, 300);
        assert_eq!(config.decoder.confirm_threshold, 4);
    }

    #[test]
    fn test_unknown_symbology_is_rejected() {
        assert!(ScannerConfig::from_yaml("decoder:\n  symbologies: [aztec]\n").is_err());
    }
}
