//! QR engine backed by `rqrr`.

use super::{DecodeEngine, Symbol, SymbolType};
use crate::geometry::PixelRect;
use anyhow::{anyhow, Result};
use rqrr::PreparedImage;
use tracing::{debug, trace};

/// Decodes QR codes only. Other symbologies are accepted in the enabled set
/// but never reported.
pub struct RqrrEngine {
    qr_enabled: bool,
    released: bool,
}

impl RqrrEngine {
    pub fn new() -> Self {
        Self {
            qr_enabled: true,
            released: false,
        }
    }
}

impl Default for RqrrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeEngine for RqrrEngine {
    fn configure_symbologies(&mut self, symbologies: &[SymbolType]) {
        self.qr_enabled = symbologies.contains(&SymbolType::QrCode);
        debug!(qr = self.qr_enabled, "rqrr symbologies configured");
    }

    fn decode(&mut self, luma: &[u8], width: u32, height: u32, crop: PixelRect) -> Result<Vec<Symbol>> {
        if self.released {
            return Err(anyhow!("decode engine released"));
        }
        if !self.qr_enabled {
            return Ok(Vec::new());
        }
        let (stride, rows) = (width as usize, height as usize);
        if luma.len() < stride * rows {
            return Err(anyhow!("luma buffer too short for {}x{}", width, height));
        }
        if crop.width == 0
            || crop.height == 0
            || crop.x + crop.width > width
            || crop.y + crop.height > height
        {
            return Err(anyhow!("crop {:?} outside {}x{} frame", crop, width, height));
        }

        let (x0, y0) = (crop.x as usize, crop.y as usize);
        let mut prepared = PreparedImage::prepare_from_greyscale(crop.width as usize, crop.height as usize, |x, y| {
            luma[(y0 + y) * stride + x0 + x]
        });

        let mut symbols = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => symbols.push(Symbol {
                    text: content,
                    symbol_type: SymbolType::QrCode,
                    quality: 1,
                }),
                Err(e) => trace!("QR grid found but not decodable: {}", e),
            }
        }
        Ok(symbols)
    }

    fn release(&mut self) {
        self.released = true;
    }
}
