//! Decode stage: engine contract, latest-wins queue, decoder adapter and
//! result confirmation.

mod confirm;
mod decoder;
mod queue;
mod rqrr_engine;

pub use confirm::{ResultConfirmer, DEFAULT_CONFIRM_THRESHOLD};
pub use decoder::{DecodeNotifier, Decoder};
pub use queue::{DecodeQueue, SubmitOutcome};
pub use rqrr_engine::RqrrEngine;

use crate::geometry::PixelRect;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Barcode symbologies with their stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolType {
    Partial,
    Ean8,
    UpcE,
    Isbn10,
    UpcA,
    Ean13,
    Isbn13,
    I25,
    Databar,
    DatabarExp,
    Codabar,
    Code39,
    Pdf417,
    QrCode,
    Code93,
    Code128,
}

impl SymbolType {
    pub const ALL: [SymbolType; 16] = [
        SymbolType::Partial,
        SymbolType::Ean8,
        SymbolType::UpcE,
        SymbolType::Isbn10,
        SymbolType::UpcA,
        SymbolType::Ean13,
        SymbolType::Isbn13,
        SymbolType::I25,
        SymbolType::Databar,
        SymbolType::DatabarExp,
        SymbolType::Codabar,
        SymbolType::Code39,
        SymbolType::Pdf417,
        SymbolType::QrCode,
        SymbolType::Code93,
        SymbolType::Code128,
    ];

    pub fn code(self) -> u32 {
        match self {
            SymbolType::Partial => 1,
            SymbolType::Ean8 => 8,
            SymbolType::UpcE => 9,
            SymbolType::Isbn10 => 10,
            SymbolType::UpcA => 12,
            SymbolType::Ean13 => 13,
            SymbolType::Isbn13 => 14,
            SymbolType::I25 => 25,
            SymbolType::Databar => 34,
            SymbolType::DatabarExp => 35,
            SymbolType::Codabar => 38,
            SymbolType::Code39 => 39,
            SymbolType::Pdf417 => 57,
            SymbolType::QrCode => 64,
            SymbolType::Code93 => 93,
            SymbolType::Code128 => 128,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Everything except partial matches, UPC-E and DataBar.
    pub fn default_set() -> Vec<SymbolType> {
        Self::ALL
            .into_iter()
            .filter(|s| !matches!(s, SymbolType::Partial | SymbolType::UpcE | SymbolType::Databar))
            .collect()
    }
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolType::Partial => "PARTIAL",
            SymbolType::Ean8 => "EAN-8",
            SymbolType::UpcE => "UPC-E",
            SymbolType::Isbn10 => "ISBN-10",
            SymbolType::UpcA => "UPC-A",
            SymbolType::Ean13 => "EAN-13",
            SymbolType::Isbn13 => "ISBN-13",
            SymbolType::I25 => "I2/5",
            SymbolType::Databar => "DataBar",
            SymbolType::DatabarExp => "DataBar-Exp",
            SymbolType::Codabar => "Codabar",
            SymbolType::Code39 => "CODE-39",
            SymbolType::Pdf417 => "PDF417",
            SymbolType::QrCode => "QR-Code",
            SymbolType::Code93 => "CODE-93",
            SymbolType::Code128 => "CODE-128",
        };
        f.write_str(name)
    }
}

/// One symbol found by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub text: String,
    pub symbol_type: SymbolType,
    /// Engine-specific confidence, higher is better
    pub quality: i32,
}

/// Outcome of one decode, posted for every completed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    /// `None` when no symbol was found
    pub text: Option<String>,
    pub symbol_type: Option<SymbolType>,
    pub quality: i32,
    /// Caller token for one-off decodes, 0 for camera frames
    pub request_code: i32,
}

impl DecodeResult {
    pub fn miss(request_code: i32) -> Self {
        Self {
            text: None,
            symbol_type: None,
            quality: 0,
            request_code,
        }
    }

    pub fn hit(symbol: Symbol, request_code: i32) -> Self {
        Self {
            text: Some(symbol.text),
            symbol_type: Some(symbol.symbol_type),
            quality: symbol.quality,
            request_code,
        }
    }
}

/// A barcode decoding engine.
///
/// Calls are serialized by the [`Decoder`]; implementations never see two
/// decodes at once, nor a decode racing `release`.
pub trait DecodeEngine: Send {
    /// Restricts decoding to `symbologies`.
    fn configure_symbologies(&mut self, symbologies: &[SymbolType]);

    /// Decodes the `crop` window of a row-major luma buffer.
    fn decode(&mut self, luma: &[u8], width: u32, height: u32, crop: PixelRect) -> Result<Vec<Symbol>>;

    /// Frees native resources. No decode follows.
    fn release(&mut self);
}
