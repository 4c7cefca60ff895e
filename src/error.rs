//! Error types
//!
//! Engine failures keep the failing FreeType call, where it was issued
//! and the numeric code, described through `freetype::Error`.

use std::path::PathBuf;
use thiserror::Error;

use crate::font::FontId;

#[derive(Error, Debug)]
pub enum FontError {
    /// A FreeType call returned a non-zero error code
    #[error("{op} ({file} line {line}) failed with error {code:#04x}: {error}")]
    FreeType {
        op: &'static str,
        file: &'static str,
        line: u32,
        code: i32,
        error: freetype::Error,
    },

    #[error("FreeType initialization failed: {0}")]
    Init(String),

    /// FreeType does not recognize the font container at all
    #[error("unsupported font format (error {code:#04x}: {error})")]
    UnsupportedFormat { code: i32, error: freetype::Error },

    #[error("failed to read font file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hinting factor must be at least 1, got {0}")]
    InvalidHintingFactor(i64),

    #[error("kerning factor must be at most 31, got {0}")]
    InvalidKerningFactor(u32),

    #[error("invalid font size: {ptsize}pt at {dpi} dpi")]
    InvalidSize { ptsize: f64, dpi: f64 },

    #[error("charmap index {index} exceeds the available number of charmaps ({available})")]
    CharmapOutOfRange { index: usize, available: usize },

    #[error("cannot allocate a {width}x{height} image")]
    Alloc { width: u64, height: u64 },

    #[error("font {0:?} is not registered")]
    UnknownFont(FontId),

    #[error("no glyph loaded")]
    NoGlyphLoaded,

    #[error("glyph number {index} is out of range (have {len})")]
    GlyphIndexOutOfRange { index: usize, len: usize },

    #[error("unknown bitmap pixel mode {0}")]
    UnknownPixelMode(u8),

    #[error("failed to write PNG: {0}")]
    Png(#[from] png::EncodingError),
}

pub type Result<T> = std::result::Result<T, FontError>;
