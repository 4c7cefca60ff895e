//! ftfont - FreeType font loading, fallback-aware text layout and
//! grayscale glyph rasterization

pub mod config;
pub mod error;
pub mod font;
pub mod image;

pub use error::{FontError, Result};
pub use image::{Bitmap, FtImage, PixelMode};
