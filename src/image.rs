//! Grayscale image buffer
//!
//! Target surface for rendered glyphs. Overlapping ink is combined with
//! `max`, so compositing one glyph never erases another.

use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::{FontError, Result};

/// Pixel layout of a source raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    /// 1 bit per pixel, most significant bit first
    Mono,
    /// 8 bits per pixel coverage
    Gray,
}

/// Borrowed source raster (usually a rendered glyph)
#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub rows: u32,
    /// Bytes per row (sign ignored)
    pub pitch: i32,
    pub mode: PixelMode,
    pub buffer: &'a [u8],
}

impl Bitmap<'_> {
    #[inline]
    fn coverage(&self, row: usize, col: usize) -> u8 {
        let pitch = self.pitch.unsigned_abs() as usize;
        match self.mode {
            PixelMode::Gray => self.buffer.get(row * pitch + col).copied().unwrap_or(0),
            PixelMode::Mono => {
                let byte = self.buffer.get(row * pitch + (col >> 3)).copied().unwrap_or(0);
                if byte & (0x80 >> (col & 7)) != 0 {
                    255
                } else {
                    0
                }
            }
        }
    }
}

/// Owned 8-bit grayscale raster, row-major. Empty (0x0) until first resized
#[derive(Debug, Clone, Default)]
pub struct FtImage {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl FtImage {
    /// Allocate a zeroed image
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut image = Self {
            width: 0,
            height: 0,
            buffer: Vec::new(),
        };
        image.resize(width, height)?;
        Ok(image)
    }

    /// Reallocate to `width` x `height`; previous content is discarded
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let alloc_err = || FontError::Alloc {
            width: width as u64,
            height: height as u64,
        };

        let len = (width as usize)
            .checked_mul(height as usize)
            .filter(|&n| n > 0)
            .ok_or_else(alloc_err)?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(|_| alloc_err())?;
        buffer.resize(len, 0);

        self.buffer = buffer;
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Pixel value, `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.buffer
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Composite `bitmap` with its top-left corner at (x, y), clipped to the image
    pub fn draw_bitmap(&mut self, bitmap: &Bitmap<'_>, x: i32, y: i32) {
        let image_width = self.width as i64;
        let image_height = self.height as i64;
        let (x, y) = (x as i64, y as i64);

        let x1 = x.clamp(0, image_width);
        let y1 = y.clamp(0, image_height);
        let x2 = (x + bitmap.width as i64).clamp(0, image_width);
        let y2 = (y + bitmap.rows as i64).clamp(0, image_height);

        for row in y1..y2 {
            let src_row = (row - y) as usize;
            let dst_row = (row * image_width) as usize;
            for col in x1..x2 {
                let value = bitmap.coverage(src_row, (col - x) as usize);
                let dst = &mut self.buffer[dst_row + col as usize];
                *dst = (*dst).max(value);
            }
        }
    }

    /// Fill the inclusive rectangle (x0, y0)-(x1, y1) with full intensity
    pub fn draw_rect_filled(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) {
        if x1 < x0 || y1 < y0 {
            return;
        }
        let x0 = x0.min(self.width) as usize;
        let y0 = y0.min(self.height) as usize;
        let x1 = (x1 as u64 + 1).min(self.width as u64) as usize;
        let y1 = (y1 as u64 + 1).min(self.height as u64) as usize;

        let width = self.width as usize;
        for row in y0..y1 {
            self.buffer[row * width + x0..row * width + x1].fill(255);
        }
    }

    /// Encode as 8-bit grayscale PNG
    pub fn write_png_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.buffer)?;
        Ok(())
    }

    /// Save as PNG file
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_png_to(std::io::BufWriter::new(file))?;
        info!("Image saved: {} ({}x{})", path.display(), self.width, self.height);
        Ok(())
    }
}
