//! Face backend abstraction
//!
//! The layout and fallback logic only talks to faces through [`FontFace`],
//! so FreeType ([`super::freetype::FreeTypeFace`]) and the deterministic
//! [`super::headless::HeadlessFace`] are interchangeable.
//!
//! Coordinates follow FreeType conventions: positions are 26.6 fixed point,
//! matrices are 16.16 fixed point.

use std::fmt;

use bitflags::bitflags;

use crate::error::Result;
use crate::image::{Bitmap, PixelMode};

bitflags! {
    /// Glyph load flags (`FT_LOAD_*`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LoadFlags: i32 {
        const DEFAULT = 0;
        const NO_SCALE = 1 << 0;
        const NO_HINTING = 1 << 1;
        const RENDER = 1 << 2;
        const NO_BITMAP = 1 << 3;
        const VERTICAL_LAYOUT = 1 << 4;
        const FORCE_AUTOHINT = 1 << 5;
        const CROP_BITMAP = 1 << 6;
        const PEDANTIC = 1 << 7;
        const IGNORE_GLOBAL_ADVANCE_WIDTH = 1 << 9;
        const NO_RECURSE = 1 << 10;
        const IGNORE_TRANSFORM = 1 << 11;
        const MONOCHROME = 1 << 12;
        const LINEAR_DESIGN = 1 << 13;
        const NO_AUTOHINT = 1 << 15;
        const TARGET_LIGHT = 1 << 16;
        const TARGET_MONO = 2 << 16;
        const TARGET_LCD = 3 << 16;
        const TARGET_LCD_V = 4 << 16;
        const COLOR = 1 << 20;
    }
}

impl Default for LoadFlags {
    fn default() -> Self {
        Self::FORCE_AUTOHINT
    }
}

/// Kerning mode (`FT_KERNING_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KerningMode {
    /// Scaled and grid-fitted
    #[default]
    Default = 0,
    /// Scaled but not grid-fitted
    Unfitted = 1,
    /// Font units
    Unscaled = 2,
}

/// Charmap encoding tags (`FT_ENCODING_*`)
pub mod encoding {
    const fn tag(b: &[u8; 4]) -> u32 {
        (b[0] as u32) << 24 | (b[1] as u32) << 16 | (b[2] as u32) << 8 | b[3] as u32
    }

    pub const NONE: u32 = 0;
    pub const MS_SYMBOL: u32 = tag(b"symb");
    pub const UNICODE: u32 = tag(b"unic");
    pub const ADOBE_STANDARD: u32 = tag(b"ADOB");
    pub const ADOBE_EXPERT: u32 = tag(b"ADBE");
    pub const ADOBE_CUSTOM: u32 = tag(b"ADBC");
    pub const ADOBE_LATIN_1: u32 = tag(b"lat1");
    pub const APPLE_ROMAN: u32 = tag(b"armn");
}

/// 26.6 vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vector {
    pub x: i64,
    pub y: i64,
}

/// 26.6 bounding box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BBox {
    /// Accumulator start for layout: any real box replaces it
    pub(crate) const INVERTED: BBox = BBox {
        x_min: 32000,
        y_min: 32000,
        x_max: -32000,
        y_max: -32000,
    };

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max
    }
}

/// 16.16 transformation matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matrix {
    pub xx: i64,
    pub xy: i64,
    pub yx: i64,
    pub yy: i64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        xx: 0x10000,
        xy: 0,
        yx: 0,
        yy: 0x10000,
    };

    /// Counter-clockwise rotation by `degrees`
    pub fn rotation(degrees: f64) -> Self {
        let angle = degrees.to_radians();
        let cos = angle.cos() * 65536.0;
        let sin = angle.sin() * 65536.0;
        Self {
            xx: cos as i64,
            xy: -sin as i64,
            yx: sin as i64,
            yy: cos as i64,
        }
    }

    /// Same rounding as `FT_Vector_Transform`
    pub fn apply(&self, v: Vector) -> Vector {
        Vector {
            x: mul_fix(v.x, self.xx) + mul_fix(v.y, self.xy),
            y: mul_fix(v.x, self.yx) + mul_fix(v.y, self.yy),
        }
    }
}

/// `FT_MulFix`: (a * b) / 0x10000 rounded half away from zero
#[inline]
pub(crate) fn mul_fix(a: i64, b: i64) -> i64 {
    let ab = a * b;
    (ab + 0x8000 + (ab >> 63)) >> 16
}

/// FreeType error code reported per glyph (not fatal to layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineError {
    pub code: i32,
}

impl EngineError {
    pub fn error(&self) -> freetype::Error {
        freetype::Error::from(self.code)
    }
}

impl From<freetype::Error> for EngineError {
    fn from(error: freetype::Error) -> Self {
        Self { code: error as i32 }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {:#04x}: {}", self.code, self.error())
    }
}

/// Metrics of the most recently loaded glyph, 26.6 units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphMetrics {
    pub width: i64,
    pub height: i64,
    pub hori_bearing_x: i64,
    pub hori_bearing_y: i64,
    pub hori_advance: i64,
    /// 16.16
    pub linear_hori_advance: i64,
    pub vert_bearing_x: i64,
    pub vert_bearing_y: i64,
    pub vert_advance: i64,
}

/// Face-level properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceInfo {
    pub family_name: Option<String>,
    pub style_name: Option<String>,
    pub postscript_name: Option<String>,
    pub num_faces: i64,
    pub num_glyphs: i64,
    pub num_charmaps: usize,
    pub num_fixed_sizes: i64,
    pub face_flags: i64,
    pub style_flags: i64,
    pub scalable: bool,
    pub units_per_em: u16,
    /// Font units
    pub bbox: BBox,
    pub ascender: i16,
    pub descender: i16,
    pub height: i16,
    pub max_advance_width: i16,
    pub max_advance_height: i16,
    pub underline_position: i16,
    pub underline_thickness: i16,
}

/// Path codes (`MOVETO`, `LINETO`, ...)
pub mod path_code {
    pub const MOVETO: u8 = 1;
    pub const LINETO: u8 = 2;
    pub const CURVE3: u8 = 3;
    pub const CURVE4: u8 = 4;
    pub const CLOSEPOLY: u8 = 0x4f;
}

/// Outline of a glyph as vertices plus one code per vertex (pixels)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphPath {
    pub vertices: Vec<(f64, f64)>,
    pub codes: Vec<u8>,
}

impl GlyphPath {
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub(crate) fn move_to(&mut self, x: i64, y: i64) {
        if !self.codes.is_empty() {
            self.close();
        }
        self.push(x, y, path_code::MOVETO);
    }

    pub(crate) fn line_to(&mut self, x: i64, y: i64) {
        self.push(x, y, path_code::LINETO);
    }

    pub(crate) fn conic_to(&mut self, control: Vector, to: Vector) {
        self.push(control.x, control.y, path_code::CURVE3);
        self.push(to.x, to.y, path_code::CURVE3);
    }

    pub(crate) fn cubic_to(&mut self, c1: Vector, c2: Vector, to: Vector) {
        self.push(c1.x, c1.y, path_code::CURVE4);
        self.push(c2.x, c2.y, path_code::CURVE4);
        self.push(to.x, to.y, path_code::CURVE4);
    }

    pub(crate) fn close(&mut self) {
        self.vertices.push((0.0, 0.0));
        self.codes.push(path_code::CLOSEPOLY);
    }

    fn push(&mut self, x: i64, y: i64, code: u8) {
        self.vertices.push((x as f64 / 64.0, y as f64 / 64.0));
        self.codes.push(code);
    }
}

/// A rasterized glyph, owned copy of the engine bitmap
#[derive(Debug, Clone)]
pub struct RenderedGlyph {
    /// Left bearing in pixels
    pub left: i32,
    /// Top bearing in pixels (distance from baseline, y up)
    pub top: i32,
    pub width: u32,
    pub rows: u32,
    pub pitch: i32,
    pub mode: PixelMode,
    pub buffer: Vec<u8>,
}

impl RenderedGlyph {
    pub fn bitmap(&self) -> Bitmap<'_> {
        Bitmap {
            width: self.width,
            rows: self.rows,
            pitch: self.pitch,
            mode: self.mode,
            buffer: &self.buffer,
        }
    }
}

/// A loaded glyph detached from its face
pub trait GlyphOutline {
    /// Apply `matrix` then translate by `delta`
    fn transform(&mut self, matrix: Option<&Matrix>, delta: Option<Vector>) -> Result<()>;
    /// Control box in subpixels
    fn cbox(&self) -> BBox;
    /// Rasterize; `antialiased` selects gray coverage over 1-bit mono
    fn render(&self, antialiased: bool) -> Result<RenderedGlyph>;
}

/// One parsed face
pub trait FontFace {
    type Glyph: GlyphOutline;

    fn info(&self) -> FaceInfo;

    fn family_name(&self) -> Option<String>;

    /// Glyph index for `charcode` in the active charmap, 0 (notdef) if absent
    fn char_index(&self, charcode: u32) -> u32;

    /// Set the nominal size; horizontal resolution is multiplied by
    /// `hinting_factor` and compensated by a transform
    fn set_char_size(&mut self, ptsize: f64, dpi: f64, hinting_factor: u32) -> Result<()>;

    fn num_charmaps(&self) -> usize;

    /// Activate the charmap at `index` (already bounds-checked)
    fn set_charmap(&mut self, index: usize) -> Result<()>;

    fn select_charmap(&mut self, encoding: u32) -> Result<()>;

    /// Load a glyph into the face's slot
    fn load_glyph(&mut self, glyph_index: u32, flags: LoadFlags) -> std::result::Result<(), EngineError>;

    /// Copy the slot's glyph out of the face
    fn get_glyph(&self) -> std::result::Result<Self::Glyph, EngineError>;

    /// Advance of the slot's glyph (26.6, after the size transform)
    fn glyph_advance(&self) -> Vector;

    fn glyph_metrics(&self) -> GlyphMetrics;

    /// Outline of the slot's glyph
    fn glyph_path(&self) -> Result<GlyphPath>;

    fn has_kerning(&self) -> bool;

    /// Kerning vector, `None` if the engine has no value for the pair
    fn kerning(&self, left: u32, right: u32, mode: KerningMode) -> Option<Vector>;

    /// Engine glyph name, `Ok(None)` when the face carries no names
    fn glyph_name(&self, glyph_index: u32) -> Result<Option<String>>;

    /// Glyph index for a glyph name, 0 if unknown
    fn name_index(&self, name: &str) -> u32;

    /// All (charcode, glyph index) pairs of the active charmap
    fn charmap(&self) -> Vec<(u32, u32)>;
}
