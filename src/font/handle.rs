//! Font handle
//!
//! One face plus everything a layout pass accumulates on it: the glyph
//! sequence, pen, bounding box and the per-pass resolution caches.
//! Operations that only touch this font live here; anything that walks
//! the fallback chain goes through [`super::FontRegistry`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::warn;

use super::face::{BBox, FaceInfo, FontFace, GlyphMetrics, GlyphOutline, GlyphPath, Vector};
use super::freetype::FreeTypeFace;
use super::registry::FontId;
use crate::error::{FontError, Result};
use crate::image::FtImage;

/// Largest accepted kerning factor; the kerning divisor is
/// `hinting_factor << kerning_factor` and must stay within an `i64`
pub const MAX_KERNING_FACTOR: u32 = 31;

pub(crate) fn check_kerning_factor(factor: u32) -> Result<u32> {
    if factor > MAX_KERNING_FACTOR {
        return Err(FontError::InvalidKerningFactor(factor));
    }
    Ok(factor)
}

/// Called with a missing codepoint and the family names that were checked
pub type WarnCallback = Box<dyn Fn(u32, &BTreeSet<String>)>;

/// Where font bytes come from
#[derive(Debug, Clone)]
pub enum FontSource {
    Path(PathBuf),
    Memory(Vec<u8>),
}

/// Construction options for a font handle
pub struct FontOptions {
    /// Horizontal oversampling for hinting, at least 1
    pub hinting_factor: i64,
    /// Extra right shift applied to kerning values, at most
    /// [`MAX_KERNING_FACTOR`]
    pub kerning_factor: u32,
    /// Searched in order when this font lacks a glyph
    pub fallbacks: Vec<FontId>,
    /// Warn whenever this font ends up supplying a glyph
    pub warn_if_used: bool,
    /// Replaces the default `log::warn!` for missing glyphs
    pub warn: Option<WarnCallback>,
}

impl Default for FontOptions {
    fn default() -> Self {
        Self {
            hinting_factor: 8,
            kerning_factor: 0,
            fallbacks: Vec::new(),
            warn_if_used: false,
            warn: None,
        }
    }
}

impl FontOptions {
    pub fn hinting_factor(mut self, factor: i64) -> Self {
        self.hinting_factor = factor;
        self
    }

    pub fn kerning_factor(mut self, factor: u32) -> Self {
        self.kerning_factor = factor;
        self
    }

    pub fn fallbacks(mut self, fallbacks: Vec<FontId>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn warn_if_used(mut self, warn_if_used: bool) -> Self {
        self.warn_if_used = warn_if_used;
        self
    }

    pub fn on_missing_glyph(mut self, callback: impl Fn(u32, &BTreeSet<String>) + 'static) -> Self {
        self.warn = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for FontOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontOptions")
            .field("hinting_factor", &self.hinting_factor)
            .field("kerning_factor", &self.kerning_factor)
            .field("fallbacks", &self.fallbacks)
            .field("warn_if_used", &self.warn_if_used)
            .field("warn", &self.warn.is_some())
            .finish()
    }
}

/// A face and its layout state
pub struct FontHandle<F: FontFace = FreeTypeFace> {
    pub(crate) face: F,
    pub(crate) image: FtImage,
    pub(crate) hinting_factor: u32,
    pub(crate) kerning_factor: u32,
    pub(crate) fallbacks: Vec<FontId>,
    pub(crate) char_to_font: HashMap<u32, FontId>,
    pub(crate) glyph_to_font: HashMap<u32, FontId>,
    pub(crate) glyphs: Vec<F::Glyph>,
    pub(crate) pen: Vector,
    pub(crate) bbox: BBox,
    pub(crate) advance: i64,
    pub(crate) slot_loaded: bool,
    warn_if_used: bool,
    warn: Option<WarnCallback>,
    warned: HashSet<u32>,
    path: Option<PathBuf>,
}

impl<F: FontFace> FontHandle<F> {
    pub(crate) fn new(face: F, options: FontOptions) -> Result<Self> {
        let hinting_factor = u32::try_from(options.hinting_factor)
            .ok()
            .filter(|&f| f >= 1)
            .ok_or(FontError::InvalidHintingFactor(options.hinting_factor))?;
        let kerning_factor = check_kerning_factor(options.kerning_factor)?;

        Ok(Self {
            face,
            image: FtImage::default(),
            hinting_factor,
            kerning_factor,
            fallbacks: options.fallbacks,
            char_to_font: HashMap::new(),
            glyph_to_font: HashMap::new(),
            glyphs: Vec::new(),
            pen: Vector::default(),
            bbox: BBox::default(),
            advance: 0,
            slot_loaded: false,
            warn_if_used: options.warn_if_used,
            warn: options.warn,
            warned: HashSet::new(),
            path: None,
        })
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    /// Reset pen, bounding box, glyphs and caches of this font only
    pub(crate) fn reset(&mut self) {
        self.pen = Vector::default();
        self.bbox = BBox::default();
        self.advance = 0;
        self.glyphs.clear();
        self.char_to_font.clear();
        self.glyph_to_font.clear();
        self.warned.clear();
    }

    /// Report a codepoint once per layout pass
    pub(crate) fn warn_missing(&mut self, charcode: u32, families: &BTreeSet<String>) {
        if !self.warned.insert(charcode) {
            return;
        }
        match &self.warn {
            Some(callback) => callback(charcode, families),
            None => {
                let shown = char::from_u32(charcode).unwrap_or(char::REPLACEMENT_CHARACTER);
                let names: Vec<&str> = families.iter().map(String::as_str).collect();
                warn!(
                    "Glyph U+{:04X} ({}) missing from font(s) {}",
                    charcode,
                    shown,
                    names.join(", ")
                );
            }
        }
    }

    pub fn face(&self) -> &F {
        &self.face
    }

    pub fn info(&self) -> FaceInfo {
        self.face.info()
    }

    pub fn family_name(&self) -> Option<String> {
        self.face.family_name()
    }

    /// File the font was opened from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn hinting_factor(&self) -> u32 {
        self.hinting_factor
    }

    pub fn kerning_factor(&self) -> u32 {
        self.kerning_factor
    }

    pub fn fallbacks(&self) -> &[FontId] {
        &self.fallbacks
    }

    pub fn warn_if_used(&self) -> bool {
        self.warn_if_used
    }

    /// Number of glyphs in this font's sequence
    pub fn num_glyphs(&self) -> usize {
        self.glyphs.len()
    }

    /// Bounding box of the last layout, 26.6
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Rotated pen x after the last layout, 26.6
    pub fn advance(&self) -> i64 {
        self.advance
    }

    /// Unrotated pen after the last layout, 26.6
    pub fn pen(&self) -> Vector {
        self.pen
    }

    /// (advance, bbox height) of the last layout, 26.6
    pub fn get_width_height(&self) -> (i64, i64) {
        (self.advance, self.bbox.y_max - self.bbox.y_min)
    }

    pub fn get_bitmap_offset(&self) -> (i64, i64) {
        (self.bbox.x_min, 0)
    }

    /// Depth below the baseline, 26.6
    pub fn get_descent(&self) -> i64 {
        -self.bbox.y_min
    }

    pub fn image(&self) -> &FtImage {
        &self.image
    }

    /// Control box of a laid-out glyph, 26.6
    pub fn glyph_bbox(&self, index: usize) -> Result<BBox> {
        self.glyphs
            .get(index)
            .map(GlyphOutline::cbox)
            .ok_or(FontError::GlyphIndexOutOfRange {
                index,
                len: self.glyphs.len(),
            })
    }

    /// Metrics of the glyph in the face's slot, horizontal extents
    /// divided by the hinting factor
    pub fn glyph_metrics(&self) -> Result<GlyphMetrics> {
        if !self.slot_loaded {
            return Err(FontError::NoGlyphLoaded);
        }
        let hf = self.hinting_factor as i64;
        let raw = self.face.glyph_metrics();
        Ok(GlyphMetrics {
            width: raw.width / hf,
            hori_bearing_x: raw.hori_bearing_x / hf,
            linear_hori_advance: raw.linear_hori_advance / hf,
            ..raw
        })
    }

    /// Outline of the glyph in the face's slot
    pub fn get_path(&self) -> Result<GlyphPath> {
        if !self.slot_loaded {
            return Err(FontError::NoGlyphLoaded);
        }
        self.face.glyph_path()
    }

    pub fn set_charmap(&mut self, index: usize) -> Result<()> {
        let available = self.face.num_charmaps();
        if index >= available {
            return Err(FontError::CharmapOutOfRange { index, available });
        }
        self.face.set_charmap(index)
    }

    pub fn select_charmap(&mut self, encoding: u32) -> Result<()> {
        self.face.select_charmap(encoding)
    }

    pub fn get_name_index(&self, name: &str) -> u32 {
        self.face.name_index(name)
    }

    /// All (charcode, glyph index) pairs of the active charmap
    pub fn get_charmap(&self) -> Vec<(u32, u32)> {
        self.face.charmap()
    }

    /// Render every laid-out glyph into the internal image, sized to the
    /// layout's bounding box plus a one pixel margin on each side
    pub fn draw_glyphs_to_bitmap(&mut self, antialiased: bool) -> Result<&FtImage> {
        let bbox = self.bbox;
        let width = (bbox.x_max - bbox.x_min) / 64 + 2;
        let height = (bbox.y_max - bbox.y_min) / 64 + 2;
        let alloc_err = || FontError::Alloc {
            width: width.max(0) as u64,
            height: height.max(0) as u64,
        };
        let width = u32::try_from(width).map_err(|_| alloc_err())?;
        let height = u32::try_from(height).map_err(|_| alloc_err())?;
        self.image.resize(width, height)?;

        let x_min = bbox.x_min as f64 / 64.0;
        let y_max = bbox.y_max as f64 / 64.0;
        for glyph in &self.glyphs {
            let rendered = glyph.render(antialiased)?;
            let x = (rendered.left as f64 - x_min) as i32;
            let y = (y_max - rendered.top as f64 + 1.0) as i32;
            self.image.draw_bitmap(&rendered.bitmap(), x, y);
        }
        Ok(&self.image)
    }

    /// Render glyph `index` of the sequence into `image` at (x, y)
    pub fn draw_glyph_to_bitmap(
        &self,
        image: &mut FtImage,
        x: i32,
        y: i32,
        index: usize,
        antialiased: bool,
    ) -> Result<()> {
        let glyph = self.glyphs.get(index).ok_or(FontError::GlyphIndexOutOfRange {
            index,
            len: self.glyphs.len(),
        })?;
        let rendered = glyph.render(antialiased)?;
        image.draw_bitmap(&rendered.bitmap(), x + rendered.left, y);
        Ok(())
    }
}
