//! Headless face backend
//!
//! Deterministic in-memory face for environments without font files.
//! Every defined character is a solid box: half an em wide and three
//! quarters of an em tall, sitting on the baseline. Glyph indices are
//! assigned in insertion order starting at 1; index 0 is notdef.

use std::collections::{HashMap, HashSet};

use super::face::{
    encoding, BBox, EngineError, FaceInfo, FontFace, GlyphMetrics, GlyphOutline, GlyphPath,
    KerningMode, LoadFlags, Matrix, RenderedGlyph, Vector,
};
use super::freetype::ft_error;
use crate::error::Result;
use crate::image::PixelMode;

const FT_ERR_INVALID_ARGUMENT: i32 = 0x06;
const FT_ERR_INVALID_GLYPH_INDEX: i32 = 0x10;
const FT_ERR_UNSUPPORTED_GLYPH_FORMAT: i32 = 0x12;
const FT_ERR_INVALID_OUTLINE: i32 = 0x14;
const FT_ERR_INVALID_PIXEL_SIZE: i32 = 0x17;

const UNITS_PER_EM: i64 = 1000;

/// Deterministic face with box glyphs
#[derive(Debug, Clone)]
pub struct HeadlessFace {
    family: String,
    chars: Vec<u32>,
    kerning: HashMap<(u32, u32), i64>,
    broken: HashSet<u32>,
    unextractable: HashSet<u32>,
    glyph_names: bool,
    ppem: i64,
    hinting_factor: i64,
    slot: Option<u32>,
}

impl HeadlessFace {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            chars: Vec::new(),
            kerning: HashMap::new(),
            broken: HashSet::new(),
            unextractable: HashSet::new(),
            glyph_names: false,
            ppem: 12,
            hinting_factor: 1,
            slot: None,
        }
    }

    /// Define every character of `chars` (duplicates ignored)
    pub fn with_chars(mut self, chars: &str) -> Self {
        for c in chars.chars() {
            let code = c as u32;
            if !self.chars.contains(&code) {
                self.chars.push(code);
            }
        }
        self
    }

    /// Kerning for the pair, 26.6 at the nominal (unhinted) scale
    pub fn with_kerning(mut self, left: char, right: char, delta: i64) -> Self {
        self.kerning.insert((left as u32, right as u32), delta);
        self
    }

    /// Loading this character's glyph fails with "invalid outline".
    /// Failure injection for exercising miss reporting; not part of the
    /// supported API
    #[doc(hidden)]
    pub fn with_broken_glyph(mut self, c: char) -> Self {
        self.broken.insert(c as u32);
        self
    }

    /// Loading succeeds but copying the glyph out of the slot fails
    #[doc(hidden)]
    pub fn with_unextractable_glyph(mut self, c: char) -> Self {
        self.unextractable.insert(c as u32);
        self
    }

    /// Report PostScript-style glyph names
    pub fn with_glyph_names(mut self) -> Self {
        self.glyph_names = true;
        self
    }

    fn charcode_of(&self, glyph_index: u32) -> Option<u32> {
        let i = (glyph_index as usize).checked_sub(1)?;
        self.chars.get(i).copied()
    }

    /// Advance in 26.6 after hinting compensation
    fn advance(&self) -> i64 {
        self.ppem * 64 / 2
    }

    fn box_height(&self) -> i64 {
        self.ppem * 64 * 3 / 4
    }
}

impl FontFace for HeadlessFace {
    type Glyph = HeadlessGlyph;

    fn info(&self) -> FaceInfo {
        FaceInfo {
            family_name: Some(self.family.clone()),
            style_name: Some("Regular".to_string()),
            postscript_name: Some(self.family.replace(' ', "")),
            num_faces: 1,
            num_glyphs: self.chars.len() as i64 + 1,
            num_charmaps: 1,
            num_fixed_sizes: 0,
            face_flags: 0,
            style_flags: 0,
            scalable: true,
            units_per_em: UNITS_PER_EM as u16,
            bbox: BBox {
                x_min: 0,
                y_min: 0,
                x_max: UNITS_PER_EM / 2,
                y_max: UNITS_PER_EM * 3 / 4,
            },
            ascender: 750,
            descender: -250,
            height: 1000,
            max_advance_width: 500,
            max_advance_height: 1000,
            underline_position: -100,
            underline_thickness: 50,
        }
    }

    fn family_name(&self) -> Option<String> {
        Some(self.family.clone())
    }

    fn char_index(&self, charcode: u32) -> u32 {
        self.chars
            .iter()
            .position(|&c| c == charcode)
            .map_or(0, |i| i as u32 + 1)
    }

    fn set_char_size(&mut self, ptsize: f64, dpi: f64, hinting_factor: u32) -> Result<()> {
        let ppem = (ptsize * dpi / 72.0).round() as i64;
        if ppem <= 0 {
            return Err(ft_error!("FT_Set_Char_Size", FT_ERR_INVALID_PIXEL_SIZE));
        }
        self.ppem = ppem;
        self.hinting_factor = hinting_factor.max(1) as i64;
        Ok(())
    }

    fn num_charmaps(&self) -> usize {
        1
    }

    fn set_charmap(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn select_charmap(&mut self, encoding: u32) -> Result<()> {
        if encoding != encoding::UNICODE {
            return Err(ft_error!("FT_Select_Charmap", FT_ERR_INVALID_ARGUMENT));
        }
        Ok(())
    }

    fn load_glyph(&mut self, glyph_index: u32, _flags: LoadFlags) -> std::result::Result<(), EngineError> {
        if glyph_index as usize > self.chars.len() {
            return Err(EngineError {
                code: FT_ERR_INVALID_GLYPH_INDEX,
            });
        }
        if self
            .charcode_of(glyph_index)
            .is_some_and(|c| self.broken.contains(&c))
        {
            return Err(EngineError {
                code: FT_ERR_INVALID_OUTLINE,
            });
        }
        self.slot = Some(glyph_index);
        Ok(())
    }

    fn get_glyph(&self) -> std::result::Result<HeadlessGlyph, EngineError> {
        let unextractable = self
            .slot
            .and_then(|i| self.charcode_of(i))
            .is_some_and(|c| self.unextractable.contains(&c));
        if unextractable {
            return Err(EngineError {
                code: FT_ERR_UNSUPPORTED_GLYPH_FORMAT,
            });
        }
        let (w, h) = (self.advance(), self.box_height());
        Ok(HeadlessGlyph {
            corners: [
                Vector { x: 0, y: 0 },
                Vector { x: w, y: 0 },
                Vector { x: w, y: h },
                Vector { x: 0, y: h },
            ],
        })
    }

    fn glyph_advance(&self) -> Vector {
        if self.slot.is_none() {
            return Vector::default();
        }
        Vector {
            x: self.advance(),
            y: 0,
        }
    }

    fn glyph_metrics(&self) -> GlyphMetrics {
        if self.slot.is_none() {
            return GlyphMetrics::default();
        }
        // Metrics are reported before the hinting transform
        let wide = self.advance() * self.hinting_factor;
        let h = self.box_height();
        GlyphMetrics {
            width: wide,
            height: h,
            hori_bearing_x: 0,
            hori_bearing_y: h,
            hori_advance: wide,
            linear_hori_advance: wide << 10,
            vert_bearing_x: -wide / 2,
            vert_bearing_y: 0,
            vert_advance: self.ppem * 64,
        }
    }

    fn glyph_path(&self) -> Result<GlyphPath> {
        let mut path = GlyphPath::default();
        if self.slot.is_none() {
            return Ok(path);
        }
        let (w, h) = (self.advance(), self.box_height());
        path.move_to(0, 0);
        path.line_to(w, 0);
        path.line_to(w, h);
        path.line_to(0, h);
        path.close();
        Ok(path)
    }

    fn has_kerning(&self) -> bool {
        !self.kerning.is_empty()
    }

    fn kerning(&self, left: u32, right: u32, mode: KerningMode) -> Option<Vector> {
        let pair = (self.charcode_of(left)?, self.charcode_of(right)?);
        let delta = self.kerning.get(&pair).copied().unwrap_or(0);
        let x = match mode {
            KerningMode::Unscaled => delta * UNITS_PER_EM / (self.ppem * 64).max(1),
            KerningMode::Default | KerningMode::Unfitted => delta * self.hinting_factor,
        };
        Some(Vector { x, y: 0 })
    }

    fn glyph_name(&self, glyph_index: u32) -> Result<Option<String>> {
        if !self.glyph_names {
            return Ok(None);
        }
        let name = match self.charcode_of(glyph_index) {
            None => ".notdef".to_string(),
            Some(c) => match char::from_u32(c) {
                Some(ch) if ch.is_ascii_alphanumeric() => ch.to_string(),
                _ => format!("uni{:04X}", c),
            },
        };
        Ok(Some(name))
    }

    fn name_index(&self, name: &str) -> u32 {
        if !self.glyph_names {
            return 0;
        }
        (1..=self.chars.len() as u32)
            .find(|&i| matches!(self.glyph_name(i), Ok(Some(n)) if n == name))
            .unwrap_or(0)
    }

    fn charmap(&self) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = self
            .chars
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32 + 1))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Box glyph tracked by its four corners
#[derive(Debug, Clone)]
pub struct HeadlessGlyph {
    corners: [Vector; 4],
}

impl GlyphOutline for HeadlessGlyph {
    fn transform(&mut self, matrix: Option<&Matrix>, delta: Option<Vector>) -> Result<()> {
        for corner in &mut self.corners {
            if let Some(m) = matrix {
                *corner = m.apply(*corner);
            }
            if let Some(d) = delta {
                corner.x += d.x;
                corner.y += d.y;
            }
        }
        Ok(())
    }

    fn cbox(&self) -> BBox {
        self.corners.iter().fold(BBox::INVERTED, |acc, c| {
            acc.union(&BBox {
                x_min: c.x,
                y_min: c.y,
                x_max: c.x,
                y_max: c.y,
            })
        })
    }

    fn render(&self, antialiased: bool) -> Result<RenderedGlyph> {
        let cbox = self.cbox();
        let left = cbox.x_min.div_euclid(64);
        let bottom = cbox.y_min.div_euclid(64);
        let right = (cbox.x_max + 63).div_euclid(64);
        let top = (cbox.y_max + 63).div_euclid(64);
        let width = (right - left).max(0) as u32;
        let rows = (top - bottom).max(0) as u32;

        let (mode, pitch) = if antialiased {
            (PixelMode::Gray, width as i32)
        } else {
            (PixelMode::Mono, width.div_ceil(8) as i32)
        };
        Ok(RenderedGlyph {
            left: left as i32,
            top: top as i32,
            width,
            rows,
            pitch,
            mode,
            buffer: vec![0xff; pitch as usize * rows as usize],
        })
    }
}
