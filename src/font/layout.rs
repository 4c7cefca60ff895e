//! Layout results

use super::face::EngineError;
use super::registry::FontId;

/// Position of one laid-out glyph in pixels (rotated pen, y up)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphPosition {
    pub x: f64,
    pub y: f64,
}

/// Why a codepoint fell back to notdef
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissKind {
    /// No font in the chain maps the codepoint
    NotFound,
    /// A glyph index was found but the engine failed to load it
    LoadFailed(EngineError),
    /// The glyph loaded but could not be copied out of the slot
    ExtractFailed(EngineError),
}

/// A codepoint rendered as the primary font's notdef glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphMiss {
    /// Position in the input sequence
    pub index: usize,
    pub charcode: u32,
    pub kind: MissKind,
}

/// Output of a layout pass: one position per input codepoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub positions: Vec<GlyphPosition>,
    pub misses: Vec<GlyphMiss>,
}

impl Layout {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Glyph index attributed to the font that defines it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphMatch {
    pub font: FontId,
    /// 0 (notdef) when nothing in the chain maps the codepoint
    pub index: u32,
}

impl GlyphMatch {
    pub fn is_notdef(&self) -> bool {
        self.index == 0
    }
}

/// Which entry of a font's own fallback list defines a codepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackSlot {
    Primary,
    /// Position in the direct fallback list
    Fallback(usize),
}
