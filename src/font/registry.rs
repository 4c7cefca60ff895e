//! Font registry
//!
//! Owns every [`FontHandle`] and hands out [`FontId`]s. Fallback lists and
//! the per-pass glyph caches hold ids, never handles, so a chain may refer
//! back to itself. Every walk over a chain tracks visited ids.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, info};

use super::face::{
    BBox, EngineError, FontFace, GlyphOutline, KerningMode, LoadFlags, Matrix, Vector,
};
use super::freetype::{ft_error, FreeTypeFace};
use super::handle::{check_kerning_factor, FontHandle, FontOptions, FontSource};
use super::layout::{FallbackSlot, GlyphMatch, GlyphMiss, GlyphPosition, Layout, MissKind};
use crate::error::{FontError, Result};
use crate::image::FtImage;

/// Stable identity of a font inside its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub(crate) usize);

impl FontId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Glyph copied out of the font that resolved a codepoint
struct Resolved<G> {
    font: FontId,
    index: u32,
    glyph: G,
}

/// State of one codepoint's walk over a fallback chain
#[derive(Default)]
struct Search {
    visited: HashSet<FontId>,
    families: BTreeSet<String>,
    load_error: Option<EngineError>,
    extract_error: Option<EngineError>,
}

impl Search {
    fn miss_kind(&self) -> MissKind {
        match (self.load_error, self.extract_error) {
            (Some(e), _) => MissKind::LoadFailed(e),
            (None, Some(e)) => MissKind::ExtractFailed(e),
            (None, None) => MissKind::NotFound,
        }
    }
}

/// Arena of fonts addressed by [`FontId`]
pub struct FontRegistry<F: FontFace = FreeTypeFace> {
    fonts: Vec<FontHandle<F>>,
}

impl<F: FontFace> Default for FontRegistry<F> {
    fn default() -> Self {
        Self { fonts: Vec::new() }
    }
}

impl FontRegistry<FreeTypeFace> {
    /// Parse a font with FreeType and register it
    pub fn open(&mut self, source: FontSource, options: FontOptions) -> Result<FontId> {
        let (face, path) = match source {
            FontSource::Path(path) => (FreeTypeFace::from_path(&path)?, Some(path)),
            FontSource::Memory(data) => (FreeTypeFace::from_bytes(data)?, None),
        };
        let id = self.insert(face, options)?;
        if let Some(path) = path {
            info!("Font opened: {} as {:?}", path.display(), id);
            self.fonts[id.0].set_path(path);
        }
        Ok(id)
    }
}

impl<F: FontFace> FontRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = FontId> {
        (0..self.fonts.len()).map(FontId)
    }

    pub fn get(&self, id: FontId) -> Result<&FontHandle<F>> {
        self.fonts.get(id.0).ok_or(FontError::UnknownFont(id))
    }

    pub fn get_mut(&mut self, id: FontId) -> Result<&mut FontHandle<F>> {
        self.fonts.get_mut(id.0).ok_or(FontError::UnknownFont(id))
    }

    /// Register an already parsed face, sized to 12 pt at 72 dpi
    pub fn insert(&mut self, face: F, options: FontOptions) -> Result<FontId> {
        self.check_ids(&options.fallbacks)?;
        let mut handle = FontHandle::new(face, options)?;
        handle.face.set_char_size(12.0, 72.0, handle.hinting_factor)?;

        let id = FontId(self.fonts.len());
        debug!(
            "Registered {:?} ({}) with fallbacks {:?}",
            id,
            handle.family_name().unwrap_or_default(),
            handle.fallbacks
        );
        self.fonts.push(handle);
        Ok(id)
    }

    /// Replace the fallback list of `id`; cycles are allowed
    pub fn set_fallbacks(&mut self, id: FontId, fallbacks: Vec<FontId>) -> Result<()> {
        self.check_ids(&fallbacks)?;
        self.get_mut(id)?.fallbacks = fallbacks;
        Ok(())
    }

    fn check_ids(&self, ids: &[FontId]) -> Result<()> {
        match ids.iter().find(|id| id.0 >= self.fonts.len()) {
            Some(&id) => Err(FontError::UnknownFont(id)),
            None => Ok(()),
        }
    }

    /// `id` followed by every font reachable through fallbacks, depth first
    pub fn chain(&self, id: FontId) -> Result<Vec<FontId>> {
        self.get(id)?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(font) = stack.pop() {
            if !visited.insert(font) {
                continue;
            }
            order.push(font);
            if let Some(handle) = self.fonts.get(font.0) {
                stack.extend(handle.fallbacks.iter().rev());
            }
        }
        Ok(order)
    }

    /// Set the nominal size of `id` and its whole fallback chain
    pub fn set_size(&mut self, id: FontId, ptsize: f64, dpi: f64) -> Result<()> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(ptsize) || !valid(dpi) {
            return Err(FontError::InvalidSize { ptsize, dpi });
        }
        for font in self.chain(id)? {
            let handle = &mut self.fonts[font.0];
            handle.face.set_char_size(ptsize, dpi, handle.hinting_factor)?;
        }
        Ok(())
    }

    pub fn set_kerning_factor(&mut self, id: FontId, factor: u32) -> Result<()> {
        check_kerning_factor(factor)?;
        for font in self.chain(id)? {
            self.fonts[font.0].kerning_factor = factor;
        }
        Ok(())
    }

    pub fn set_charmap(&mut self, id: FontId, index: usize) -> Result<()> {
        self.get_mut(id)?.set_charmap(index)
    }

    pub fn select_charmap(&mut self, id: FontId, encoding: u32) -> Result<()> {
        self.get_mut(id)?.select_charmap(encoding)
    }

    /// Forget the last layout on `id` and its chain
    pub fn clear(&mut self, id: FontId) -> Result<()> {
        for font in self.chain(id)? {
            self.fonts[font.0].reset();
        }
        Ok(())
    }

    /// Glyph index for `charcode`, searching fallbacks in chain order when
    /// `fallback` is set. Does not touch the caches
    pub fn get_char_index(&self, id: FontId, charcode: u32, fallback: bool) -> Result<GlyphMatch> {
        let handle = self.get(id)?;
        if !fallback {
            return Ok(GlyphMatch {
                font: id,
                index: handle.face.char_index(charcode),
            });
        }
        if let Some(&font) = handle.char_to_font.get(&charcode) {
            let index = self.fonts[font.0].face.char_index(charcode);
            if index != 0 {
                return Ok(GlyphMatch { font, index });
            }
        }
        for font in self.chain(id)? {
            let index = self.fonts[font.0].face.char_index(charcode);
            if index != 0 {
                return Ok(GlyphMatch { font, index });
            }
        }
        Ok(GlyphMatch { font: id, index: 0 })
    }

    /// Which direct fallback of `id` (or `id` itself) defines `charcode`
    pub fn get_char_fallback_index(&self, id: FontId, charcode: u32) -> Result<Option<FallbackSlot>> {
        let handle = self.get(id)?;
        if handle.face.char_index(charcode) != 0 {
            return Ok(Some(FallbackSlot::Primary));
        }
        for (i, &font) in handle.fallbacks.iter().enumerate() {
            if !self.get_char_index(font, charcode, true)?.is_notdef() {
                return Ok(Some(FallbackSlot::Fallback(i)));
            }
        }
        Ok(None)
    }

    /// Kerning of `font`'s own pair, compensated for hinting and the
    /// kerning factor
    fn font_kerning(&self, font: FontId, left: u32, right: u32, mode: KerningMode) -> i64 {
        let Some(handle) = self.fonts.get(font.0) else {
            return 0;
        };
        if !handle.face.has_kerning() {
            return 0;
        }
        let divisor = (handle.hinting_factor as i64) << handle.kerning_factor;
        handle
            .face
            .kerning(left, right, mode)
            .map_or(0, |delta| delta.x / divisor)
    }

    /// Kerning between two glyph indices, 26.6. With `fallback`, glyphs
    /// laid out from different fonts never kern
    pub fn get_kerning(
        &self,
        id: FontId,
        left: u32,
        right: u32,
        mode: KerningMode,
        fallback: bool,
    ) -> Result<i64> {
        let handle = self.get(id)?;
        if fallback {
            let owners = (handle.glyph_to_font.get(&left), handle.glyph_to_font.get(&right));
            if let (Some(&l), Some(&r)) = owners {
                if l != r {
                    return Ok(0);
                }
                return Ok(self.font_kerning(l, left, right, mode));
            }
        }
        Ok(self.font_kerning(id, left, right, mode))
    }

    /// Try `font` and then its fallbacks, depth first
    fn resolve_char(
        &mut self,
        font: FontId,
        charcode: u32,
        flags: LoadFlags,
        search: &mut Search,
    ) -> Option<Resolved<F::Glyph>> {
        if !search.visited.insert(font) {
            return None;
        }
        let handle = self.fonts.get_mut(font.0)?;
        let index = handle.face.char_index(charcode);
        if !handle.warn_if_used() {
            if let Some(family) = handle.face.family_name() {
                search.families.insert(family);
            }
        }

        if index != 0 {
            if let Err(e) = handle.face.load_glyph(index, flags) {
                search.load_error = Some(e);
                return None;
            }
            handle.slot_loaded = true;
            return match handle.face.get_glyph() {
                Ok(glyph) => Some(Resolved { font, index, glyph }),
                Err(e) => {
                    search.extract_error = Some(e);
                    None
                }
            };
        }

        let fallbacks = handle.fallbacks.clone();
        fallbacks
            .into_iter()
            .find_map(|next| self.resolve_char(next, charcode, flags, search))
    }

    /// Resolve `charcode` for a layout rooted at `id`: the pass cache first,
    /// then the chain. A hit is recorded in `id`'s caches
    fn lookup(
        &mut self,
        id: FontId,
        charcode: u32,
        flags: LoadFlags,
    ) -> (Option<Resolved<F::Glyph>>, Search) {
        let mut search = Search::default();

        let cached = self.fonts[id.0].char_to_font.get(&charcode).copied();
        if let Some(font) = cached {
            let handle = &mut self.fonts[font.0];
            let index = handle.face.char_index(charcode);
            if index != 0 {
                let loaded = handle.face.load_glyph(index, flags);
                if loaded.is_ok() {
                    handle.slot_loaded = true;
                    if let Ok(glyph) = handle.face.get_glyph() {
                        return (Some(Resolved { font, index, glyph }), search);
                    }
                }
            }
        }

        let resolved = self.resolve_char(id, charcode, flags, &mut search);
        if let Some(r) = &resolved {
            if r.font != id {
                debug!("U+{:04X} resolved by fallback {:?}", charcode, r.font);
            }
            let primary = &mut self.fonts[id.0];
            primary.char_to_font.insert(charcode, r.font);
            primary.glyph_to_font.insert(r.index, r.font);
        }
        (resolved, search)
    }

    /// Load glyph `index` of `font` and copy it out
    fn load_on(&mut self, font: FontId, index: u32, flags: LoadFlags) -> Result<F::Glyph> {
        let handle = self.get_mut(font)?;
        handle
            .face
            .load_glyph(index, flags)
            .map_err(|e| ft_error!("FT_Load_Glyph", e.code))?;
        handle.slot_loaded = true;
        handle
            .face
            .get_glyph()
            .map_err(|e| ft_error!("FT_Get_Glyph", e.code))
    }

    /// Lay out `text` on `id`, replacing any previous layout
    pub fn set_text(&mut self, id: FontId, text: &[u32], angle: f64, flags: LoadFlags) -> Result<Layout> {
        self.clear(id)?;

        let matrix = Matrix::rotation(angle);
        let mut pen = Vector::default();
        let mut bbox = BBox::INVERTED;
        let mut previous: Option<(FontId, u32)> = None;
        let mut layout = Layout::default();

        for (position, &charcode) in text.iter().enumerate() {
            let (resolved, search) = self.lookup(id, charcode, flags);

            let (font, index, mut glyph) = match resolved {
                Some(r) => {
                    if self.fonts[r.font.0].warn_if_used() {
                        self.fonts[id.0].warn_missing(charcode, &search.families);
                    }
                    (r.font, r.index, r.glyph)
                }
                None => {
                    self.fonts[id.0].warn_missing(charcode, &search.families);
                    layout.misses.push(GlyphMiss {
                        index: position,
                        charcode,
                        kind: search.miss_kind(),
                    });
                    let primary = &mut self.fonts[id.0];
                    primary.char_to_font.insert(charcode, id);
                    primary.glyph_to_font.insert(0, id);
                    (id, 0, self.load_on(id, 0, flags)?)
                }
            };

            if let Some((prev_font, prev_index)) = previous {
                if prev_font == font && prev_index != 0 && index != 0 {
                    pen.x += self.font_kerning(font, prev_index, index, KerningMode::Default);
                }
            }

            let advance = self.fonts[font.0].face.glyph_advance().x;
            glyph.transform(None, Some(pen))?;
            glyph.transform(Some(&matrix), None)?;

            let rotated = matrix.apply(pen);
            layout.positions.push(GlyphPosition {
                x: rotated.x as f64 / 64.0,
                y: rotated.y as f64 / 64.0,
            });

            bbox = bbox.union(&glyph.cbox());
            pen.x += advance;
            previous = Some((font, index));
            self.fonts[id.0].glyphs.push(glyph);
        }

        let handle = &mut self.fonts[id.0];
        handle.pen = pen;
        handle.advance = matrix.apply(pen).x;
        handle.bbox = if bbox.x_min > bbox.x_max {
            BBox::default()
        } else {
            bbox
        };
        Ok(layout)
    }

    /// Lay out a string
    pub fn set_text_str(&mut self, id: FontId, text: &str, angle: f64, flags: LoadFlags) -> Result<Layout> {
        let codepoints: Vec<u32> = text.chars().map(u32::from).collect();
        self.set_text(id, &codepoints, angle, flags)
    }

    /// Load one character and append it to the glyph sequence of the font
    /// that supplies it. Returns that font
    pub fn load_char(&mut self, id: FontId, charcode: u32, flags: LoadFlags, fallback: bool) -> Result<FontId> {
        self.get(id)?;
        if !fallback {
            let index = self.fonts[id.0].face.char_index(charcode);
            if index == 0 {
                let families = self.fonts[id.0].family_name().into_iter().collect();
                self.fonts[id.0].warn_missing(charcode, &families);
            }
            let glyph = self.load_on(id, index, flags)?;
            self.fonts[id.0].glyphs.push(glyph);
            return Ok(id);
        }

        let (resolved, search) = self.lookup(id, charcode, flags);
        match resolved {
            Some(r) => {
                if self.fonts[r.font.0].warn_if_used() {
                    self.fonts[id.0].warn_missing(charcode, &search.families);
                }
                self.fonts[r.font.0].glyphs.push(r.glyph);
                Ok(r.font)
            }
            None => {
                self.fonts[id.0].warn_missing(charcode, &search.families);
                if let Some(e) = search.load_error.or(search.extract_error) {
                    return Err(ft_error!("charcode loading", e.code));
                }
                let glyph = self.load_on(id, 0, flags)?;
                self.fonts[id.0].glyphs.push(glyph);
                Ok(id)
            }
        }
    }

    /// Load a glyph by index. With `fallback`, the index is loaded from the
    /// font that supplied it during the last layout
    pub fn load_glyph(&mut self, id: FontId, glyph_index: u32, flags: LoadFlags, fallback: bool) -> Result<FontId> {
        let handle = self.get(id)?;
        let font = if fallback {
            handle.glyph_to_font.get(&glyph_index).copied().unwrap_or(id)
        } else {
            id
        };
        let glyph = self.load_on(font, glyph_index, flags)?;
        self.fonts[font.0].glyphs.push(glyph);
        Ok(font)
    }

    /// Glyph name, or `uniXXXXXXXX` when the face carries no names
    pub fn get_glyph_name(&self, id: FontId, glyph_index: u32, fallback: bool) -> Result<String> {
        let handle = self.get(id)?;
        let font = if fallback {
            handle.glyph_to_font.get(&glyph_index).copied().unwrap_or(id)
        } else {
            id
        };
        let name = self.get(font)?.face.glyph_name(glyph_index)?;
        Ok(name.unwrap_or_else(|| format!("uni{:08x}", glyph_index)))
    }

    /// Font that supplies each distinct character of `text`
    pub fn get_fontmap(&self, id: FontId, text: &str) -> Result<BTreeMap<char, FontId>> {
        let mut map = BTreeMap::new();
        for c in text.chars() {
            if map.contains_key(&c) {
                continue;
            }
            let found = self.get_char_index(id, c as u32, true)?;
            map.insert(c, found.font);
        }
        Ok(map)
    }

    /// Render the last layout of `id` into its image
    pub fn draw_glyphs_to_bitmap(&mut self, id: FontId, antialiased: bool) -> Result<&FtImage> {
        self.get_mut(id)?.draw_glyphs_to_bitmap(antialiased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::handle::MAX_KERNING_FACTOR;
    use crate::font::headless::HeadlessFace;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn opts() -> FontOptions {
        FontOptions::default().hinting_factor(1)
    }

    fn codes(s: &str) -> Vec<u32> {
        s.chars().map(u32::from).collect()
    }

    /// primary "ab", fallback 1 "c", fallback 2 "cd"
    fn chain() -> (FontRegistry<HeadlessFace>, FontId, FontId, FontId) {
        let mut reg = FontRegistry::new();
        let f1 = reg.insert(HeadlessFace::new("One").with_chars("c"), opts()).unwrap();
        let f2 = reg.insert(HeadlessFace::new("Two").with_chars("cd"), opts()).unwrap();
        let main = reg
            .insert(HeadlessFace::new("Main").with_chars("ab"), opts().fallbacks(vec![f1, f2]))
            .unwrap();
        (reg, main, f1, f2)
    }

    #[test]
    fn test_unknown_fallback_rejected() {
        let mut reg: FontRegistry<HeadlessFace> = FontRegistry::new();
        let result = reg.insert(HeadlessFace::new("Main"), opts().fallbacks(vec![FontId(3)]));
        assert!(matches!(result, Err(FontError::UnknownFont(FontId(3)))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_char_index_attributes_fallback() {
        let (reg, main, f1, f2) = chain();
        let m = reg.get_char_index(main, 'a' as u32, true).unwrap();
        assert_eq!(m, GlyphMatch { font: main, index: 1 });
        let m = reg.get_char_index(main, 'c' as u32, true).unwrap();
        assert_eq!(m, GlyphMatch { font: f1, index: 1 });
        let m = reg.get_char_index(main, 'd' as u32, true).unwrap();
        assert_eq!(m, GlyphMatch { font: f2, index: 2 });
        assert!(reg.get_char_index(main, 'z' as u32, true).unwrap().is_notdef());
        // Without fallback only the primary is consulted
        assert!(reg.get_char_index(main, 'd' as u32, false).unwrap().is_notdef());
        // Lookup never fills the cache
        assert!(reg.get(main).unwrap().char_to_font.is_empty());
    }

    #[test]
    fn test_char_fallback_index() {
        let (reg, main, _, _) = chain();
        let slot = |c: char| reg.get_char_fallback_index(main, c as u32).unwrap();
        assert_eq!(slot('b'), Some(FallbackSlot::Primary));
        assert_eq!(slot('c'), Some(FallbackSlot::Fallback(0)));
        assert_eq!(slot('d'), Some(FallbackSlot::Fallback(1)));
        assert_eq!(slot('z'), None);
    }

    #[test]
    fn test_layout_records_resolving_font() {
        let (mut reg, main, _, f2) = chain();
        let layout = reg.set_text_str(main, "ad", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.len(), 2);
        assert!(layout.misses.is_empty());

        let handle = reg.get(main).unwrap();
        assert_eq!(handle.char_to_font[&('d' as u32)], f2);
        assert_eq!(handle.glyph_to_font[&2], f2);
        assert_eq!(handle.num_glyphs(), 2);
        // Advance is 6px per glyph at 12pt/72dpi
        assert_eq!(layout.positions[1], GlyphPosition { x: 6.0, y: 0.0 });
        assert_eq!(handle.advance(), 768);
        assert_eq!(handle.bbox(), BBox { x_min: 0, y_min: 0, x_max: 768, y_max: 576 });
    }

    #[test]
    fn test_missing_codepoint_keeps_laying_out() {
        let (mut reg, main, _, _) = chain();
        let layout = reg.set_text_str(main, "a?b", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.len(), 3);
        assert_eq!(
            layout.misses,
            vec![GlyphMiss { index: 1, charcode: '?' as u32, kind: MissKind::NotFound }]
        );
        let handle = reg.get(main).unwrap();
        assert_eq!(handle.num_glyphs(), 3);
        assert_eq!(handle.char_to_font[&('?' as u32)], main);
        assert_eq!(layout.positions[2].x, 12.0);
    }

    #[test]
    fn test_load_and_extract_failures_are_distinct() {
        let mut reg = FontRegistry::new();
        let main = reg
            .insert(
                HeadlessFace::new("Main")
                    .with_chars("xyz")
                    .with_broken_glyph('x')
                    .with_unextractable_glyph('y'),
                opts(),
            )
            .unwrap();
        let layout = reg.set_text_str(main, "xyz", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.len(), 3);
        assert!(matches!(layout.misses[0].kind, MissKind::LoadFailed(e) if e.code == 0x14));
        assert!(matches!(layout.misses[1].kind, MissKind::ExtractFailed(e) if e.code == 0x12));
        assert_eq!(layout.misses.len(), 2);
    }

    #[test]
    fn test_empty_text() {
        let (mut reg, main, _, _) = chain();
        let layout = reg.set_text(main, &[], 0.0, LoadFlags::default()).unwrap();
        assert!(layout.is_empty());
        let handle = reg.get(main).unwrap();
        assert_eq!(handle.bbox(), BBox::default());
        assert_eq!(handle.get_width_height(), (0, 0));
    }

    #[test]
    fn test_set_text_replaces_previous_pass() {
        let (mut reg, main, f1, _) = chain();
        reg.set_text_str(main, "abcabc", 0.0, LoadFlags::default()).unwrap();
        reg.set_text_str(main, "b", 0.0, LoadFlags::default()).unwrap();

        let handle = reg.get(main).unwrap();
        assert_eq!(handle.num_glyphs(), 1);
        assert_eq!(handle.advance(), 384);
        assert_eq!(handle.bbox().x_max, 384);
        assert!(!handle.char_to_font.contains_key(&('c' as u32)));
        assert_eq!(reg.get(f1).unwrap().num_glyphs(), 0);
    }

    #[test]
    fn test_cyclic_chain_terminates() {
        let mut reg = FontRegistry::new();
        let a = reg.insert(HeadlessFace::new("A").with_chars("a"), opts()).unwrap();
        let b = reg
            .insert(HeadlessFace::new("B").with_chars("b"), opts().fallbacks(vec![a]))
            .unwrap();
        reg.set_fallbacks(a, vec![b]).unwrap();

        assert_eq!(reg.chain(a).unwrap(), vec![a, b]);
        let layout = reg.set_text_str(a, "abz", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.misses.len(), 1);
        assert_eq!(reg.get_char_index(b, 'a' as u32, true).unwrap().font, a);
        reg.set_size(a, 24.0, 72.0).unwrap();
        reg.clear(b).unwrap();
    }

    #[test]
    fn test_kerning_same_font_only() {
        let mut reg = FontRegistry::new();
        let fb = reg
            .insert(HeadlessFace::new("Fb").with_chars("V").with_kerning('V', 'V', -64), opts())
            .unwrap();
        let main = reg
            .insert(
                HeadlessFace::new("Main").with_chars("AV").with_kerning('A', 'V', -128),
                FontOptions::default().hinting_factor(2).fallbacks(vec![fb]),
            )
            .unwrap();

        let layout = reg.set_text_str(main, "AV", 0.0, LoadFlags::default()).unwrap();
        // 6px advance minus 2px kerning
        assert_eq!(layout.positions[1].x, 4.0);
        assert_eq!(reg.get_kerning(main, 1, 2, KerningMode::Default, false).unwrap(), -128);

        reg.set_kerning_factor(main, 1).unwrap();
        assert_eq!(reg.get_kerning(main, 1, 2, KerningMode::Default, false).unwrap(), -64);
        assert_eq!(reg.get(fb).unwrap().kerning_factor(), 1);
    }

    #[test]
    fn test_kerning_factor_out_of_range_rejected() {
        let mut reg = FontRegistry::new();
        let face = || HeadlessFace::new("Main").with_chars("AV").with_kerning('A', 'V', -128);
        assert!(matches!(
            reg.insert(face(), opts().kerning_factor(64)),
            Err(FontError::InvalidKerningFactor(64))
        ));

        let main = reg
            .insert(face(), FontOptions::default().hinting_factor(2))
            .unwrap();
        assert!(matches!(
            reg.set_kerning_factor(main, 63),
            Err(FontError::InvalidKerningFactor(63))
        ));
        assert_eq!(reg.get(main).unwrap().kerning_factor(), 0);

        // Largest accepted shift still divides cleanly
        reg.set_kerning_factor(main, MAX_KERNING_FACTOR).unwrap();
        let layout = reg.set_text_str(main, "AV", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.positions[1].x, 6.0);
        assert_eq!(reg.get_kerning(main, 1, 2, KerningMode::Default, false).unwrap(), 0);
    }

    #[test]
    fn test_kerning_across_fonts_is_zero() {
        let mut reg = FontRegistry::new();
        let fb = reg.insert(HeadlessFace::new("Fb").with_chars("V"), opts()).unwrap();
        let main = reg
            .insert(
                HeadlessFace::new("Main").with_chars("A").with_kerning('A', 'A', -128),
                opts().fallbacks(vec![fb]),
            )
            .unwrap();
        let layout = reg.set_text_str(main, "AVA", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(layout.positions[1].x, 6.0);
        assert_eq!(layout.positions[2].x, 12.0);
        // 'A' is glyph 1 of Main, 'V' glyph 1 of Fb: same index, different fonts
        let handle = reg.get(main).unwrap();
        assert_eq!(handle.glyph_to_font[&1], fb);
    }

    #[test]
    fn test_rotated_layout() {
        let mut reg = FontRegistry::new();
        let main = reg.insert(HeadlessFace::new("Main").with_chars("ab"), opts()).unwrap();
        let layout = reg.set_text_str(main, "ab", 90.0, LoadFlags::default()).unwrap();
        let second = layout.positions[1];
        assert!(second.x.abs() < 0.1);
        assert_eq!(second.y, 6.0);
        let bbox = reg.get(main).unwrap().bbox();
        assert_eq!(bbox.y_max, 768);
        assert!(bbox.x_min < 0);
    }

    #[test]
    fn test_warning_once_per_missing_codepoint() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);

        let mut reg = FontRegistry::new();
        let last = reg
            .insert(HeadlessFace::new("LastResort").with_chars("q"), opts().warn_if_used(true))
            .unwrap();
        let main = reg
            .insert(
                HeadlessFace::new("Main").with_chars("a"),
                opts()
                    .fallbacks(vec![last])
                    .on_missing_glyph(move |c, families| {
                        sink.borrow_mut().push((c, families.clone()))
                    }),
            )
            .unwrap();

        reg.set_text_str(main, "zazqq", 0.0, LoadFlags::default()).unwrap();
        let calls_now = calls.borrow().clone();
        assert_eq!(calls_now.len(), 2);
        assert_eq!(calls_now[0].0, 'z' as u32);
        assert_eq!(calls_now[1].0, 'q' as u32);
        // Last-resort fonts are not listed as checked
        let expected: BTreeSet<String> = ["Main".to_string()].into();
        assert_eq!(calls_now[0].1, expected);

        reg.set_text_str(main, "z", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(calls.borrow().len(), 3);
    }

    #[test]
    fn test_load_char_targets_resolving_font() {
        let (mut reg, main, f1, _) = chain();
        let font = reg.load_char(main, 'c' as u32, LoadFlags::default(), true).unwrap();
        assert_eq!(font, f1);
        assert_eq!(reg.get(f1).unwrap().num_glyphs(), 1);
        assert_eq!(reg.get(main).unwrap().num_glyphs(), 0);

        // Cached mapping is reused
        let font = reg.load_char(main, 'c' as u32, LoadFlags::default(), true).unwrap();
        assert_eq!(font, f1);
        assert_eq!(reg.get(f1).unwrap().num_glyphs(), 2);

        // Without fallback the primary's notdef is loaded
        let font = reg.load_char(main, 'c' as u32, LoadFlags::default(), false).unwrap();
        assert_eq!(font, main);
        assert_eq!(reg.get(main).unwrap().num_glyphs(), 1);
    }

    #[test]
    fn test_load_char_engine_error() {
        let mut reg = FontRegistry::new();
        let main = reg
            .insert(HeadlessFace::new("Main").with_chars("x").with_broken_glyph('x'), opts())
            .unwrap();
        let err = reg.load_char(main, 'x' as u32, LoadFlags::default(), true).unwrap_err();
        assert!(matches!(err, FontError::FreeType { op: "charcode loading", code: 0x14, .. }));
    }

    #[test]
    fn test_load_glyph_uses_glyph_cache() {
        let (mut reg, main, _, f2) = chain();
        reg.set_text_str(main, "d", 0.0, LoadFlags::default()).unwrap();
        let font = reg.load_glyph(main, 2, LoadFlags::default(), true).unwrap();
        assert_eq!(font, f2);
        assert_eq!(reg.get(f2).unwrap().num_glyphs(), 1);

        let err = reg.load_glyph(main, 9, LoadFlags::default(), false).unwrap_err();
        assert!(matches!(err, FontError::FreeType { op: "FT_Load_Glyph", code: 0x10, .. }));
    }

    #[test]
    fn test_glyph_names() {
        let mut reg = FontRegistry::new();
        let named = reg
            .insert(HeadlessFace::new("Named").with_chars("B").with_glyph_names(), opts())
            .unwrap();
        let main = reg
            .insert(HeadlessFace::new("Main").with_chars("A"), opts().fallbacks(vec![named]))
            .unwrap();
        assert_eq!(reg.get_glyph_name(main, 1, false).unwrap(), "uni00000001");
        reg.set_text_str(main, "B", 0.0, LoadFlags::default()).unwrap();
        assert_eq!(reg.get_glyph_name(main, 1, true).unwrap(), "B");
        assert_eq!(reg.get(named).unwrap().get_name_index("B"), 1);
    }

    #[test]
    fn test_fontmap() {
        let (reg, main, f1, f2) = chain();
        let map = reg.get_fontmap(main, "acdza").unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map[&'a'], main);
        assert_eq!(map[&'c'], f1);
        assert_eq!(map[&'d'], f2);
        assert_eq!(map[&'z'], main);
    }

    #[test]
    fn test_set_size_validation_and_propagation() {
        let (mut reg, main, f1, _) = chain();
        assert!(matches!(
            reg.set_size(main, 0.0, 72.0),
            Err(FontError::InvalidSize { .. })
        ));
        assert!(matches!(
            reg.set_size(main, 12.0, f64::NAN),
            Err(FontError::InvalidSize { .. })
        ));
        reg.set_size(main, 24.0, 72.0).unwrap();
        reg.load_char(main, 'c' as u32, LoadFlags::default(), true).unwrap();
        assert_eq!(reg.get(f1).unwrap().face().glyph_advance().x, 768);
    }

    #[test]
    fn test_draw_glyphs_to_bitmap() {
        let mut reg = FontRegistry::new();
        let main = reg.insert(HeadlessFace::new("Main").with_chars("ab"), opts()).unwrap();
        reg.set_text_str(main, "ab", 0.0, LoadFlags::default()).unwrap();
        let image = reg.draw_glyphs_to_bitmap(main, true).unwrap();
        // 12x9 px of ink plus the 2px margin
        assert_eq!((image.width(), image.height()), (14, 11));
        assert_eq!(image.pixel(0, 1), Some(255));
        assert_eq!(image.pixel(11, 9), Some(255));
        assert_eq!(image.pixel(12, 1), Some(0));
        assert_eq!(image.pixel(0, 0), Some(0));
        assert_eq!(image.pixel(0, 10), Some(0));
    }

    #[test]
    fn test_unknown_font_id() {
        let mut reg: FontRegistry<HeadlessFace> = FontRegistry::new();
        assert!(matches!(
            reg.set_text(FontId(0), &codes("a"), 0.0, LoadFlags::default()),
            Err(FontError::UnknownFont(FontId(0)))
        ));
    }
}
