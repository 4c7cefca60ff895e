//! FreeType backend
//!
//! Built on freetype-rs. A `Face` keeps its library referenced and so does
//! every `Glyph` copied out of it, so glyphs may outlive the face that
//! produced them. Raw FFI is only used where the crate has no wrapper.

use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use freetype::face::{KerningMode as FtKerningMode, LoadFlag};
use freetype::outline::Curve;
use freetype::{ffi, Library, RenderMode};
use log::info;

use super::face::{
    BBox, EngineError, FaceInfo, FontFace, GlyphMetrics, GlyphOutline, GlyphPath, KerningMode,
    LoadFlags, Matrix, RenderedGlyph, Vector,
};
use crate::error::{FontError, Result};
use crate::image::PixelMode;

/// Basename of a `file!()` path
pub(crate) fn source_file(path: &'static str) -> &'static str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Build a [`FontError::FreeType`] for a failed call at the current location
macro_rules! ft_error {
    ($op:expr, $code:expr) => {{
        let code: i32 = $code;
        $crate::error::FontError::FreeType {
            op: $op,
            file: $crate::font::freetype::source_file(file!()),
            line: line!(),
            code,
            error: ::freetype::Error::from(code),
        }
    }};
}
pub(crate) use ft_error;

/// Turn a freetype-rs error into a located [`FontError::FreeType`]
macro_rules! ft_check {
    ($op:expr, $result:expr) => {
        $result.map_err(|e: ::freetype::Error| ft_error!($op, e as i32))
    };
}

fn from_ft_vector(v: &ffi::FT_Vector) -> Vector {
    Vector {
        x: v.x as i64,
        y: v.y as i64,
    }
}

fn to_ft_vector(v: Vector) -> ffi::FT_Vector {
    ffi::FT_Vector {
        x: v.x as ffi::FT_Pos,
        y: v.y as ffi::FT_Pos,
    }
}

fn to_ft_matrix(m: &Matrix) -> ffi::FT_Matrix {
    ffi::FT_Matrix {
        xx: m.xx as ffi::FT_Fixed,
        xy: m.xy as ffi::FT_Fixed,
        yx: m.yx as ffi::FT_Fixed,
        yy: m.yy as ffi::FT_Fixed,
    }
}

fn from_ft_bbox(b: &ffi::FT_BBox) -> BBox {
    BBox {
        x_min: b.xMin as i64,
        y_min: b.yMin as i64,
        x_max: b.xMax as i64,
        y_max: b.yMax as i64,
    }
}

impl From<KerningMode> for FtKerningMode {
    fn from(mode: KerningMode) -> Self {
        match mode {
            KerningMode::Default => FtKerningMode::KerningDefault,
            KerningMode::Unfitted => FtKerningMode::KerningUnfitted,
            KerningMode::Unscaled => FtKerningMode::KerningUnscaled,
        }
    }
}

/// A FreeType face
pub struct FreeTypeFace {
    face: freetype::Face,
    path: Option<PathBuf>,
}

impl FreeTypeFace {
    /// Parse the first face in `data`
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let library = Library::init().map_err(|e| FontError::Init(e.to_string()))?;

        // freetype-rs requires Rc<Vec<u8>>
        let face = library
            .new_memory_face(Rc::new(data), 0)
            .map_err(|e| match e {
                freetype::Error::UnknownFileFormat => FontError::UnsupportedFormat {
                    code: e as i32,
                    error: e,
                },
                e => ft_error!("FT_New_Memory_Face", e as i32),
            })?;

        info!(
            "FreeType face loaded: {} ({} glyphs)",
            face.family_name().unwrap_or_else(|| "unknown".to_string()),
            face.num_glyphs()
        );
        Ok(Self { face, path: None })
    }

    /// Read and parse a font file
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut font = Self::from_bytes(data)?;
        font.path = Some(path.to_path_buf());
        Ok(font)
    }

    /// File the face was read from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn raw_face(&self) -> ffi::FT_Face {
        self.face.raw() as *const ffi::FT_FaceRec as *mut ffi::FT_FaceRec
    }
}

impl FontFace for FreeTypeFace {
    type Glyph = FtGlyph;

    fn info(&self) -> FaceInfo {
        let rec = self.face.raw();
        FaceInfo {
            family_name: self.face.family_name(),
            style_name: self.face.style_name(),
            postscript_name: self.face.postscript_name(),
            num_faces: rec.num_faces as i64,
            num_glyphs: self.face.num_glyphs() as i64,
            num_charmaps: self.num_charmaps(),
            num_fixed_sizes: rec.num_fixed_sizes as i64,
            face_flags: rec.face_flags as i64,
            style_flags: rec.style_flags as i64,
            scalable: self.face.is_scalable(),
            units_per_em: rec.units_per_EM,
            bbox: from_ft_bbox(&rec.bbox),
            ascender: self.face.ascender(),
            descender: self.face.descender(),
            height: self.face.height(),
            max_advance_width: self.face.max_advance_width(),
            max_advance_height: self.face.max_advance_height(),
            underline_position: self.face.underline_position(),
            underline_thickness: self.face.underline_thickness(),
        }
    }

    fn family_name(&self) -> Option<String> {
        self.face.family_name()
    }

    fn char_index(&self, charcode: u32) -> u32 {
        self.face.get_char_index(charcode as usize).unwrap_or(0)
    }

    fn set_char_size(&mut self, ptsize: f64, dpi: f64, hinting_factor: u32) -> Result<()> {
        ft_check!(
            "FT_Set_Char_Size",
            self.face.set_char_size(
                (ptsize * 64.0) as isize,
                0,
                (dpi * hinting_factor as f64) as u32,
                dpi as u32,
            )
        )?;
        let mut transform = ffi::FT_Matrix {
            xx: 65536 / hinting_factor as ffi::FT_Fixed,
            xy: 0,
            yx: 0,
            yy: 65536,
        };
        let mut delta = ffi::FT_Vector { x: 0, y: 0 };
        self.face.set_transform(&mut transform, &mut delta);
        Ok(())
    }

    fn num_charmaps(&self) -> usize {
        self.face.num_charmaps().max(0) as usize
    }

    fn set_charmap(&mut self, index: usize) -> Result<()> {
        let charmap = self.face.get_charmap(index as isize);
        ft_check!("FT_Set_Charmap", self.face.set_charmap(&charmap))
    }

    fn select_charmap(&mut self, encoding: u32) -> Result<()> {
        // No safe wrapper for FT_Select_Charmap
        let error = unsafe { ffi::FT_Select_Charmap(self.raw_face(), encoding as ffi::FT_Encoding) };
        if error != 0 {
            return Err(ft_error!("FT_Select_Charmap", error));
        }
        Ok(())
    }

    fn load_glyph(&mut self, glyph_index: u32, flags: LoadFlags) -> std::result::Result<(), EngineError> {
        self.face
            .load_glyph(glyph_index, LoadFlag::from_bits_retain(flags.bits()))
            .map_err(EngineError::from)
    }

    fn get_glyph(&self) -> std::result::Result<FtGlyph, EngineError> {
        let glyph = self.face.glyph().get_glyph()?;
        Ok(FtGlyph { glyph })
    }

    fn glyph_advance(&self) -> Vector {
        from_ft_vector(&self.face.glyph().advance())
    }

    fn glyph_metrics(&self) -> GlyphMetrics {
        let slot = self.face.glyph();
        let m = slot.metrics();
        GlyphMetrics {
            width: m.width as i64,
            height: m.height as i64,
            hori_bearing_x: m.horiBearingX as i64,
            hori_bearing_y: m.horiBearingY as i64,
            hori_advance: m.horiAdvance as i64,
            linear_hori_advance: slot.linear_hori_advance() as i64,
            vert_bearing_x: m.vertBearingX as i64,
            vert_bearing_y: m.vertBearingY as i64,
            vert_advance: m.vertAdvance as i64,
        }
    }

    fn glyph_path(&self) -> Result<GlyphPath> {
        let slot = self.face.glyph();
        let mut path = GlyphPath::default();
        let Some(outline) = slot.outline() else {
            return Ok(path);
        };
        // contours_iter must not run on an outline without contours
        if slot.raw().outline.n_contours <= 0 {
            return Ok(path);
        }

        for contour in outline.contours_iter() {
            path.move_to(contour.start().x as i64, contour.start().y as i64);
            for curve in contour {
                match curve {
                    Curve::Line(to) => path.line_to(to.x as i64, to.y as i64),
                    Curve::Bezier2(control, to) => {
                        path.conic_to(from_ft_vector(&control), from_ft_vector(&to))
                    }
                    Curve::Bezier3(c1, c2, to) => path.cubic_to(
                        from_ft_vector(&c1),
                        from_ft_vector(&c2),
                        from_ft_vector(&to),
                    ),
                }
            }
        }
        path.close();
        Ok(path)
    }

    fn has_kerning(&self) -> bool {
        self.face.has_kerning()
    }

    fn kerning(&self, left: u32, right: u32, mode: KerningMode) -> Option<Vector> {
        self.face
            .get_kerning(left, right, mode.into())
            .ok()
            .map(|delta| from_ft_vector(&delta))
    }

    fn glyph_name(&self, glyph_index: u32) -> Result<Option<String>> {
        if !self.face.has_glyph_names() {
            return Ok(None);
        }
        let mut buffer = [0u8; 128];
        // No safe wrapper for FT_Get_Glyph_Name; the buffer outlives the call
        let error = unsafe {
            ffi::FT_Get_Glyph_Name(
                self.raw_face(),
                glyph_index,
                buffer.as_mut_ptr() as ffi::FT_Pointer,
                buffer.len() as ffi::FT_UInt,
            )
        };
        if error != 0 {
            return Err(ft_error!("FT_Get_Glyph_Name", error));
        }
        let name = CStr::from_bytes_until_nul(&buffer)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(name))
    }

    fn name_index(&self, name: &str) -> u32 {
        self.face.get_name_index(name).unwrap_or(0)
    }

    fn charmap(&self) -> Vec<(u32, u32)> {
        self.face
            .chars()
            .map(|(code, index)| (code as u32, index.get()))
            .collect()
    }
}

/// Glyph copied out of a face slot
pub struct FtGlyph {
    glyph: freetype::Glyph,
}

impl GlyphOutline for FtGlyph {
    fn transform(&mut self, matrix: Option<&Matrix>, delta: Option<Vector>) -> Result<()> {
        ft_check!(
            "FT_Glyph_Transform",
            self.glyph
                .transform(matrix.map(to_ft_matrix), delta.map(to_ft_vector))
        )
    }

    fn cbox(&self) -> BBox {
        from_ft_bbox(&self.glyph.get_cbox(ffi::FT_GLYPH_BBOX_SUBPIXELS))
    }

    fn render(&self, antialiased: bool) -> Result<RenderedGlyph> {
        // FT_Glyph_To_Bitmap hands bitmap glyphs back unchanged and
        // freetype-rs would then release them twice; read those in place
        if self.glyph.format() == ffi::FT_GLYPH_FORMAT_BITMAP {
            let rec = self.glyph.raw() as *const ffi::FT_GlyphRec as *const ffi::FT_BitmapGlyphRec;
            // the format tag guarantees the record is an FT_BitmapGlyphRec
            let rec = unsafe { &*rec };
            let bitmap = unsafe { freetype::Bitmap::from_raw(&rec.bitmap) };
            return copy_bitmap(rec.left, rec.top, &bitmap);
        }

        let mode = if antialiased {
            RenderMode::Normal
        } else {
            RenderMode::Mono
        };
        let bitmap_glyph = ft_check!("FT_Glyph_To_Bitmap", self.glyph.to_bitmap(mode, None))?;
        copy_bitmap(bitmap_glyph.left(), bitmap_glyph.top(), &bitmap_glyph.bitmap())
    }
}

fn copy_bitmap(left: i32, top: i32, bitmap: &freetype::Bitmap) -> Result<RenderedGlyph> {
    let mode = match bitmap.pixel_mode() {
        Ok(freetype::bitmap::PixelMode::Gray) => PixelMode::Gray,
        Ok(freetype::bitmap::PixelMode::Mono) => PixelMode::Mono,
        _ => return Err(FontError::UnknownPixelMode(bitmap.raw().pixel_mode as u8)),
    };
    Ok(RenderedGlyph {
        left,
        top,
        width: bitmap.width().max(0) as u32,
        rows: bitmap.rows().max(0) as u32,
        pitch: bitmap.pitch(),
        mode,
        buffer: bitmap.buffer().to_vec(),
    })
}
