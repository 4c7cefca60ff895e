//! Font loading, fallback resolution and layout
//!
//! - Face backends behind the [`FontFace`] trait (FreeType, headless)
//! - Font handles owned by a [`FontRegistry`] and addressed by [`FontId`]
//! - Fallback-aware text layout and rasterization
//! - System font discovery (fontconfig)

pub mod face;
pub mod fontconfig;
pub mod freetype;
pub mod handle;
pub mod headless;
pub mod layout;
pub mod registry;

pub use face::{
    encoding, path_code, BBox, EngineError, FaceInfo, FontFace, GlyphMetrics, GlyphOutline,
    GlyphPath, KerningMode, LoadFlags, Matrix, RenderedGlyph, Vector,
};
pub use freetype::{FreeTypeFace, FtGlyph};
pub use handle::{FontHandle, FontOptions, FontSource, WarnCallback, MAX_KERNING_FACTOR};
pub use headless::{HeadlessFace, HeadlessGlyph};
pub use layout::{FallbackSlot, GlyphMatch, GlyphMiss, GlyphPosition, Layout, MissKind};
pub use registry::{FontId, FontRegistry};
