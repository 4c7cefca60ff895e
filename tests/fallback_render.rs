//! End-to-end layout and rendering over a headless fallback chain

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use ftfont::font::{
    FallbackSlot, FontOptions, FontRegistry, HeadlessFace, LoadFlags, MissKind,
};
use ftfont::{FontError, FtImage};

fn options() -> FontOptions {
    FontOptions::default().hinting_factor(1)
}

#[test]
fn renders_text_split_across_fonts() {
    let mut registry = FontRegistry::new();
    let cjk = registry
        .insert(HeadlessFace::new("CJK").with_chars("日本"), options())
        .unwrap();
    let main = registry
        .insert(
            HeadlessFace::new("Latin").with_chars("Hi "),
            options().fallbacks(vec![cjk]),
        )
        .unwrap();
    registry.set_size(main, 24.0, 72.0).unwrap();

    let layout = registry
        .set_text_str(main, "Hi 日本", 0.0, LoadFlags::default())
        .unwrap();
    assert_eq!(layout.len(), 5);
    assert!(layout.misses.is_empty());
    // 24 px em, 12 px advance for every glyph
    let xs: Vec<f64> = layout.positions.iter().map(|p| p.x).collect();
    assert_eq!(xs, vec![0.0, 12.0, 24.0, 36.0, 48.0]);

    let fontmap = registry.get_fontmap(main, "Hi 日本").unwrap();
    assert_eq!(fontmap[&'H'], main);
    assert_eq!(fontmap[&'日'], cjk);
    assert_eq!(
        registry.get_char_fallback_index(main, '本' as u32).unwrap(),
        Some(FallbackSlot::Fallback(0))
    );

    let image = registry.draw_glyphs_to_bitmap(main, true).unwrap();
    assert_eq!(image.width(), 60 + 2);
    assert_eq!(image.height(), 18 + 2);
    let inked = image.buffer().iter().filter(|&&p| p == 255).count();
    assert_eq!(inked, 60 * 18);

    let mut png = Vec::new();
    image.write_png_to(&mut png).unwrap();
    assert_eq!(&png[1..4], b"PNG");
}

#[test]
fn missing_glyphs_degrade_per_codepoint() {
    let warned = Rc::new(RefCell::new(Vec::<(u32, BTreeSet<String>)>::new()));
    let sink = Rc::clone(&warned);

    let mut registry = FontRegistry::new();
    let fallback = registry
        .insert(HeadlessFace::new("Symbols").with_chars("★"), options())
        .unwrap();
    let main = registry
        .insert(
            HeadlessFace::new("Latin").with_chars("ab").with_broken_glyph('b'),
            options()
                .fallbacks(vec![fallback])
                .on_missing_glyph(move |c, fonts| sink.borrow_mut().push((c, fonts.clone()))),
        )
        .unwrap();

    let layout = registry
        .set_text_str(main, "a☃b☃★", 0.0, LoadFlags::default())
        .unwrap();
    assert_eq!(layout.len(), 5);
    let kinds: Vec<(usize, MissKind)> = layout.misses.iter().map(|m| (m.index, m.kind)).collect();
    assert_eq!(kinds.len(), 3);
    assert_eq!(kinds[0], (1, MissKind::NotFound));
    assert!(matches!(kinds[1], (2, MissKind::LoadFailed(e)) if e.code == 0x14));
    assert_eq!(kinds[2], (3, MissKind::NotFound));

    // One warning per distinct codepoint, listing every font consulted
    let warned = warned.borrow();
    let codes: Vec<u32> = warned.iter().map(|(c, _)| *c).collect();
    assert_eq!(codes, vec!['☃' as u32, 'b' as u32]);
    let consulted: BTreeSet<String> = ["Latin", "Symbols"].iter().map(|s| s.to_string()).collect();
    assert_eq!(warned[0].1, consulted);

    let handle = registry.get(main).unwrap();
    assert_eq!(handle.num_glyphs(), 5);
    assert_eq!(handle.advance(), 5 * 384);
}

#[test]
fn glyphs_can_be_drawn_into_external_image() {
    let mut registry = FontRegistry::new();
    let main = registry
        .insert(HeadlessFace::new("Latin").with_chars("x"), options())
        .unwrap();
    registry.set_text_str(main, "xx", 0.0, LoadFlags::default()).unwrap();

    let handle = registry.get(main).unwrap();
    let mut image = FtImage::new(32, 16).unwrap();
    handle.draw_glyph_to_bitmap(&mut image, 2, 3, 1, false).unwrap();
    // Second glyph sits 6 px right of the pen origin
    assert_eq!(image.pixel(7, 3), Some(0));
    assert_eq!(image.pixel(8, 3), Some(255));
    assert_eq!(image.pixel(13, 11), Some(255));
    assert_eq!(image.pixel(14, 11), Some(0));
    assert_eq!(image.pixel(8, 12), Some(0));

    assert!(matches!(
        handle.draw_glyph_to_bitmap(&mut image, 0, 0, 2, true),
        Err(FontError::GlyphIndexOutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn mutual_fallbacks_terminate() {
    let mut registry = FontRegistry::new();
    let a = registry.insert(HeadlessFace::new("A").with_chars("a"), options()).unwrap();
    let b = registry
        .insert(HeadlessFace::new("B").with_chars("b"), options().fallbacks(vec![a]))
        .unwrap();
    registry.set_fallbacks(a, vec![b]).unwrap();

    for root in [a, b] {
        let layout = registry
            .set_text_str(root, "ab?", 0.0, LoadFlags::default())
            .unwrap();
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.misses.len(), 1);
    }
}
