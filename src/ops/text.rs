use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::GrayImage;
use std::path::Path;

/// Horizontal anchoring of a text line relative to its origin x.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlignment {
    Left,
    Center,
    Right,
}

/// Lay out a single line of text.
/// Returns `(glyphs, total_width)` where each glyph is `(id, x)` relative to
/// the origin after alignment.
pub fn layout_line(
    font: &FontArc,
    text: &str,
    font_size: f32,
    alignment: TextAlignment,
) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    let total_width = cursor_x;
    let offset = match alignment {
        TextAlignment::Left => 0.0,
        TextAlignment::Center => -total_width * 0.5,
        TextAlignment::Right => -total_width,
    };
    for glyph in &mut glyphs {
        glyph.1 += offset;
    }

    (glyphs, total_width)
}

/// Rasterize one line of text into a `canvas_w × canvas_h` coverage mask.
/// `(origin_x, baseline_y)` is the anchor point; glyphs falling outside the
/// surface are clipped.
pub fn rasterize_line(
    font: &FontArc,
    text: &str,
    font_size: f32,
    alignment: TextAlignment,
    origin_x: f32,
    baseline_y: f32,
    canvas_w: u32,
    canvas_h: u32,
) -> GrayImage {
    let mut coverage = GrayImage::new(canvas_w, canvas_h);
    let (glyphs, _) = layout_line(font, text, font_size, alignment);

    for (id, gx) in glyphs {
        let glyph = id.with_scale_and_position(font_size, point(origin_x + gx, baseline_y));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue; // whitespace
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|x, y, c| {
            let px = bounds.min.x as i32 + x as i32;
            let py = bounds.min.y as i32 + y as i32;
            if px < 0 || py < 0 || px >= canvas_w as i32 || py >= canvas_h as i32 {
                return;
            }
            let v = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            let p = coverage.get_pixel_mut(px as u32, py as u32);
            // Overlapping glyph edges keep the stronger coverage
            p.0[0] = p.0[0].max(v);
        });
    }
    coverage
}

/// Load a font by family name, weight, and style from the system.
/// `weight` is a CSS-style weight value (100=Thin, 400=Regular, 700=Bold, etc.)
/// Returns None if the font cannot be found.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let family = if family.trim().is_empty() || family.eq_ignore_ascii_case("sans-serif") {
        FamilyName::SansSerif
    } else {
        FamilyName::Title(family.to_string())
    };

    let source = SystemSource::new();
    let handle = source.select_best_match(&[family], &props).ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Bold label font: the requested family, else any system sans-serif.
pub fn load_label_font(family: Option<&str>) -> Option<FontArc> {
    if let Some(f) = family.and_then(|name| load_system_font(name, 700, false)) {
        return Some(f);
    }
    let fallback = load_system_font("sans-serif", 700, false);
    if fallback.is_none() {
        log_warn!("No system font available for comparison labels");
    }
    fallback
}

/// Load a TTF/OTF file directly.
pub fn load_font_file(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_file_errors_are_none() {
        assert!(load_font_file(Path::new("/definitely/not/here.ttf")).is_none());

        let junk = std::env::temp_dir().join(format!("masonry-junk-{}.ttf", uuid::Uuid::new_v4()));
        std::fs::write(&junk, b"not a font").unwrap();
        assert!(load_font_file(&junk).is_none());
        let _ = std::fs::remove_file(&junk);
    }
}
