use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

/// Per-pixel coverage / clip mask – 0 = outside, 255 = fully inside.
/// Dimensions must match the canvas it is applied to.
pub type CoverageMask = GrayImage;

/// The `#f0f0f0` backdrop shown around a letterboxed photo.
pub const DEFAULT_BACKGROUND_GRAY: u8 = 240;

// ============================================================================
// CANVAS – a single RGBA8 raster with source-over drawing
// ============================================================================

/// CPU drawing surface.  Pixels are stored unpremultiplied, row-major.
///
/// All drawing goes through [`Canvas::shade`], which walks a pixel span
/// row-by-row in parallel and blends whatever the supplied shader returns,
/// optionally clipped by a [`CoverageMask`].
#[derive(Clone)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pixels: RgbaImage,
}

impl Canvas {
    /// Create a fully transparent canvas (an offscreen buffer).
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Create a canvas filled with `color`.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut c = Self::new(width, height);
        c.clear(color);
        c
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        }
    }

    /// Overwrite every pixel with `color` (no blending).
    pub fn clear(&mut self, color: Rgba<u8>) {
        for p in self.pixels.pixels_mut() {
            *p = color;
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Blend a shader over the pixel span `(x0, y0, x1, y1)` (exclusive max).
    ///
    /// `shader(x, y)` returns the source colour for a pixel or `None` to leave
    /// it untouched.  The effective source alpha is
    /// `color.alpha × alpha × clip_coverage`.
    pub fn shade<F>(
        &mut self,
        span: (u32, u32, u32, u32),
        clip: Option<&CoverageMask>,
        alpha: f32,
        shader: F,
    ) where
        F: Fn(u32, u32) -> Option<Rgba<u8>> + Sync,
    {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let x0 = span.0.min(self.width);
        let y0 = span.1.min(self.height);
        let x1 = span.2.min(self.width);
        let y1 = span.3.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let stride = self.width as usize * 4;
        let clip_raw = clip.map(|m| (m.as_raw().as_slice(), m.width(), m.height()));
        let raw: &mut [u8] = self.pixels.as_mut();

        raw[y0 as usize * stride..y1 as usize * stride]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(row, row_buf)| {
                let y = y0 + row as u32;
                for x in x0..x1 {
                    let coverage = match clip_raw {
                        Some((mr, mw, mh)) => {
                            if x < mw && y < mh {
                                mr[(y * mw + x) as usize]
                            } else {
                                0
                            }
                        }
                        None => 255,
                    };
                    if coverage == 0 {
                        continue;
                    }
                    let Some(src) = shader(x, y) else { continue };
                    let opacity = alpha * (coverage as f32 / 255.0);
                    let i = x as usize * 4;
                    blend_into(&mut row_buf[i..i + 4], src, opacity);
                }
            });
    }

    /// Fill every pixel covered by `mask` with `color` at `alpha`.
    pub fn fill_coverage(&mut self, mask: &CoverageMask, color: Rgba<u8>, alpha: f32) {
        let span = (0, 0, self.width, self.height);
        self.shade(span, Some(mask), alpha, |_, _| Some(color));
    }

    /// Draw `src` 1:1 with its top-left corner at `(dst_x, dst_y)`.
    pub fn draw_image_at(
        &mut self,
        src: &RgbaImage,
        dst_x: i32,
        dst_y: i32,
        alpha: f32,
        clip: Option<&CoverageMask>,
    ) {
        let x0 = dst_x.max(0) as u32;
        let y0 = dst_y.max(0) as u32;
        let x1 = (dst_x + src.width() as i32).max(0) as u32;
        let y1 = (dst_y + src.height() as i32).max(0) as u32;
        self.shade((x0, y0, x1, y1), clip, alpha, |x, y| {
            let sx = (x as i32 - dst_x) as u32;
            let sy = (y as i32 - dst_y) as u32;
            Some(*src.get_pixel(sx, sy))
        });
    }
}

// ============================================================================
// PIXEL BLENDING
// ============================================================================

/// Source-over blend of `top` onto `base` with an extra `opacity` multiplier
/// (unpremultiplied RGBA8).
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let mut out = base.0;
    blend_into(&mut out, top, opacity);
    Rgba(out)
}

fn blend_into(dst: &mut [u8], top: Rgba<u8>, opacity: f32) {
    // Transparent top pixel: nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return;
    }
    let top_a = (top[3] as f32 / 255.0) * opacity.min(1.0);

    // Opaque top pixel overwrites
    if top_a >= 1.0 {
        dst.copy_from_slice(&top.0);
        return;
    }

    let base_a = dst[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }
    for c in 0..3 {
        let t = top[c] as f32;
        let b = dst[c] as f32;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

// ============================================================================
// CSS COLOURS
// ============================================================================

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("red", [255, 0, 0]),
    ("green", [0, 128, 0]),
    ("blue", [0, 0, 255]),
    ("gray", [128, 128, 128]),
    ("grey", [128, 128, 128]),
    ("silver", [192, 192, 192]),
    ("maroon", [128, 0, 0]),
    ("brown", [165, 42, 42]),
    ("tan", [210, 180, 140]),
    ("beige", [245, 245, 220]),
    ("ivory", [255, 255, 240]),
    ("navy", [0, 0, 128]),
    ("olive", [128, 128, 0]),
];

/// Parse a CSS colour string (`#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb()`,
/// `rgba()`, or a basic named colour).  Returns `None` when unparseable.
pub fn parse_css_color(s: &str) -> Option<Rgba<u8>> {
    let s = s.trim().to_ascii_lowercase();

    if let Some(hex) = s.strip_prefix('#') {
        let digits = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;
        let nibble = |i: usize| digits[i] * 17;
        let byte = |i: usize| digits[i] * 16 + digits[i + 1];
        return match digits.len() {
            3 => Some(Rgba([nibble(0), nibble(1), nibble(2), 255])),
            4 => Some(Rgba([nibble(0), nibble(1), nibble(2), nibble(3)])),
            6 => Some(Rgba([byte(0), byte(2), byte(4), 255])),
            8 => Some(Rgba([byte(0), byte(2), byte(4), byte(6)])),
            _ => None,
        };
    }

    let func = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'));
    if let Some(body) = func {
        let parts: Vec<&str> = body
            .split(|c| c == ',' || c == '/' || c == ' ')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 3 && parts.len() != 4 {
            return None;
        }
        let channel = |p: &str| -> Option<u8> {
            if let Some(pct) = p.strip_suffix('%') {
                let v: f32 = pct.parse().ok()?;
                Some((v / 100.0 * 255.0).round().clamp(0.0, 255.0) as u8)
            } else {
                let v: f32 = p.parse().ok()?;
                Some(v.round().clamp(0.0, 255.0) as u8)
            }
        };
        let alpha = match parts.get(3) {
            Some(p) => {
                if let Some(pct) = p.strip_suffix('%') {
                    pct.parse::<f32>().ok()? / 100.0
                } else {
                    p.parse::<f32>().ok()?
                }
            }
            None => 1.0,
        };
        return Some(Rgba([
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
            (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]));
    }

    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, rgb)| Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_css_colors() {
        assert_eq!(parse_css_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_css_color("#7A0505"), Some(Rgba([122, 5, 5, 255])));
        assert_eq!(parse_css_color("#00000080"), Some(Rgba([0, 0, 0, 128])));
        assert_eq!(parse_css_color("rgba(0, 0, 0, 0.5)"), Some(Rgba([0, 0, 0, 128])));
        assert_eq!(parse_css_color("rgb(10,20,30)"), Some(Rgba([10, 20, 30, 255])));
        assert_eq!(parse_css_color(" White "), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_css_color("#12"), None);
        assert_eq!(parse_css_color("chartreuse-ish"), None);
    }

    #[test]
    fn non_ascii_hex_is_rejected() {
        assert_eq!(parse_css_color("#é1"), None);
        assert_eq!(parse_css_color("#ää"), None);
        assert_eq!(parse_css_color("#ffé"), None);
    }

    #[test]
    fn blend_over_opaque_base() {
        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 0.5);
        assert_eq!(out, Rgba([128, 128, 128, 255]));
        let untouched = blend_pixel(Rgba([9, 9, 9, 255]), Rgba([255, 0, 0, 0]), 1.0);
        assert_eq!(untouched, Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn blend_onto_transparent_keeps_source_color() {
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([200, 100, 50, 255]), 0.5);
        assert_eq!(out, Rgba([200, 100, 50, 128]));
    }

    #[test]
    fn shade_respects_clip_and_span() {
        let mut c = Canvas::new_filled(4, 4, Rgba([0, 0, 0, 255]));
        let mut clip = CoverageMask::new(4, 4);
        clip.put_pixel(1, 1, image::Luma([255]));
        clip.put_pixel(2, 2, image::Luma([255]));
        c.shade((0, 0, 2, 2), Some(&clip), 1.0, |_, _| Some(Rgba([255, 0, 0, 255])));
        assert_eq!(c.get_pixel(1, 1), Rgba([255, 0, 0, 255]));
        // inside the clip but outside the span
        assert_eq!(c.get_pixel(2, 2), Rgba([0, 0, 0, 255]));
        assert_eq!(c.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn draw_image_at_offsets_and_crops() {
        let mut c = Canvas::new(3, 3);
        let src = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        c.draw_image_at(&src, 2, -1, 1.0, None);
        assert_eq!(c.get_pixel(2, 0), Rgba([1, 2, 3, 255]));
        assert_eq!(c.get_pixel(2, 1), Rgba([0, 0, 0, 0]));
        assert_eq!(c.get_pixel(1, 0), Rgba([0, 0, 0, 0]));
    }
}
