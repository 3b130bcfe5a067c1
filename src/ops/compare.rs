// ============================================================================
// COMPARISON — before/after and material A/B views, reveal and export
// ============================================================================
//
// Both modes render a second full-size variant of the scene offscreen and
// reveal it over the live render through a vertical split: the variant
// ("before" / material A) shows left of the split, the live render
// ("after" / material B) right of it.

use std::collections::HashSet;

use ab_glyph::FontArc;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{Canvas, CoverageMask};
use crate::compositor::{draw_depth_edges, draw_sills, sorted_by_priority, Compositor, RenderReport};
use crate::ops::fill;
use crate::ops::filters::{blur_coverage, shadow_blur_sigma};
use crate::ops::path::{FillRule, Path};
use crate::ops::text::{rasterize_line, TextAlignment};
use crate::scene::{AreaType, Material, Region, Scene};
use crate::textures::TextureCache;

/// Interactive drag range; programmatic positions may use the full 0–100.
pub const DRAG_MIN: f32 = 5.0;
pub const DRAG_MAX: f32 = 95.0;
pub const DEFAULT_SLIDER: f32 = 50.0;

const LABEL_PADDING: f32 = 20.0;
const SHADOW_BLUR: f32 = 4.0;
const DIVIDER_WIDTH: f32 = 3.0;
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Clone, Debug, PartialEq)]
pub enum ComparisonKind {
    BeforeAfter,
    Materials { a: Material, b: Material },
}

/// A started comparison: two same-sized renders and the split position.
#[derive(Clone)]
pub struct Comparison {
    pub kind: ComparisonKind,
    /// Left side: "before" or material A.
    pub before: RgbaImage,
    /// Right side: the live render ("after" or material B).
    pub after: RgbaImage,
    slider: f32,
}

impl Comparison {
    pub fn new(kind: ComparisonKind, before: RgbaImage, after: RgbaImage) -> Self {
        Self {
            kind,
            before,
            after,
            slider: DEFAULT_SLIDER,
        }
    }

    pub fn slider(&self) -> f32 {
        self.slider
    }

    /// Set the split percentage (clamped to 0–100).
    pub fn set_slider(&mut self, percent: f32) {
        self.slider = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { DEFAULT_SLIDER };
    }

    /// Follow a pointer drag across a display `display_width` wide.
    pub fn drag_to(&mut self, pointer_x: f32, display_width: f32) {
        self.slider = slider_from_drag(pointer_x, display_width);
    }

    pub fn reveal(&self) -> RgbaImage {
        compose_reveal(&self.before, &self.after, self.slider)
    }

    /// Upper-cased material names (or `MATERIAL A`/`MATERIAL B`), else
    /// `BEFORE`/`AFTER`.
    pub fn labels(&self) -> (String, String) {
        match &self.kind {
            ComparisonKind::BeforeAfter => ("BEFORE".to_string(), "AFTER".to_string()),
            ComparisonKind::Materials { a, b } => (
                label_or(&a.name, "MATERIAL A"),
                label_or(&b.name, "MATERIAL B"),
            ),
        }
    }

    pub fn export(&self, font: Option<&FontArc>) -> RgbaImage {
        let (left, right) = self.labels();
        export_comparison(&self.before, &self.after, self.slider, (&left, &right), font)
    }

    /// Download file name for this comparison.  `current_material` names the
    /// material shown in before/after mode.
    pub fn filename(&self, prefix: &str, scene_name: &str, current_material: Option<&str>) -> String {
        let raw = match &self.kind {
            ComparisonKind::Materials { a, b } => {
                format!("{}-{}-{}-vs-{}-comparison.png", prefix, scene_name, a.name, b.name)
            }
            ComparisonKind::BeforeAfter => {
                let material = current_material.filter(|m| !m.is_empty()).unwrap_or("design");
                format!("{}-{}-{}-before-after.png", prefix, scene_name, material)
            }
        };
        sanitize_filename(&raw)
    }
}

fn label_or(name: &str, fallback: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_uppercase()
    }
}

/// Replace everything outside `[A-Za-z0-9-_.]` with `-`, then collapse
/// runs of `-`.
pub fn sanitize_filename(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let ch = if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') { ch } else { '-' };
        if ch == '-' && out.ends_with('-') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Slider percentage for a pointer at `pointer_x` over a display
/// `display_width` wide, clamped to the drag range.
pub fn slider_from_drag(pointer_x: f32, display_width: f32) -> f32 {
    if display_width <= 0.0 || !pointer_x.is_finite() {
        return DEFAULT_SLIDER;
    }
    (pointer_x / display_width * 100.0).clamp(DRAG_MIN, DRAG_MAX)
}

/// Pixel column of the split for a canvas `width` wide.
pub fn split_x(width: u32, slider: f32) -> u32 {
    ((slider.clamp(0.0, 100.0) / 100.0) * width as f32).round() as u32
}

/// Columns left of the split come from `before`, the rest from `after`.
/// Both images must share dimensions; `after` wins where they differ.
pub fn compose_reveal(before: &RgbaImage, after: &RgbaImage, slider: f32) -> RgbaImage {
    let (w, h) = after.dimensions();
    let mut out = after.clone();
    if before.dimensions() != (w, h) {
        log_warn!("Comparison variants differ in size; showing the live render only");
        return out;
    }
    let split = split_x(w, slider) as usize;
    if split == 0 {
        return out;
    }
    let stride = w as usize * 4;
    let before_raw = before.as_raw();
    let raw: &mut [u8] = out.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let src = &before_raw[y * stride..y * stride + split * 4];
        row[..split * 4].copy_from_slice(src);
    });
    out
}

/// Draw `coverage` in `color` over a blurred `shadow` copy of itself.
fn draw_with_shadow(canvas: &mut Canvas, coverage: &GrayImage, color: Rgba<u8>, shadow_alpha: f32) {
    let shadow = blur_coverage(coverage, shadow_blur_sigma(SHADOW_BLUR));
    canvas.fill_coverage(&shadow, BLACK, shadow_alpha);
    canvas.fill_coverage(coverage, color, 1.0);
}

/// Pixel-reproducible export: split composite, divider line with shadow,
/// and (when a font is available) both labels with shadows.
pub fn export_comparison(
    before: &RgbaImage,
    after: &RgbaImage,
    slider: f32,
    labels: (&str, &str),
    font: Option<&FontArc>,
) -> RgbaImage {
    let (w, h) = after.dimensions();
    let mut canvas = Canvas::from_image(compose_reveal(before, after, slider));
    let split = split_x(w, slider) as f32;

    // Divider: 3 px stroke centred on the split column edge
    let mut line = CoverageMask::new(w, h);
    let half = DIVIDER_WIDTH * 0.5;
    for x in 0..w {
        let cx = x as f32 + 0.5;
        if cx >= split - half && cx < split + half {
            for y in 0..h {
                line.put_pixel(x, y, Luma([255]));
            }
        }
    }
    draw_with_shadow(&mut canvas, &line, WHITE, 0.5);

    let Some(font) = font else {
        log_info!("No label font; exporting comparison without labels");
        return canvas.into_image();
    };
    let font_size = (w as f32 / 40.0).round().max(16.0);
    let baseline = h as f32 - LABEL_PADDING;
    let left_x = split / 2.0;
    let right_x = split + (w as f32 - split) / 2.0;
    for (text, x) in [(labels.0, left_x), (labels.1, right_x)] {
        let coverage = rasterize_line(font, text, font_size, TextAlignment::Center, x, baseline, w, h);
        draw_with_shadow(&mut canvas, &coverage, WHITE, 0.7);
    }
    canvas.into_image()
}

// ============================================================================
// VARIANT RENDERS
// ============================================================================

/// User colour / texture customizations only (cached textures only, no
/// loads are started).  Sills are included when `include_sills` is set.
fn draw_customizations(
    compositor: &Compositor,
    canvas: &mut Canvas,
    scene: &Scene,
    modified: &HashSet<AreaType>,
    textures: &TextureCache,
    include_sills: bool,
) {
    for region in sorted_by_priority(&scene.regions) {
        let Some(area_type) = region.area_type() else { continue };
        if region.is_cutout() || !modified.contains(&area_type) {
            continue;
        }
        if area_type == AreaType::Sills && !include_sills {
            continue;
        }
        let s = &region.surface;
        if s.is_color_fill() && s.fill_color().is_some() {
            fill::fill_color_region(canvas, region, &scene.regions);
        } else if let (true, Some(url)) = (s.is_texture_fill(), s.texture_url()) {
            if let Some(tex) = textures.get(url) {
                fill::fill_texture_region(canvas, region, &scene.regions, Some(&tex), compositor.calibration());
            }
        }
    }
}

/// The "before" view: photo plus the user's colour customizations, with no
/// stone, cutouts or effects.
pub fn render_before(
    compositor: &mut Compositor,
    scene: &Scene,
    modified: &HashSet<AreaType>,
    textures: &TextureCache,
) -> RgbaImage {
    let (mut canvas, _) = compositor.base_canvas(scene);
    draw_customizations(compositor, &mut canvas, scene, modified, textures, true);
    canvas.into_image()
}

/// Can this region take a stone material in a comparison variant?
fn takes_material(region: &Region) -> bool {
    let s = &region.surface;
    !region.is_cutout()
        && region.area_type().is_none()
        && !s.is_color_fill()
        && !s.is_texture_fill()
        && (region.is_mask() || region.points().len() >= 3)
}

/// Render the scene with `material` on every stone region (the material A
/// side of an A/B comparison).  Cutouts are subtracted from each polygon
/// directly instead of being restored in a later pass.
pub fn render_with_material(
    compositor: &mut Compositor,
    scene: &Scene,
    modified: &HashSet<AreaType>,
    textures: &TextureCache,
    material_texture: &RgbaImage,
) -> (RgbaImage, RenderReport) {
    let mut report = RenderReport::default();
    let (mut canvas, backdrop) = compositor.base_canvas(scene);
    let placement = backdrop.as_ref().map(|b| b.placement);
    draw_customizations(compositor, &mut canvas, scene, modified, textures, false);

    for region in scene.regions.iter().filter(|r| takes_material(r)) {
        let outcome = if region.is_mask() {
            compositor.draw_stone(&mut canvas, region, Some(material_texture), placement.as_ref(), textures, &mut report)
        } else {
            let mut path = Path::from_polygon(region.points());
            for id in &region.surface.cutouts {
                if let Some(cut) = scene.region(id) {
                    path.add_polygon_reversed(cut.points());
                }
            }
            fill::fill_stone_path(
                &mut canvas,
                region,
                &path,
                FillRule::NonZero,
                Some(material_texture),
                compositor.calibration(),
            )
        };
        report.record(&region.id, outcome);
    }

    draw_sills(&mut canvas, scene, &mut report);
    draw_depth_edges(&mut canvas, scene, &mut report);
    (canvas.into_image(), report)
}

/// Load every mask a comparison render needs, blocking.  Returns the ids
/// of mask regions whose mask could not be loaded.
pub fn prefetch_masks(scene: &Scene, textures: &TextureCache) -> Vec<String> {
    scene
        .regions
        .iter()
        .filter_map(|region| {
            let key = region.mask_key()?;
            let source = region.mask_source()?;
            textures.load_blocking(&key, source).err().map(|_| region.id.clone())
        })
        .collect()
}
