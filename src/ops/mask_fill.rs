// ============================================================================
// MASK FILL — tiled material restricted to a raster mask
// ============================================================================
//
// Masks are authored in the uploaded photo's pixel space, so they are placed
// exactly where the photo was placed on the canvas, never stretched to the
// full canvas.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::Canvas;
use crate::geometry::{BackgroundPlacement, Point};
use crate::ops::fill::{FillOutcome, SkipReason};
use crate::ops::tiles::{ScaleCalibration, TileSampler, TileSize};
use crate::scene::Region;

/// Does a mask pixel select its location?  Two encodings are accepted:
/// near-white (binary polygon masks) and a translucent red overlay (the
/// brush / selection editor).
pub fn is_selected(p: [u8; 4]) -> bool {
    let [r, g, b, a] = p;
    let white = r > 200 && g > 200 && b > 200;
    let red_overlay = a > 30 && r > 50 && r > g && r > b;
    white || red_overlay
}

/// Build the canvas-sized buffer holding `texture` tiled from (0,0) and
/// made transparent wherever the placed mask does not select.  The tile
/// grid is turned `rotation` degrees about the centre of the placed photo.
pub fn build_masked_texture(
    canvas_width: u32,
    canvas_height: u32,
    texture: &RgbaImage,
    tile: TileSize,
    rotation: f32,
    mask: &RgbaImage,
    placement: &BackgroundPlacement,
) -> RgbaImage {
    let mut out = RgbaImage::new(canvas_width, canvas_height);
    if canvas_width == 0 || canvas_height == 0 || !tile.is_drawable() {
        return out;
    }

    let (rx, ry, rw, rh) = placement.pixel_rect();
    let placed_mask = if mask.dimensions() == (rw, rh) {
        mask.clone()
    } else {
        imageops::resize(mask, rw, rh, FilterType::Triangle)
    };

    let sampler = TileSampler::new(texture, tile, Point::new(0.0, 0.0)).rotated(rotation, placement.center());
    let stride = canvas_width as usize * 4;
    let raw: &mut [u8] = out.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let my = y as i64 - ry as i64;
        if my < 0 || my >= rh as i64 {
            return;
        }
        for x in 0..canvas_width {
            let mx = x as i64 - rx as i64;
            if mx < 0 || mx >= rw as i64 {
                continue;
            }
            let m = placed_mask.get_pixel(mx as u32, my as u32).0;
            if !is_selected(m) {
                continue;
            }
            let i = x as usize * 4;
            row[i..i + 4].copy_from_slice(&sampler.sample(x, y as u32).0);
        }
    });
    out
}

/// Draw a mask-mode region.  Needs the decoded mask, the texture and the
/// current background placement; any missing piece skips this region only.
pub fn fill_mask_region(
    canvas: &mut Canvas,
    region: &Region,
    texture: Option<&RgbaImage>,
    mask: Option<&RgbaImage>,
    placement: Option<&BackgroundPlacement>,
    calibration: &ScaleCalibration,
) -> FillOutcome {
    let Some(placement) = placement else {
        log_warn!("Mask region '{}' drawn before background placement; skipped", region.id);
        return FillOutcome::Skipped(SkipReason::NoPlacement);
    };
    let Some(mask) = mask else {
        return FillOutcome::Skipped(SkipReason::MaskNotLoaded);
    };
    let Some(texture) = texture else {
        return FillOutcome::Skipped(SkipReason::TextureNotLoaded);
    };
    let factor = if region.surface.is_brick() {
        calibration.brick_factor(region.surface.scale)
    } else {
        calibration.stone_factor(region.surface.scale)
    };
    let tile = calibration.tile_for(texture, factor);
    if !tile.is_drawable() {
        return FillOutcome::Skipped(SkipReason::DegenerateTile);
    }

    let rotation = region.surface.rotation.unwrap_or(0.0);
    let buffer = build_masked_texture(canvas.width, canvas.height, texture, tile, rotation, mask, placement);
    canvas.draw_image_at(&buffer, 0, 0, 1.0, None);
    FillOutcome::Drawn
}
