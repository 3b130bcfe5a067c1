use image::{Rgba, RgbaImage};

use crate::geometry::Point;

/// On-canvas footprint (in canvas units) of the longest texture edge at
/// scale factor 1.0, independent of the texture's native resolution.
pub const REFERENCE_SIZE: f32 = 1000.0;

/// On-canvas size of one texture tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileSize {
    pub width: f32,
    pub height: f32,
}

impl TileSize {
    /// Zero, negative or non-finite tiles cannot be laid out.
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Normalize a texture's native size so that textures of any resolution
/// occupy the same on-canvas footprint at the same `scale_factor`.
pub fn normalized_tile_size(native_width: u32, native_height: u32, scale_factor: f32) -> TileSize {
    normalized_tile_size_with(REFERENCE_SIZE, native_width, native_height, scale_factor)
}

pub fn normalized_tile_size_with(
    reference_size: f32,
    native_width: u32,
    native_height: u32,
    scale_factor: f32,
) -> TileSize {
    let longest = native_width.max(native_height).max(1) as f32;
    let factor = reference_size / longest;
    TileSize {
        width: native_width as f32 * factor * scale_factor,
        height: native_height as f32 * factor * scale_factor,
    }
}

// ============================================================================
// SCALE CALIBRATION
// ============================================================================

/// Linear transforms from a region's raw `scale` slider value to the scale
/// factor fed into [`normalized_tile_size`].  The constants are product
/// calibration and are exposed through the settings file.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleCalibration {
    pub reference_size: f32,
    pub stone_divisor: f32,
    pub stone_multiplier: f32,
    pub brick_multiplier: f32,
    pub texture_divisor: f32,
    pub texture_multiplier: f32,
    pub default_stone_scale: f32,
    pub default_texture_scale: f32,
}

impl Default for ScaleCalibration {
    fn default() -> Self {
        Self {
            reference_size: REFERENCE_SIZE,
            stone_divisor: 1000.0,
            stone_multiplier: 1.725,
            brick_multiplier: 1.725,
            texture_divisor: 100.0,
            texture_multiplier: 0.5,
            default_stone_scale: 200.0,
            default_texture_scale: 100.0,
        }
    }
}

/// A missing or zero slider value means "use the default".
fn slider_or(value: Option<f32>, default: f32) -> f32 {
    match value {
        Some(v) if v != 0.0 && v.is_finite() => v,
        _ => default,
    }
}

impl ScaleCalibration {
    pub fn stone_factor(&self, slider: Option<f32>) -> f32 {
        let s = slider_or(slider, self.default_stone_scale);
        (s / self.stone_divisor) * self.stone_multiplier
    }

    pub fn brick_factor(&self, slider: Option<f32>) -> f32 {
        let s = slider_or(slider, self.default_stone_scale);
        (s / self.stone_divisor) * self.brick_multiplier
    }

    pub fn texture_factor(&self, slider: Option<f32>) -> f32 {
        let s = slider_or(slider, self.default_texture_scale);
        (s / self.texture_divisor) * self.texture_multiplier
    }

    pub fn tile_for(&self, texture: &RgbaImage, factor: f32) -> TileSize {
        normalized_tile_size_with(self.reference_size, texture.width(), texture.height(), factor)
    }
}

/// Number of tiles needed to cover `extent` canvas units.
pub fn tile_count(extent: f32, tile: f32) -> u32 {
    if tile <= 0.0 || !tile.is_finite() || extent <= 0.0 {
        return 0;
    }
    (extent / tile).ceil() as u32
}

// ============================================================================
// TILE SAMPLER
// ============================================================================

/// Samples a texture repeated on a grid of `tile`-sized cells whose origin
/// is `origin`, optionally rotated by a number of degrees around `pivot`
/// (see [`TileSampler::rotated`]).
/// Nearest-neighbour sampling at pixel centres; the grid is seamless in
/// every direction.
pub struct TileSampler<'a> {
    texture: &'a RgbaImage,
    tile: TileSize,
    origin: Point,
    pivot: Point,
    cos_r: f32,
    sin_r: f32,
}

impl<'a> TileSampler<'a> {
    pub fn new(texture: &'a RgbaImage, tile: TileSize, origin: Point) -> Self {
        Self {
            texture,
            tile,
            origin,
            pivot: origin,
            cos_r: 1.0,
            sin_r: 0.0,
        }
    }

    pub fn rotated(mut self, degrees: f32, pivot: Point) -> Self {
        if degrees != 0.0 && degrees.is_finite() {
            let r = degrees.to_radians();
            self.cos_r = r.cos();
            self.sin_r = r.sin();
            self.pivot = pivot;
        }
        self
    }

    pub fn sample(&self, x: u32, y: u32) -> Rgba<u8> {
        let (tw, th) = self.texture.dimensions();
        if tw == 0 || th == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let mut px = x as f32 + 0.5;
        let mut py = y as f32 + 0.5;

        // Inverse-rotate the pixel centre into the unrotated tile grid
        if self.sin_r != 0.0 || self.cos_r != 1.0 {
            let dx = px - self.pivot.x;
            let dy = py - self.pivot.y;
            px = self.pivot.x + dx * self.cos_r + dy * self.sin_r;
            py = self.pivot.y - dx * self.sin_r + dy * self.cos_r;
        }

        let u = (px - self.origin.x).rem_euclid(self.tile.width) / self.tile.width;
        let v = (py - self.origin.y).rem_euclid(self.tile.height) / self.tile.height;
        let sx = ((u * tw as f32) as u32).min(tw - 1);
        let sy = ((v * th as f32) as u32).min(th - 1);
        *self.texture.get_pixel(sx, sy)
    }
}
