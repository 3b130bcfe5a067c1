// ============================================================================
// REGION FILLS — solid colour, surface texture and stone/brick tiling
// ============================================================================

use image::RgbaImage;

use crate::canvas::{parse_css_color, Canvas};
use crate::geometry::{bounds_of, Point};
use crate::ops::path::{FillRule, Path};
use crate::ops::tiles::{ScaleCalibration, TileSampler};
use crate::scene::Region;

/// Result of a single region fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    Drawn,
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    TooFewPoints,
    MissingColor,
    InvalidColor,
    TextureNotLoaded,
    DegenerateTile,
    MaskNotLoaded,
    NoPlacement,
}

impl FillOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, FillOutcome::Drawn)
    }
}

/// The region polygon plus every referenced cutout polygon, for even-odd
/// filling.  Unknown ids and cutouts with fewer than three points are
/// ignored.
pub fn path_with_cutouts(region: &Region, regions: &[Region]) -> Path {
    let mut path = Path::from_polygon(region.points());
    for id in &region.surface.cutouts {
        if let Some(cut) = regions.iter().find(|r| &r.id == id) {
            path.add_polygon(cut.points());
        }
    }
    path
}

/// Fill the region with its CSS `fillColor`, holes punched by its cutouts.
pub fn fill_color_region(canvas: &mut Canvas, region: &Region, regions: &[Region]) -> FillOutcome {
    if region.points().len() < 3 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let Some(color_str) = region.surface.fill_color() else {
        return FillOutcome::Skipped(SkipReason::MissingColor);
    };
    let Some(color) = parse_css_color(color_str) else {
        return FillOutcome::Skipped(SkipReason::InvalidColor);
    };

    let coverage = path_with_cutouts(region, regions).rasterize(FillRule::EvenOdd, canvas.width, canvas.height);
    canvas.fill_coverage(&coverage, color, region.surface.color_alpha());
    FillOutcome::Drawn
}

/// Tile a surface texture (mantle, hearth, siding boards) inside the region,
/// holes punched by its cutouts.  Tiles start at the polygon's bounding-box
/// minimum.
pub fn fill_texture_region(
    canvas: &mut Canvas,
    region: &Region,
    regions: &[Region],
    texture: Option<&RgbaImage>,
    calibration: &ScaleCalibration,
) -> FillOutcome {
    if region.points().len() < 3 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let Some(texture) = texture else {
        return FillOutcome::Skipped(SkipReason::TextureNotLoaded);
    };
    let factor = calibration.texture_factor(region.surface.scale);
    let tile = calibration.tile_for(texture, factor);
    if !tile.is_drawable() {
        return FillOutcome::Skipped(SkipReason::DegenerateTile);
    }

    let bounds = bounds_of(region.points());
    let clip = path_with_cutouts(region, regions).rasterize(FillRule::EvenOdd, canvas.width, canvas.height);
    let sampler = TileSampler::new(texture, tile, Point::new(bounds.min_x, bounds.min_y));
    let span = bounds.pixel_span(canvas.width, canvas.height);
    canvas.shade(span, Some(&clip), region.surface.texture_alpha(), |x, y| Some(sampler.sample(x, y)));
    FillOutcome::Drawn
}

/// Tile a stone or brick material inside the bare polygon.  Cutouts are not
/// merged here; the compositor restores them in its own pass.
pub fn fill_stone_region(
    canvas: &mut Canvas,
    region: &Region,
    texture: Option<&RgbaImage>,
    calibration: &ScaleCalibration,
) -> FillOutcome {
    if region.points().len() < 3 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let path = Path::from_polygon(region.points());
    fill_stone_path(canvas, region, &path, FillRule::NonZero, texture, calibration)
}

/// Stone tiling over an arbitrary path.  The tile grid starts at the
/// polygon's bounding-box minimum and is rotated by the region's `rotation`
/// around the bounding-box centre.
pub fn fill_stone_path(
    canvas: &mut Canvas,
    region: &Region,
    path: &Path,
    rule: FillRule,
    texture: Option<&RgbaImage>,
    calibration: &ScaleCalibration,
) -> FillOutcome {
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

    let bounds = bounds_of(region.points());
    let clip = path.rasterize(rule, canvas.width, canvas.height);
    let sampler = TileSampler::new(texture, tile, Point::new(bounds.min_x, bounds.min_y))
        .rotated(region.surface.rotation.unwrap_or(0.0), bounds.center());
    let span = path.bounds().pixel_span(canvas.width, canvas.height);
    canvas.shade(span, Some(&clip), 1.0, |x, y| Some(sampler.sample(x, y)));
    FillOutcome::Drawn
}

/// Redraw the placed background photo inside a cutout polygon.
pub fn restore_cutout(
    canvas: &mut Canvas,
    region: &Region,
    background: &RgbaImage,
    at: (i32, i32),
) -> FillOutcome {
    if region.points().len() < 3 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let clip = Path::from_polygon(region.points()).rasterize(FillRule::NonZero, canvas.width, canvas.height);
    canvas.draw_image_at(background, at.0, at.1, 1.0, Some(&clip));
    FillOutcome::Drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{AreaType, Surface, TextureMode};
    use image::Rgba;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
    }

    const GRAY: Rgba<u8> = Rgba([240, 240, 240, 255]);

    #[test]
    fn color_fill_leaves_contained_cutout_unfilled() {
        let window = Region::cutout("win", rect(20.0, 20.0, 40.0, 40.0));
        let wall = Region::polygon("wall", rect(0.0, 0.0, 60.0, 60.0)).with_surface(Surface {
            texture_mode: Some(TextureMode::ColorFill),
            fill_color: Some("#ff0000".into()),
            cutouts: vec!["win".into()],
            ..Default::default()
        });
        let regions = vec![wall.clone(), window];
        let mut c = Canvas::new_filled(80, 80, GRAY);
        assert_eq!(fill_color_region(&mut c, &wall, &regions), FillOutcome::Drawn);
        assert_eq!(c.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(c.get_pixel(30, 30), GRAY);
        assert_eq!(c.get_pixel(70, 70), GRAY);
    }

    #[test]
    fn color_fill_alpha_and_sill_override() {
        let mut surface = Surface {
            fill_color: Some("#000000".into()),
            material_opacity: Some(0.5),
            ..Default::default()
        };
        let r = Region::polygon("r", rect(0.0, 0.0, 4.0, 4.0)).with_surface(surface.clone());
        let mut c = Canvas::new_filled(4, 4, Rgba([200, 200, 200, 255]));
        fill_color_region(&mut c, &r, &[]);
        assert_eq!(c.get_pixel(1, 1), Rgba([100, 100, 100, 255]));

        surface.area_type = Some(AreaType::Sills);
        let r = Region::polygon("r", rect(0.0, 0.0, 4.0, 4.0)).with_surface(surface);
        let mut c = Canvas::new_filled(4, 4, Rgba([200, 200, 200, 255]));
        fill_color_region(&mut c, &r, &[]);
        assert_eq!(c.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn degenerate_inputs_are_silent_no_ops() {
        let mut c = Canvas::new_filled(10, 10, GRAY);
        let before = c.image().clone();
        let line = Region::polygon("l", vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert_eq!(
            fill_stone_region(&mut c, &line, None, &ScaleCalibration::default()),
            FillOutcome::Skipped(SkipReason::TooFewPoints)
        );
        let sq = Region::polygon("s", rect(0.0, 0.0, 5.0, 5.0));
        assert_eq!(
            fill_stone_region(&mut c, &sq, None, &ScaleCalibration::default()),
            FillOutcome::Skipped(SkipReason::TextureNotLoaded)
        );
        assert_eq!(fill_color_region(&mut c, &sq, &[]), FillOutcome::Skipped(SkipReason::MissingColor));
        assert_eq!(c.image(), &before);
    }

    #[test]
    fn stone_tiles_start_at_bounds_min() {
        // 100x100 texture, left half red, right half blue; scale 200 -> 345 px tiles
        let mut tex = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255]));
        for y in 0..100 {
            for x in 50..100 {
                tex.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let r = Region::polygon("s", rect(10.0, 0.0, 800.0, 20.0));
        let mut c = Canvas::new_filled(800, 20, GRAY);
        let out = fill_stone_region(&mut c, &r, Some(&tex), &ScaleCalibration::default());
        assert!(out.is_drawn());
        assert_eq!(c.get_pixel(5, 5), GRAY);
        assert_eq!(c.get_pixel(10, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(c.get_pixel(10 + 180, 5), Rgba([0, 0, 255, 255]));
        assert_eq!(c.get_pixel(10 + 345, 5), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn texture_fill_uses_material_opacity() {
        let tex = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let r = Region::polygon("m", rect(0.0, 0.0, 10.0, 10.0)).with_surface(Surface {
            texture_mode: Some(TextureMode::TextureFill),
            ..Default::default()
        });
        let mut c = Canvas::new_filled(10, 10, Rgba([250, 250, 250, 255]));
        fill_texture_region(&mut c, &r, &[], Some(&tex), &ScaleCalibration::default());
        // default opacity 0.8 over 250 -> 50
        assert_eq!(c.get_pixel(3, 3), Rgba([50, 50, 50, 255]));
    }
}
