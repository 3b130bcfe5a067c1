use image::Rgba;

use crate::canvas::Canvas;
use crate::ops::fill::{FillOutcome, SkipReason};
use crate::ops::path::{FillRule, Path};
use crate::scene::{DepthEdge, DepthMode};

const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Draw one depth-edge shadow effect.
pub fn draw_depth_edge(canvas: &mut Canvas, edge: &DepthEdge) -> FillOutcome {
    match edge.mode {
        DepthMode::Line => draw_line_shadow(canvas, edge),
        DepthMode::Area => draw_area_shadow(canvas, edge),
    }
}

/// Flat fill over the polygon at half the configured opacity.
fn draw_area_shadow(canvas: &mut Canvas, edge: &DepthEdge) -> FillOutcome {
    if edge.points.len() < 3 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let coverage = Path::from_polygon(&edge.points).rasterize(FillRule::NonZero, canvas.width, canvas.height);
    canvas.fill_coverage(&coverage, SHADOW, edge.opacity() * 0.5);
    FillOutcome::Drawn
}

/// A square-capped stroke `intensity` wide along the first two points,
/// shifted by `offset` on both axes.  Its colour fades along the line's
/// perpendicular from full opacity at the (unshifted) start point to clear
/// one `intensity` away.
fn draw_line_shadow(canvas: &mut Canvas, edge: &DepthEdge) -> FillOutcome {
    if edge.points.len() < 2 {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }
    let start = edge.points[0];
    let end = edge.points[1];
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 || !len.is_finite() {
        return FillOutcome::Skipped(SkipReason::TooFewPoints);
    }

    let width = edge.intensity();
    let half = width * 0.5;
    let opacity = edge.opacity();
    let offset = edge.offset();
    let (ux, uy) = (dx / len, dy / len);
    // Perpendicular (rotated 90° clockwise in screen space)
    let (px, py) = (-uy, ux);

    let sx = start.x + offset;
    let sy = start.y + offset;
    let ex = end.x + offset;
    let ey = end.y + offset;
    let pad = half * std::f32::consts::SQRT_2;
    let x0 = (sx.min(ex) - pad).floor().max(0.0) as u32;
    let y0 = (sy.min(ey) - pad).floor().max(0.0) as u32;
    let x1 = (sx.max(ex) + pad).ceil().max(0.0) as u32;
    let y1 = (sy.max(ey) + pad).ceil().max(0.0) as u32;

    canvas.shade((x0, y0, x1, y1), None, 1.0, |x, y| {
        let cx = x as f32 + 0.5;
        let cy = y as f32 + 0.5;
        // Stroke footprint, square caps extend half a width past each end
        let along = (cx - sx) * ux + (cy - sy) * uy;
        let across = (cx - sx) * px + (cy - sy) * py;
        if along < -half || along > len + half || across.abs() > half {
            return None;
        }
        // Gradient runs from the unshifted start along the perpendicular
        let t = ((cx - start.x) * px + (cy - start.y) * py) / width;
        let a = opacity * (1.0 - t.clamp(0.0, 1.0));
        if a <= 0.0 {
            return None;
        }
        Some(Rgba([0, 0, 0, (a * 255.0).round() as u8]))
    });
    FillOutcome::Drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn area_shadow_uses_half_opacity() {
        let edge = DepthEdge {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0), Point::new(0.0, 10.0)],
            mode: DepthMode::Area,
            shadow_opacity: Some(40.0),
            ..Default::default()
        };
        let mut c = Canvas::new_filled(20, 20, WHITE);
        assert!(draw_depth_edge(&mut c, &edge).is_drawn());
        // 20 % black over white
        assert_eq!(c.get_pixel(5, 5), Rgba([204, 204, 204, 255]));
        assert_eq!(c.get_pixel(15, 15), WHITE);
    }

    #[test]
    fn line_shadow_fades_across_the_line() {
        // Horizontal line; perpendicular points down (+y)
        let edge = DepthEdge {
            points: vec![Point::new(10.0, 20.0), Point::new(50.0, 20.0)],
            mode: DepthMode::Line,
            intensity: Some(10.0),
            shadow_opacity: Some(100.0),
            shadow_offset: Some(2.0),
            ..Default::default()
        };
        let mut c = Canvas::new_filled(80, 60, WHITE);
        assert!(draw_depth_edge(&mut c, &edge).is_drawn());
        // Stroke spans y in [17, 27] after the offset; darker nearer the line
        let near = c.get_pixel(30, 20)[0];
        let far = c.get_pixel(30, 26)[0];
        assert!(near < far, "near={near} far={far}");
        assert_eq!(c.get_pixel(30, 40), WHITE);
        // Above the start line the gradient is clamped to full opacity
        assert_eq!(c.get_pixel(30, 18), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn zero_length_line_is_skipped() {
        let edge = DepthEdge {
            points: vec![Point::new(5.0, 5.0), Point::new(5.0, 5.0)],
            ..Default::default()
        };
        let mut c = Canvas::new_filled(10, 10, WHITE);
        assert!(!draw_depth_edge(&mut c, &edge).is_drawn());
        assert_eq!(c.get_pixel(5, 5), WHITE);
    }
}
