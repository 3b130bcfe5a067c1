use image::{GrayImage, Luma};
use rayon::prelude::*;

use crate::geometry::{bounds_of, Bounds, Point};

/// Rule deciding which areas of a multi-subpath path are inside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillRule {
    /// Inside where the winding number is non-zero.
    NonZero,
    /// Inside where a ray crosses an odd number of edges.  Nested
    /// subpaths become holes regardless of their orientation.
    EvenOdd,
}

impl FillRule {
    fn is_inside(self, winding: i32) -> bool {
        match self {
            FillRule::NonZero => winding != 0,
            FillRule::EvenOdd => winding % 2 != 0,
        }
    }
}

/// A set of closed polygonal subpaths.
#[derive(Clone, Debug, Default)]
pub struct Path {
    subpaths: Vec<Vec<Point>>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polygon(points: &[Point]) -> Self {
        let mut p = Self::new();
        p.add_polygon(points);
        p
    }

    /// Append a closed subpath.  Fewer than three points contribute nothing.
    pub fn add_polygon(&mut self, points: &[Point]) {
        if points.len() >= 3 {
            self.subpaths.push(points.to_vec());
        }
    }

    /// Append a closed subpath with its winding reversed, so that under
    /// [`FillRule::NonZero`] it cancels an enclosing subpath of the
    /// opposite orientation.
    pub fn add_polygon_reversed(&mut self, points: &[Point]) {
        if points.len() >= 3 {
            self.subpaths.push(points.iter().rev().copied().collect());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn subpath_count(&self) -> usize {
        self.subpaths.len()
    }

    pub fn bounds(&self) -> Bounds {
        let all: Vec<Point> = self.subpaths.iter().flatten().copied().collect();
        bounds_of(&all)
    }

    /// Rasterize into a `width × height` coverage mask (255 inside, 0
    /// outside).  Pixels are sampled at their centres; no antialiasing.
    pub fn rasterize(&self, rule: FillRule, width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        if self.is_empty() || width == 0 || height == 0 {
            return mask;
        }

        // Flatten to edges once: (x0, y0, x1, y1), horizontal edges dropped
        let mut edges: Vec<[f32; 4]> = Vec::new();
        for sp in &self.subpaths {
            for i in 0..sp.len() {
                let a = sp[i];
                let b = sp[(i + 1) % sp.len()];
                if a.y != b.y && a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite() {
                    edges.push([a.x, a.y, b.x, b.y]);
                }
            }
        }
        if edges.is_empty() {
            return mask;
        }

        let b = self.bounds();
        let y_start = b.min_y.floor().max(0.0) as u32;
        let y_end = (b.max_y.ceil().max(0.0) as u32).min(height);
        if y_start >= y_end {
            return mask;
        }

        let stride = width as usize;
        let raw: &mut [u8] = mask.as_mut();
        raw[y_start as usize * stride..y_end as usize * stride]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(row, row_buf)| {
                let yc = (y_start + row as u32) as f32 + 0.5;

                // (x crossing, winding direction)
                let mut crossings: Vec<(f32, i32)> = edges
                    .iter()
                    .filter_map(|e| {
                        let (y_lo, y_hi) = if e[1] < e[3] { (e[1], e[3]) } else { (e[3], e[1]) };
                        if yc < y_lo || yc >= y_hi {
                            return None;
                        }
                        let t = (yc - e[1]) / (e[3] - e[1]);
                        let x = e[0] + t * (e[2] - e[0]);
                        Some((x, if e[3] > e[1] { 1 } else { -1 }))
                    })
                    .collect();
                if crossings.len() < 2 {
                    return;
                }
                crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut winding = 0;
                for pair in crossings.windows(2) {
                    winding += pair[0].1;
                    if !rule.is_inside(winding) {
                        continue;
                    }
                    // Pixel x is inside when its centre x+0.5 lies in [left, right)
                    let start = (pair[0].0 - 0.5).ceil().max(0.0) as usize;
                    let end = ((pair[1].0 - 0.5).ceil().max(0.0) as usize).min(stride);
                    if start < end {
                        row_buf[start..end].fill(255);
                    }
                }
            });
        mask
    }
}

/// Coverage of a single polygon under the nonzero rule.
pub fn polygon_mask(points: &[Point], width: u32, height: u32) -> GrayImage {
    Path::from_polygon(points).rasterize(FillRule::NonZero, width, height)
}

/// Number of covered pixels in a mask.
pub fn coverage_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|Luma([v])| *v > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
    }

    #[test]
    fn rectangle_covers_whole_pixels() {
        let m = polygon_mask(&rect(0.0, 0.0, 10.0, 10.0), 20, 20);
        assert_eq!(coverage_count(&m), 100);
        assert_eq!(m.get_pixel(9, 9)[0], 255);
        assert_eq!(m.get_pixel(10, 9)[0], 0);
    }

    #[test]
    fn even_odd_punches_nested_hole() {
        let mut p = Path::from_polygon(&rect(0.0, 0.0, 20.0, 20.0));
        p.add_polygon(&rect(5.0, 5.0, 15.0, 15.0));
        let m = p.rasterize(FillRule::EvenOdd, 20, 20);
        assert_eq!(coverage_count(&m), 400 - 100);
        assert_eq!(m.get_pixel(10, 10)[0], 0);
        assert_eq!(m.get_pixel(2, 2)[0], 255);

        // Same orientation under nonzero: no hole
        let m = p.rasterize(FillRule::NonZero, 20, 20);
        assert_eq!(coverage_count(&m), 400);
    }

    #[test]
    fn reversed_subpath_cancels_under_nonzero() {
        let mut p = Path::from_polygon(&rect(0.0, 0.0, 20.0, 20.0));
        p.add_polygon_reversed(&rect(5.0, 5.0, 15.0, 15.0));
        let m = p.rasterize(FillRule::NonZero, 20, 20);
        assert_eq!(m.get_pixel(10, 10)[0], 0);
        assert_eq!(coverage_count(&m), 300);
    }

    #[test]
    fn degenerate_polygons_are_ignored() {
        let p = Path::from_polygon(&[Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(p.is_empty());
        assert_eq!(coverage_count(&p.rasterize(FillRule::NonZero, 10, 10)), 0);
    }

    #[test]
    fn clipped_to_surface() {
        let m = polygon_mask(&rect(-10.0, -10.0, 5.0, 5.0), 10, 10);
        assert_eq!(coverage_count(&m), 25);
    }

    #[test]
    fn triangle_samples_pixel_centres() {
        let tri = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 4.0)];
        let m = polygon_mask(&tri, 4, 4);
        // Row 0 centre y=0.5: x in [0, 3.5) -> pixels 0..=2
        assert_eq!(m.get_pixel(2, 0)[0], 255);
        assert_eq!(m.get_pixel(3, 0)[0], 0);
        // Row 2 centre y=2.5: x in [0, 1.5) -> pixel 0 only
        assert_eq!(m.get_pixel(0, 2)[0], 255);
        assert_eq!(m.get_pixel(1, 2)[0], 0);
    }
}
