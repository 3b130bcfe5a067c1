// ============================================================================
// GEOMETRY — points, bounding boxes, background placement, display mapping
// ============================================================================

use serde::{Deserialize, Serialize};

/// A point in canvas pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned bounding box of a polygon (inclusive of its extreme points).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Returned for empty or non-finite input so callers never branch on emptiness.
    pub const DEFAULT: Bounds = Bounds { min_x: 0.0, min_y: 0.0, max_x: 100.0, max_y: 100.0 };

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) * 0.5, (self.min_y + self.max_y) * 0.5)
    }

    /// Integer pixel span `(x0, y0, x1, y1)` covering the box, clamped to a
    /// `canvas_w × canvas_h` surface.  `x1`/`y1` are exclusive.
    pub fn pixel_span(&self, canvas_w: u32, canvas_h: u32) -> (u32, u32, u32, u32) {
        let x0 = self.min_x.floor().max(0.0) as u32;
        let y0 = self.min_y.floor().max(0.0) as u32;
        let x1 = (self.max_x.ceil().max(0.0) as u32).min(canvas_w);
        let y1 = (self.max_y.ceil().max(0.0) as u32).min(canvas_h);
        (x0.min(x1), y0.min(y1), x1, y1)
    }
}

/// Bounding box of `points`.  Empty or non-finite input yields
/// [`Bounds::DEFAULT`] (0,0)-(100,100).
pub fn bounds_of(points: &[Point]) -> Bounds {
    if points.is_empty() || points.iter().any(|p| !p.is_finite()) {
        return Bounds::DEFAULT;
    }
    let mut b = Bounds {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };
    for p in points {
        b.min_x = b.min_x.min(p.x);
        b.min_y = b.min_y.min(p.y);
        b.max_x = b.max_x.max(p.x);
        b.max_y = b.max_y.max(p.y);
    }
    b
}

/// Arithmetic mean of every point across several polygons (hotspot anchor).
/// Returns `None` when there are no points at all.
pub fn centroid<'a, I>(polygons: I) -> Option<Point>
where
    I: IntoIterator<Item = &'a [Point]>,
{
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut count = 0usize;
    for poly in polygons {
        for p in poly {
            sum_x += p.x as f64;
            sum_y += p.y as f64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Point::new((sum_x / count as f64) as f32, (sum_y / count as f64) as f32))
}

// ============================================================================
// BACKGROUND PLACEMENT
// ============================================================================

/// Where the house photo lands on the canvas: uniformly scaled to fit and
/// centred.  Computed once per image load and shared by every layer so that
/// regions, masks and cutouts stay pixel-aligned.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundPlacement {
    pub draw_x: f32,
    pub draw_y: f32,
    pub draw_width: f32,
    pub draw_height: f32,
    pub scale: f32,
}

impl BackgroundPlacement {
    /// `None` when either the canvas or the image has a zero dimension.
    pub fn fit(canvas_w: u32, canvas_h: u32, image_w: u32, image_h: u32) -> Option<Self> {
        if canvas_w == 0 || canvas_h == 0 || image_w == 0 || image_h == 0 {
            return None;
        }
        let (cw, ch) = (canvas_w as f64, canvas_h as f64);
        let scale_x = cw / image_w as f64;
        let scale_y = ch / image_h as f64;
        // The bound axis spans the canvas exactly
        let (scale, draw_width, draw_height) = if scale_x <= scale_y {
            (scale_x, cw, image_h as f64 * scale_x)
        } else {
            (scale_y, image_w as f64 * scale_y, ch)
        };
        Some(Self {
            draw_x: ((cw - draw_width) / 2.0) as f32,
            draw_y: ((ch - draw_height) / 2.0) as f32,
            draw_width: draw_width as f32,
            draw_height: draw_height as f32,
            scale: scale as f32,
        })
    }

    pub fn center(&self) -> Point {
        Point::new(self.draw_x + self.draw_width / 2.0, self.draw_y + self.draw_height / 2.0)
    }

    /// The placement snapped to whole pixels: `(x, y, width, height)`.
    /// Every raster layer that follows the photo uses this same rectangle.
    pub fn pixel_rect(&self) -> (i32, i32, u32, u32) {
        (
            self.draw_x.round() as i32,
            self.draw_y.round() as i32,
            (self.draw_width.round() as u32).max(1),
            (self.draw_height.round() as u32).max(1),
        )
    }
}

/// Canvas dimensions for a photo: landscape (and square) photos get
/// `long × short`, portrait photos `short × long`.
pub fn canvas_size_for_image(image_w: u32, image_h: u32, long_edge: u32, short_edge: u32) -> (u32, u32) {
    if image_h > image_w {
        (short_edge, long_edge)
    } else {
        (long_edge, short_edge)
    }
}

// ============================================================================
// CANVAS <-> DISPLAY MAPPING
// ============================================================================

/// Map a canvas-space point to a display surface of `display` size
/// (the canvas shown scaled on screen).
pub fn canvas_to_display(p: Point, canvas: (u32, u32), display: (f32, f32)) -> Point {
    let sx = if canvas.0 == 0 { 1.0 } else { display.0 / canvas.0 as f32 };
    let sy = if canvas.1 == 0 { 1.0 } else { display.1 / canvas.1 as f32 };
    Point::new(p.x * sx, p.y * sy)
}

/// Inverse of [`canvas_to_display`].
pub fn display_to_canvas(p: Point, canvas: (u32, u32), display: (f32, f32)) -> Point {
    let sx = if display.0 <= 0.0 { 1.0 } else { canvas.0 as f32 / display.0 };
    let sy = if display.1 <= 0.0 { 1.0 } else { canvas.1 as f32 / display.1 };
    Point::new(p.x * sx, p.y * sy)
}
