//! Full-frame layered render pipeline.
//!
//! Every call repaints the whole canvas from the scene state; there is no
//! incremental diffing.  The pass order is fixed:
//!
//! 1. clear to the background grey and draw the placed house photo,
//! 2. regions by area-type priority (cutouts and sills held back),
//! 3. cutouts, which redraw the photo inside their polygon,
//! 4. sills colour fills, so they survive the cutout pass,
//! 5. depth-edge shadows.
//!
//! Textures that are not cached yet are requested from the
//! [`TextureCache`] and reported in [`RenderReport::pending`]; the caller
//! polls the cache and renders again once they arrive.

use std::collections::HashSet;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{Canvas, DEFAULT_BACKGROUND_GRAY};
use crate::geometry::BackgroundPlacement;
use crate::ops::depth::draw_depth_edge;
use crate::ops::fill::{self, FillOutcome, SkipReason};
use crate::ops::mask_fill::fill_mask_region;
use crate::ops::tiles::ScaleCalibration;
use crate::scene::{draw_priority, AreaType, Region, Scene};
use crate::textures::TextureCache;

/// What a render did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderReport {
    /// Number of regions, cutouts and effects actually drawn.
    pub drawn: usize,
    /// Regions that were eligible but could not be drawn.
    pub skipped: Vec<(String, SkipReason)>,
    /// Cache keys whose loads are in flight; a redraw is due when they land.
    pub pending: Vec<String>,
}

impl RenderReport {
    pub fn needs_redraw(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn record(&mut self, id: &str, outcome: FillOutcome) {
        match outcome {
            FillOutcome::Drawn => self.drawn += 1,
            FillOutcome::Skipped(reason) => self.skipped.push((id.to_string(), reason)),
        }
    }

    fn mark_pending(&mut self, key: &str) {
        if !self.pending.iter().any(|k| k == key) {
            self.pending.push(key.to_string());
        }
    }
}

/// The house photo resized to its placement, computed once per scene.
#[derive(Clone)]
pub struct Backdrop {
    pub placement: BackgroundPlacement,
    pub image: Arc<RgbaImage>,
    pub x: i32,
    pub y: i32,
}

struct CachedBackdrop {
    scene_id: Uuid,
    canvas: (u32, u32),
    backdrop: Option<Backdrop>,
}

pub struct Compositor {
    calibration: ScaleCalibration,
    background: Rgba<u8>,
    cache: Option<CachedBackdrop>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(ScaleCalibration::default(), DEFAULT_BACKGROUND_GRAY)
    }
}

impl Compositor {
    pub fn new(calibration: ScaleCalibration, background_gray: u8) -> Self {
        Self {
            calibration,
            background: Rgba([background_gray, background_gray, background_gray, 255]),
            cache: None,
        }
    }

    pub fn calibration(&self) -> &ScaleCalibration {
        &self.calibration
    }

    /// Placement and pre-scaled photo for `scene`, recomputed only when the
    /// scene (or its canvas size) changes.  `None` for an empty photo.
    pub fn backdrop(&mut self, scene: &Scene) -> Option<Backdrop> {
        let canvas = (scene.canvas_width, scene.canvas_height);
        if let Some(c) = &self.cache
            && c.scene_id == scene.id
            && c.canvas == canvas
        {
            return c.backdrop.clone();
        }

        let backdrop = BackgroundPlacement::fit(canvas.0, canvas.1, scene.house.width(), scene.house.height())
            .map(|placement| {
                let (x, y, w, h) = placement.pixel_rect();
                let image = if scene.house.dimensions() == (w, h) {
                    Arc::clone(&scene.house)
                } else {
                    Arc::new(imageops::resize(scene.house.as_ref(), w, h, FilterType::Triangle))
                };
                Backdrop { placement, image, x, y }
            });
        if backdrop.is_none() {
            log_warn!("Scene photo has no pixels; rendering without background");
        }
        self.cache = Some(CachedBackdrop {
            scene_id: scene.id,
            canvas,
            backdrop: backdrop.clone(),
        });
        backdrop
    }

    /// A fresh canvas with the grey clear and the placed photo.
    pub fn base_canvas(&mut self, scene: &Scene) -> (Canvas, Option<Backdrop>) {
        let mut canvas = Canvas::new_filled(scene.canvas_width, scene.canvas_height, self.background);
        let backdrop = self.backdrop(scene);
        if let Some(b) = &backdrop {
            canvas.draw_image_at(&b.image, b.x, b.y, 1.0, None);
        }
        (canvas, backdrop)
    }

    /// Render the live scene.  `modified` gates colour and texture fills.
    pub fn render(
        &mut self,
        scene: &Scene,
        modified: &HashSet<AreaType>,
        textures: &TextureCache,
    ) -> (RgbaImage, RenderReport) {
        let mut report = RenderReport::default();
        let (mut canvas, backdrop) = self.base_canvas(scene);
        let placement = backdrop.as_ref().map(|b| b.placement);

        for region in sorted_by_priority(&scene.regions) {
            if region.is_cutout() || region.area_type() == Some(AreaType::Sills) {
                continue;
            }
            let s = &region.surface;
            let outcome = if s.is_color_fill() && s.fill_color().is_some() {
                if !is_modified(region, modified) {
                    continue;
                }
                fill::fill_color_region(&mut canvas, region, &scene.regions)
            } else if let (true, Some(url)) = (s.is_texture_fill(), s.texture_url()) {
                if !is_modified(region, modified) {
                    continue;
                }
                let tex = fetch(textures, url, url, &mut report);
                fill::fill_texture_region(&mut canvas, region, &scene.regions, tex.as_deref(), &self.calibration)
            } else if let Some(url) = s.stone_url() {
                let tex = fetch(textures, url, url, &mut report);
                self.draw_stone(&mut canvas, region, tex.as_deref(), placement.as_ref(), textures, &mut report)
            } else {
                continue;
            };
            report.record(&region.id, outcome);
        }

        // Cutouts in document order
        if let Some(b) = &backdrop {
            for region in scene.regions.iter().filter(|r| r.is_cutout()) {
                let outcome = fill::restore_cutout(&mut canvas, region, &b.image, (b.x, b.y));
                report.record(&region.id, outcome);
            }
        }

        draw_sills(&mut canvas, scene, &mut report);
        draw_depth_edges(&mut canvas, scene, &mut report);
        (canvas.into_image(), report)
    }

    /// Stone for one region: mask regions go through the mask engine,
    /// everything else is clipped to its polygon.
    pub(crate) fn draw_stone(
        &self,
        canvas: &mut Canvas,
        region: &Region,
        texture: Option<&RgbaImage>,
        placement: Option<&BackgroundPlacement>,
        textures: &TextureCache,
        report: &mut RenderReport,
    ) -> FillOutcome {
        match (region.mask_key(), region.mask_source()) {
            (Some(key), Some(source)) => {
                let mask = fetch(textures, &key, source, report);
                fill_mask_region(canvas, region, texture, mask.as_deref(), placement, &self.calibration)
            }
            _ => fill::fill_stone_region(canvas, region, texture, &self.calibration),
        }
    }
}

/// Stable sort by area-type priority.
pub fn sorted_by_priority(regions: &[Region]) -> Vec<&Region> {
    let mut order: Vec<&Region> = regions.iter().collect();
    order.sort_by_key(|r| draw_priority(r.area_type()));
    order
}

fn is_modified(region: &Region, modified: &HashSet<AreaType>) -> bool {
    region.area_type().is_some_and(|t| modified.contains(&t))
}

/// Cached image for `key`, or request it and note it as pending.
pub(crate) fn fetch(
    textures: &TextureCache,
    key: &str,
    source: &str,
    report: &mut RenderReport,
) -> Option<Arc<RgbaImage>> {
    if let Some(img) = textures.get(key) {
        return Some(img);
    }
    if textures.failure(key).is_none() {
        textures.request(key, source);
        report.mark_pending(key);
    }
    None
}

/// Sills colour fills, drawn regardless of the modified set.
pub(crate) fn draw_sills(canvas: &mut Canvas, scene: &Scene, report: &mut RenderReport) {
    for region in &scene.regions {
        let s = &region.surface;
        if region.area_type() == Some(AreaType::Sills) && s.is_color_fill() && s.fill_color().is_some() {
            let outcome = fill::fill_color_region(canvas, region, &scene.regions);
            report.record(&region.id, outcome);
        }
    }
}

pub(crate) fn draw_depth_edges(canvas: &mut Canvas, scene: &Scene, report: &mut RenderReport) {
    for (i, edge) in scene.depth_edges.iter().enumerate() {
        let outcome = draw_depth_edge(canvas, edge);
        report.record(&format!("depth-edge-{}", i), outcome);
    }
}
