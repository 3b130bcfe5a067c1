// ============================================================================
// SESSION — the customer's working state for one visualizer run
// ============================================================================
//
// Owns the loaded scene plus everything the user has picked: the selected
// stone, the short list of saved materials, per-area-type colour/texture
// customizations and the comparison slots.  Every operation mutates the
// scene in place; regions are never added or removed after load.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ab_glyph::FontArc;
use image::RgbaImage;

use crate::compositor::{Compositor, RenderReport};
use crate::geometry::{canvas_size_for_image, canvas_to_display, centroid, Point};
use crate::io::{self, LoadError};
use crate::ops::compare::{self, Comparison, ComparisonKind};
use crate::ops::lighting::LightingPreset;
use crate::scene::{AreaType, Material, Region, Scene, SceneDocument, SceneError, StoneAssignment, TextureMode};
use crate::settings::VisualizerSettings;
use crate::textures::{FileLoader, TextureCache, TextureLoader};

/// Most materials kept in the quick-pick strip.
pub const MAX_SAVED_MATERIALS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareSlot {
    A,
    B,
}

impl fmt::Display for CompareSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareSlot::A => f.write_str("A"),
            CompareSlot::B => f.write_str("B"),
        }
    }
}

/// A user-facing operation that could not be carried out.  When one is
/// returned the session is unchanged.
#[derive(Debug)]
pub enum ApplyError {
    NoScene,
    NoRegions,
    /// Every region is a cutout or a colour fill.
    NoEligibleRegions,
    TextureLoad { url: String, source: LoadError },
    HouseLoad(LoadError),
    Scene(SceneError),
    NoSavedMaterial(usize),
    MissingCompareMaterial(CompareSlot),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::NoScene => write!(f, "No scene is loaded"),
            ApplyError::NoRegions => {
                write!(f, "This scene does not have any stone areas mapped yet")
            }
            ApplyError::NoEligibleRegions => write!(
                f,
                "This scene does not have any stone areas available; all areas are cutouts or color fills"
            ),
            ApplyError::TextureLoad { url, source } => {
                write!(f, "Could not load material texture '{}': {}", url, source)
            }
            ApplyError::HouseLoad(e) => write!(f, "Could not load house photo: {}", e),
            ApplyError::Scene(e) => write!(f, "{}", e),
            ApplyError::NoSavedMaterial(i) => write!(f, "No saved material at index {}", i),
            ApplyError::MissingCompareMaterial(slot) => {
                write!(f, "No material chosen for comparison slot {}", slot)
            }
        }
    }
}

impl std::error::Error for ApplyError {}

impl From<SceneError> for ApplyError {
    fn from(e: SceneError) -> Self {
        ApplyError::Scene(e)
    }
}

/// Can `region` receive a whole-scene stone material?
fn takes_stone(region: &Region) -> bool {
    !region.is_cutout() && !region.surface.is_color_fill()
}

pub struct Session {
    settings: VisualizerSettings,
    textures: TextureCache,
    compositor: Compositor,
    scene: Option<Scene>,
    modified: HashSet<AreaType>,
    selected: Option<Material>,
    saved: Vec<Material>,
    active_saved: Option<usize>,
    compare_a: Option<Material>,
    compare_b: Option<Material>,
    comparison: Option<Comparison>,
    lighting: LightingPreset,
}

impl Session {
    pub fn new(settings: VisualizerSettings, loader: Arc<dyn TextureLoader>) -> Self {
        let compositor = Compositor::new(settings.calibration(), settings.background_gray);
        Self {
            settings,
            textures: TextureCache::new(loader),
            compositor,
            scene: None,
            modified: HashSet::new(),
            selected: None,
            saved: Vec::new(),
            active_saved: None,
            compare_a: None,
            compare_b: None,
            comparison: None,
            lighting: LightingPreset::default(),
        }
    }

    /// Session resolving relative sources against `base_dir`.
    pub fn with_base_dir(settings: VisualizerSettings, base_dir: impl AsRef<Path>) -> Self {
        Self::new(settings, Arc::new(FileLoader::new(base_dir.as_ref())))
    }

    pub fn settings(&self) -> &VisualizerSettings {
        &self.settings
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    pub fn modified(&self) -> &HashSet<AreaType> {
        &self.modified
    }

    pub fn selected_material(&self) -> Option<&Material> {
        self.selected.as_ref()
    }

    pub fn saved_materials(&self) -> &[Material] {
        &self.saved
    }

    pub fn active_saved(&self) -> Option<usize> {
        self.active_saved
    }

    pub fn lighting(&self) -> LightingPreset {
        self.lighting
    }

    pub fn set_lighting(&mut self, preset: LightingPreset) {
        self.lighting = preset;
    }

    // ------------------------------------------------------------------
    // Scene loading
    // ------------------------------------------------------------------

    /// Decode the document's house photo and replace the current scene.
    /// Customizations and any running comparison are reset.
    pub fn load_scene(&mut self, doc: SceneDocument) -> Result<(), ApplyError> {
        let house = self.textures.loader().load(&doc.house).map_err(ApplyError::HouseLoad)?;
        let (long, short) = self.settings.canvas_edges();
        let (w, h) = canvas_size_for_image(house.width(), house.height(), long, short);
        let scene = Scene::from_document(doc, house, w, h)?;
        log_info!(
            "Loaded scene '{}' ({} regions, canvas {}x{})",
            scene.name.as_deref().unwrap_or("untitled"),
            scene.regions.len(),
            w,
            h
        );
        self.scene = Some(scene);
        self.modified.clear();
        self.comparison = None;
        Ok(())
    }

    /// Install an already-built scene.
    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = Some(scene);
        self.modified.clear();
        self.comparison = None;
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// One full repaint.  Texture loads started by it are reported as
    /// pending; call [`Session::poll_textures`] and render again.
    pub fn render(&mut self) -> Option<(RgbaImage, RenderReport)> {
        let scene = self.scene.as_ref()?;
        Some(self.compositor.render(scene, &self.modified, &self.textures))
    }

    /// Render, waiting for every texture the scene needs.  Loads that fail
    /// are not retried, so this always settles.
    pub fn render_settled(&mut self) -> Option<(RgbaImage, RenderReport)> {
        loop {
            let (image, report) = self.render()?;
            if !report.needs_redraw() {
                return Some((image, report));
            }
            self.textures.wait_idle();
        }
    }

    /// Render with the lighting preset applied, for display or export.
    pub fn render_display(&mut self) -> Option<(RgbaImage, RenderReport)> {
        let lighting = self.lighting;
        let (image, report) = self.render_settled()?;
        Some((lighting.apply(&image), report))
    }

    /// Collect finished texture loads.  A non-empty result means a redraw
    /// is due.
    pub fn poll_textures(&self) -> Vec<String> {
        self.textures.poll()
    }

    // ------------------------------------------------------------------
    // Materials
    // ------------------------------------------------------------------

    fn check_can_take_stone(&self) -> Result<&Scene, ApplyError> {
        let scene = self.scene.as_ref().ok_or(ApplyError::NoScene)?;
        if scene.regions.is_empty() {
            return Err(ApplyError::NoRegions);
        }
        if !scene.regions.iter().any(takes_stone) {
            return Err(ApplyError::NoEligibleRegions);
        }
        Ok(scene)
    }

    fn load_material_texture(&self, material: &Material) -> Result<Arc<RgbaImage>, ApplyError> {
        self.textures
            .load_blocking(&material.url, &material.url)
            .map_err(|source| ApplyError::TextureLoad { url: material.url.clone(), source })
    }

    fn assign_stone(&mut self, material: &Material) -> usize {
        let Some(scene) = self.scene.as_mut() else { return 0 };
        let stone = StoneAssignment::from(material);
        let mut applied = 0;
        for region in scene.regions.iter_mut().filter(|r| takes_stone(r)) {
            region.surface.stone = Some(stone.clone());
            applied += 1;
        }
        self.selected = Some(material.clone());
        applied
    }

    /// Put `material` on every non-cutout, non-colour-fill region.  The
    /// texture is loaded first; nothing changes when that fails.  Returns
    /// how many regions received it.
    pub fn apply_material_to_all(&mut self, material: &Material) -> Result<usize, ApplyError> {
        self.check_can_take_stone()?;
        self.load_material_texture(material)?;
        let applied = self.assign_stone(material);
        log_info!("Applied '{}' to {} regions", material.name, applied);
        Ok(applied)
    }

    /// Add `material` to the saved list (oldest evicted past the limit) and
    /// make it active.  Already-saved materials are just re-activated.
    pub fn save_material(&mut self, material: Material) -> usize {
        let index = match self.saved.iter().position(|m| m.url == material.url) {
            Some(i) => i,
            None => {
                if self.saved.len() >= MAX_SAVED_MATERIALS {
                    self.saved.remove(0);
                    self.shift_compare_slots();
                }
                self.saved.push(material);
                self.saved.len() - 1
            }
        };
        self.active_saved = Some(index);
        index
    }

    /// Eviction drops the oldest material; slots holding it are cleared.
    fn shift_compare_slots(&mut self) {
        let saved = &self.saved;
        for slot in [&mut self.compare_a, &mut self.compare_b] {
            if slot.as_ref().is_some_and(|m| !saved.iter().any(|s| s.url == m.url)) {
                *slot = None;
            }
        }
    }

    /// Save and apply in one step, as picking from the catalog does.
    pub fn choose_material(&mut self, material: Material) -> Result<usize, ApplyError> {
        self.apply_material_to_all(&material)?;
        Ok(self.save_material(material))
    }

    /// Re-apply a saved material.  Leaves any running comparison.
    pub fn switch_to_saved(&mut self, index: usize) -> Result<usize, ApplyError> {
        let material = self.saved.get(index).cloned().ok_or(ApplyError::NoSavedMaterial(index))?;
        let applied = self.apply_material_to_all(&material)?;
        self.exit_comparison();
        self.active_saved = Some(index);
        Ok(applied)
    }

    pub fn assign_compare_slot(&mut self, slot: CompareSlot, index: usize) -> Result<(), ApplyError> {
        let material = self.saved.get(index).cloned().ok_or(ApplyError::NoSavedMaterial(index))?;
        match slot {
            CompareSlot::A => self.compare_a = Some(material),
            CompareSlot::B => self.compare_b = Some(material),
        }
        Ok(())
    }

    pub fn set_compare_material(&mut self, slot: CompareSlot, material: Option<Material>) {
        match slot {
            CompareSlot::A => self.compare_a = material,
            CompareSlot::B => self.compare_b = material,
        }
    }

    pub fn compare_material(&self, slot: CompareSlot) -> Option<&Material> {
        match slot {
            CompareSlot::A => self.compare_a.as_ref(),
            CompareSlot::B => self.compare_b.as_ref(),
        }
    }

    // ------------------------------------------------------------------
    // Colour / texture customization
    // ------------------------------------------------------------------

    /// Colour every region of `area_type`.  Re-picking the colour already
    /// shown un-modifies the type instead.  Returns whether the type is
    /// modified afterwards.
    pub fn apply_color_to_area(&mut self, area_type: AreaType, color: &str) -> Result<bool, ApplyError> {
        let scene = self.scene.as_mut().ok_or(ApplyError::NoScene)?;
        let current = scene.regions_of_type(area_type).next();
        let toggle_off = self.modified.contains(&area_type)
            && current
                .and_then(|r| r.surface.fill_color.as_deref())
                .is_some_and(|c| c.eq_ignore_ascii_case(color));
        if toggle_off {
            self.modified.remove(&area_type);
            return Ok(false);
        }

        self.modified.insert(area_type);
        let default_opacity = area_type.default_opacity().unwrap_or(0.5);
        for region in scene.regions.iter_mut().filter(|r| r.area_type() == Some(area_type)) {
            let s = &mut region.surface;
            s.fill_color = Some(color.to_string());
            s.texture_mode = Some(TextureMode::ColorFill);
            s.texture_url = None;
            s.material_opacity.get_or_insert(default_opacity);
        }
        Ok(true)
    }

    /// Tile a surface texture over every region of `area_type`, with the
    /// same toggle behaviour as [`Session::apply_color_to_area`].
    pub fn apply_texture_to_area(
        &mut self,
        area_type: AreaType,
        url: &str,
        name: Option<&str>,
    ) -> Result<bool, ApplyError> {
        let scene = self.scene.as_mut().ok_or(ApplyError::NoScene)?;
        let toggle_off = self.modified.contains(&area_type)
            && scene
                .regions_of_type(area_type)
                .next()
                .is_some_and(|r| r.surface.texture_url.as_deref() == Some(url));
        if toggle_off {
            self.modified.remove(&area_type);
            return Ok(false);
        }

        self.modified.insert(area_type);
        let default_opacity = area_type.default_opacity().unwrap_or(0.8);
        for region in scene.regions.iter_mut().filter(|r| r.area_type() == Some(area_type)) {
            let s = &mut region.surface;
            s.texture_url = Some(url.to_string());
            s.texture_name = name.map(str::to_string);
            s.texture_mode = Some(TextureMode::TextureFill);
            s.material_opacity.get_or_insert(default_opacity);
        }
        self.textures.request(url, url);
        Ok(true)
    }

    /// Hide one area type's customization again.  The stored colour or
    /// texture is kept, so re-picking it shows the same surface.  Returns
    /// whether the type was modified.
    pub fn clear_area_type_color(&mut self, area_type: AreaType) -> bool {
        self.modified.remove(&area_type)
    }

    /// Revert every area type to its unmodified (hidden) state.
    pub fn clear_all_colors(&mut self) {
        self.modified.clear();
    }

    /// Remove stone and colour from every region.
    pub fn clear_all(&mut self) {
        if let Some(scene) = self.scene.as_mut() {
            for region in &mut scene.regions {
                region.surface.stone = None;
                region.surface.fill_color = None;
            }
        }
        self.selected = None;
        self.comparison = None;
    }

    /// Hotspot anchor per customizable area type present in the scene, in
    /// display coordinates.  A stored position wins over the centroid of
    /// the type's points.
    pub fn hotspot_positions(&self, display: (f32, f32)) -> Vec<(AreaType, Point)> {
        let Some(scene) = self.scene.as_ref() else { return Vec::new() };
        let canvas = (scene.canvas_width, scene.canvas_height);
        AreaType::CUSTOMIZABLE
            .iter()
            .copied()
            .filter(|t| scene.regions_of_type(*t).next().is_some())
            .filter_map(|t| {
                let anchor = match scene.hotspot_positions.get(t.as_str()) {
                    Some(p) => *p,
                    None => centroid(scene.regions_of_type(t).map(Region::points))?,
                };
                Some((t, canvas_to_display(anchor, canvas, display)))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    pub fn comparison(&self) -> Option<&Comparison> {
        self.comparison.as_ref()
    }

    pub fn exit_comparison(&mut self) {
        self.comparison = None;
    }

    /// Start a before/after comparison against the current render.
    pub fn start_before_after(&mut self) -> Result<&Comparison, ApplyError> {
        let scene = self.scene.as_ref().ok_or(ApplyError::NoScene)?;
        compare::prefetch_masks(scene, &self.textures);
        let (after, _) = self.render_settled().ok_or(ApplyError::NoScene)?;
        let scene = self.scene.as_ref().ok_or(ApplyError::NoScene)?;
        let before = compare::render_before(&mut self.compositor, scene, &self.modified, &self.textures);
        Ok(&*self.comparison.insert(Comparison::new(ComparisonKind::BeforeAfter, before, after)))
    }

    /// Start an A/B comparison.  Slot A (left) and slot B (right, falling
    /// back to the selected material) must both be set; both textures are
    /// loaded before anything changes.  Material B ends up applied to the
    /// live scene.
    pub fn start_material_comparison(&mut self) -> Result<&Comparison, ApplyError> {
        let left = self.compare_a.clone().ok_or(ApplyError::MissingCompareMaterial(CompareSlot::A))?;
        let right = self
            .compare_b
            .clone()
            .or_else(|| self.selected.clone())
            .ok_or(ApplyError::MissingCompareMaterial(CompareSlot::B))?;

        self.check_can_take_stone()?;
        let left_tex = self.load_material_texture(&left)?;
        self.load_material_texture(&right)?;

        self.assign_stone(&right);
        if let Some(scene) = self.scene.as_ref() {
            let failed = compare::prefetch_masks(scene, &self.textures);
            if !failed.is_empty() {
                log_warn!("Comparison renders without masks for: {}", failed.join(", "));
            }
        }
        let (after, _) = self.render_settled().ok_or(ApplyError::NoScene)?;
        let scene = self.scene.as_ref().ok_or(ApplyError::NoScene)?;
        let (before, _) =
            compare::render_with_material(&mut self.compositor, scene, &self.modified, &self.textures, &left_tex);
        log_info!("Comparing '{}' against '{}'", left.name, right.name);
        let kind = ComparisonKind::Materials { a: left, b: right };
        Ok(&*self.comparison.insert(Comparison::new(kind, before, after)))
    }

    pub fn set_slider(&mut self, percent: f32) {
        if let Some(c) = self.comparison.as_mut() {
            c.set_slider(percent);
        }
    }

    pub fn drag_slider(&mut self, pointer_x: f32, display_width: f32) {
        if let Some(c) = self.comparison.as_mut() {
            c.drag_to(pointer_x, display_width);
        }
    }

    /// The comparison as it would be downloaded, with lighting applied to
    /// both sides.
    pub fn export_comparison(&self, font: Option<&FontArc>) -> Option<RgbaImage> {
        let c = self.comparison.as_ref()?;
        let mut lit = Comparison::new(c.kind.clone(), self.lighting.apply(&c.before), self.lighting.apply(&c.after));
        lit.set_slider(c.slider());
        Some(lit.export(font))
    }

    pub fn comparison_filename(&self) -> Option<String> {
        let c = self.comparison.as_ref()?;
        let scene_name = self.scene.as_ref().and_then(|s| s.name.as_deref()).unwrap_or("scene");
        let material = self.selected.as_ref().map(|m| m.name.as_str());
        Some(c.filename(&self.settings.export_prefix, scene_name, material))
    }

    /// Serialize the current scene (with its customizations) back to a
    /// document.  The photo is embedded as a PNG data URL.
    pub fn to_document(&self) -> Result<SceneDocument, ApplyError> {
        let scene = self.scene.as_ref().ok_or(ApplyError::NoScene)?;
        let house = io::encode_png_data_url(&scene.house)
            .map_err(|e| ApplyError::HouseLoad(LoadError::Decode(e)))?;
        Ok(scene.to_document(&house))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct SolidLoader;

    impl TextureLoader for SolidLoader {
        fn load(&self, source: &str) -> Result<RgbaImage, LoadError> {
            match source {
                "missing.png" => Err(LoadError::Unsupported(source.to_string())),
                "house.png" => Ok(RgbaImage::from_pixel(160, 96, Rgba([128, 128, 128, 255]))),
                "a.png" => Ok(RgbaImage::from_pixel(8, 8, Rgba([200, 0, 0, 255]))),
                _ => Ok(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 200, 255]))),
            }
        }
    }

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)]
    }

    fn session_with(regions: Vec<Region>) -> Session {
        let mut s = Session::new(VisualizerSettings::default(), Arc::new(SolidLoader));
        let scene = Scene::new(RgbaImage::from_pixel(160, 96, Rgba([128, 128, 128, 255])), 160, 96);
        s.set_scene(scene.with_regions(regions));
        s
    }

    fn typed(id: &str, t: AreaType, pts: Vec<Point>) -> Region {
        Region::polygon(id, pts).with_surface(crate::scene::Surface { area_type: Some(t), ..Default::default() })
    }

    #[test]
    fn apply_material_errors_leave_state_alone() {
        let mut s = Session::new(VisualizerSettings::default(), Arc::new(SolidLoader));
        assert!(matches!(s.apply_material_to_all(&Material::new("a.png", "A")), Err(ApplyError::NoScene)));

        let mut s = session_with(vec![]);
        assert!(matches!(s.apply_material_to_all(&Material::new("a.png", "A")), Err(ApplyError::NoRegions)));

        let mut s = session_with(vec![Region::cutout("hole", rect(0.0, 0.0, 5.0, 5.0))]);
        assert!(matches!(
            s.apply_material_to_all(&Material::new("a.png", "A")),
            Err(ApplyError::NoEligibleRegions)
        ));

        let mut s = session_with(vec![Region::polygon("wall", rect(0.0, 0.0, 50.0, 50.0))]);
        let err = s.apply_material_to_all(&Material::new("missing.png", "Gone"));
        assert!(matches!(err, Err(ApplyError::TextureLoad { .. })));
        assert!(s.scene().unwrap().regions[0].surface.stone.is_none());
        assert!(s.selected_material().is_none());
    }

    #[test]
    fn apply_material_skips_cutouts_and_color_fills() {
        let mut s = session_with(vec![
            Region::polygon("wall", rect(0.0, 0.0, 50.0, 50.0)),
            Region::cutout("door", rect(10.0, 10.0, 20.0, 20.0)),
            typed("roof", AreaType::Roof, rect(0.0, 0.0, 10.0, 10.0)).with_surface(crate::scene::Surface {
                area_type: Some(AreaType::Roof),
                texture_mode: Some(TextureMode::ColorFill),
                ..Default::default()
            }),
        ]);
        assert_eq!(s.apply_material_to_all(&Material::new("a.png", "Ledge")).unwrap(), 1);
        let regions = &s.scene().unwrap().regions;
        assert_eq!(regions[0].surface.stone_url(), Some("a.png"));
        assert!(regions[1].surface.stone.is_none());
        assert!(regions[2].surface.stone.is_none());
    }

    #[test]
    fn color_pick_toggles_and_sets_default_opacity() {
        let mut s = session_with(vec![
            typed("roof-1", AreaType::Roof, rect(0.0, 0.0, 10.0, 10.0)),
            typed("roof-2", AreaType::Roof, rect(20.0, 0.0, 30.0, 10.0)),
        ]);
        assert!(s.apply_color_to_area(AreaType::Roof, "#336699").unwrap());
        let regions = &s.scene().unwrap().regions;
        for r in regions {
            assert_eq!(r.surface.fill_color.as_deref(), Some("#336699"));
            assert_eq!(r.surface.material_opacity, Some(0.6));
            assert!(r.surface.is_color_fill());
        }
        // same colour again, case-insensitively: toggled off, colour kept
        assert!(!s.apply_color_to_area(AreaType::Roof, "#336699".to_uppercase().as_str()).unwrap());
        assert!(!s.modified().contains(&AreaType::Roof));
        assert!(s.apply_color_to_area(AreaType::Roof, "#336699").unwrap());
        s.clear_all_colors();
        assert!(s.modified().is_empty());
    }

    #[test]
    fn clearing_one_area_type_leaves_the_others() {
        let mut s = session_with(vec![
            typed("roof", AreaType::Roof, rect(0.0, 0.0, 10.0, 10.0)),
            typed("door", AreaType::Door, rect(20.0, 0.0, 30.0, 10.0)),
        ]);
        s.apply_color_to_area(AreaType::Roof, "#336699").unwrap();
        s.apply_color_to_area(AreaType::Door, "#aa0000").unwrap();

        assert!(s.clear_area_type_color(AreaType::Roof));
        assert!(!s.clear_area_type_color(AreaType::Roof));
        assert!(!s.modified().contains(&AreaType::Roof));
        assert!(s.modified().contains(&AreaType::Door));
        assert_eq!(s.scene().unwrap().regions[0].surface.fill_color.as_deref(), Some("#336699"));

        // hidden again in the render
        let (img, _) = s.render().unwrap();
        s.clear_all_colors();
        let (plain, _) = s.render().unwrap();
        assert_eq!(img.get_pixel(5, 5), plain.get_pixel(5, 5));
        assert_ne!(img.get_pixel(25, 5), plain.get_pixel(25, 5));
    }

    #[test]
    fn texture_pick_uses_fallback_opacity() {
        let mut s = session_with(vec![typed("x", AreaType::Other, rect(0.0, 0.0, 10.0, 10.0))]);
        assert!(s.apply_texture_to_area(AreaType::Other, "wood.png", Some("Oak")).unwrap());
        let r = &s.scene().unwrap().regions[0];
        assert_eq!(r.surface.material_opacity, Some(0.8));
        assert!(r.surface.is_texture_fill());
        assert!(!s.apply_texture_to_area(AreaType::Other, "wood.png", None).unwrap());
        s.textures().wait_idle();
    }

    #[test]
    fn saved_materials_evict_oldest() {
        let mut s = session_with(vec![]);
        for i in 0..6 {
            s.save_material(Material::new(format!("m{}.png", i), format!("M{}", i)));
        }
        let urls: Vec<&str> = s.saved_materials().iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, ["m1.png", "m2.png", "m3.png", "m4.png", "m5.png"]);
        assert_eq!(s.active_saved(), Some(4));
        assert_eq!(s.save_material(Material::new("m2.png", "again")), 1);
        assert!(matches!(s.assign_compare_slot(CompareSlot::A, 9), Err(ApplyError::NoSavedMaterial(9))));
    }

    #[test]
    fn hotspots_prefer_stored_positions() {
        let mut s = session_with(vec![
            typed("door", AreaType::Door, rect(0.0, 0.0, 20.0, 20.0)),
            typed("trim", AreaType::Trim, rect(0.0, 0.0, 40.0, 40.0)),
        ]);
        if let Some(scene) = s.scene_mut() {
            scene.hotspot_positions.insert("trim".into(), Point::new(80.0, 48.0));
        }
        let spots = s.hotspot_positions((320.0, 192.0));
        assert_eq!(spots, vec![(AreaType::Trim, Point::new(160.0, 96.0)), (AreaType::Door, Point::new(20.0, 20.0))]);
    }

    #[test]
    fn material_comparison_needs_both_slots() {
        let mut s = session_with(vec![Region::polygon("wall", rect(0.0, 0.0, 160.0, 96.0))]);
        assert!(matches!(
            s.start_material_comparison(),
            Err(ApplyError::MissingCompareMaterial(CompareSlot::A))
        ));
        s.set_compare_material(CompareSlot::A, Some(Material::new("a.png", "Red")));
        s.set_compare_material(CompareSlot::B, Some(Material::new("missing.png", "Gone")));
        assert!(matches!(s.start_material_comparison(), Err(ApplyError::TextureLoad { .. })));
        assert!(s.scene().unwrap().regions[0].surface.stone.is_none());

        s.set_compare_material(CompareSlot::B, Some(Material::new("b.png", "Blue")));
        let c = s.start_material_comparison().unwrap();
        assert_eq!(*c.before.get_pixel(80, 48), Rgba([200, 0, 0, 255]));
        assert_eq!(*c.after.get_pixel(80, 48), Rgba([0, 0, 200, 255]));
        assert_eq!(s.selected_material().map(|m| m.url.as_str()), Some("b.png"));
        assert_eq!(
            s.comparison_filename().unwrap(),
            "Masonry-scene-Red-vs-Blue-comparison.png"
        );
    }
}
