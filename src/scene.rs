// ============================================================================
// SCENE — documents, the typed region model and the composition root
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Point;

// ============================================================================
// AREA TYPES
// ============================================================================

/// Semantic surface tag controlling z-order and colour/texture gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    Siding,
    Roof,
    Soffit,
    Door,
    Shutters,
    Trim,
    Sills,
    Hearth,
    Mantle,
    /// Any tag this build does not know.  Sorts first (priority 0).
    #[serde(other)]
    Other,
}

impl AreaType {
    /// Every surface type the user can recolour, in hotspot order.
    pub const CUSTOMIZABLE: [AreaType; 9] = [
        AreaType::Siding,
        AreaType::Roof,
        AreaType::Shutters,
        AreaType::Trim,
        AreaType::Door,
        AreaType::Soffit,
        AreaType::Sills,
        AreaType::Mantle,
        AreaType::Hearth,
    ];

    /// Draw order within the first compositor pass (lower draws first).
    pub fn priority(self) -> u32 {
        match self {
            AreaType::Other => 0,
            AreaType::Roof => 1,
            AreaType::Siding => 2,
            AreaType::Soffit => 3,
            AreaType::Door => 4,
            AreaType::Shutters => 5,
            AreaType::Trim => 6,
            AreaType::Sills => 7,
            AreaType::Hearth => 8,
            AreaType::Mantle => 9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AreaType::Siding => "siding",
            AreaType::Roof => "roof",
            AreaType::Soffit => "soffit",
            AreaType::Door => "door",
            AreaType::Shutters => "shutters",
            AreaType::Trim => "trim",
            AreaType::Sills => "sills",
            AreaType::Hearth => "hearth",
            AreaType::Mantle => "mantle",
            AreaType::Other => "other",
        }
    }

    /// Parse a known tag; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::CUSTOMIZABLE
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Tag as stored in a document; anything unknown is [`AreaType::Other`].
    pub fn from_tag(tag: &str) -> Self {
        Self::parse(tag).unwrap_or(AreaType::Other)
    }

    /// Opacity applied when a colour or texture is first picked for a
    /// surface that has none stored.
    pub fn default_opacity(self) -> Option<f32> {
        match self {
            AreaType::Siding => Some(0.5),
            AreaType::Roof => Some(0.6),
            AreaType::Shutters => Some(0.7),
            AreaType::Trim => Some(0.5),
            AreaType::Door => Some(0.7),
            AreaType::Soffit => Some(0.5),
            AreaType::Sills => Some(0.6),
            AreaType::Mantle => Some(0.8),
            AreaType::Hearth => Some(0.8),
            AreaType::Other => None,
        }
    }

    /// Sills and trim ignore stored opacity and always draw crisp.
    pub fn always_opaque(self) -> bool {
        matches!(self, AreaType::Sills | AreaType::Trim)
    }
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of an optional tag; untagged (stone) regions sort last.
pub fn draw_priority(area_type: Option<AreaType>) -> u32 {
    area_type.map_or(100, AreaType::priority)
}

// ============================================================================
// MATERIALS & MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureMode {
    ColorFill,
    TextureFill,
    BrickLinear,
    BrickRunning,
    /// Unrecognised modes fall through to stone tiling.
    #[serde(other)]
    Stone,
}

/// Material assigned to a stone/brick region.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoneAssignment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Catalog material descriptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stocked: Option<bool>,
}

impl Material {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl From<&Material> for StoneAssignment {
    fn from(m: &Material) -> Self {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            url: m.url.clone(),
            name: opt(&m.name),
            manufacturer: opt(&m.manufacturer),
            profile: opt(&m.profile),
        }
    }
}

// ============================================================================
// DEPTH EDGES
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthMode {
    #[default]
    Line,
    Area,
}

/// Shadow effect descriptor.  Missing or zero numeric fields take the
/// defaults intensity 17, opacity 40 %, offset 5, blur 3.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthEdge {
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub mode: DepthMode,
    #[serde(default)]
    pub intensity: Option<f32>,
    #[serde(default)]
    pub shadow_opacity: Option<f32>,
    #[serde(default)]
    pub shadow_offset: Option<f32>,
    #[serde(default)]
    pub shadow_blur: Option<f32>,
}

fn nonzero_or(v: Option<f32>, default: f32) -> f32 {
    match v {
        Some(x) if x != 0.0 && x.is_finite() => x,
        _ => default,
    }
}

impl DepthEdge {
    pub fn intensity(&self) -> f32 {
        nonzero_or(self.intensity, 17.0)
    }

    /// Shadow opacity as a 0..1 fraction.
    pub fn opacity(&self) -> f32 {
        (nonzero_or(self.shadow_opacity, 40.0) / 100.0).clamp(0.0, 1.0)
    }

    pub fn offset(&self) -> f32 {
        nonzero_or(self.shadow_offset, 5.0)
    }

    pub fn blur(&self) -> f32 {
        nonzero_or(self.shadow_blur, 3.0)
    }
}

// ============================================================================
// REGIONS
// ============================================================================

/// Loose wire form of a region, exactly as stored in scene documents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub use_mask: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    /// Raw tag, kept verbatim so unknown tags survive a save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_mode: Option<TextureMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stone: Option<StoneAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cutouts: Vec<String>,
    #[serde(default)]
    pub is_cutout: bool,
}

/// Geometry of a region: exactly one of the three renderable forms.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionShape {
    Polygon { points: Vec<Point> },
    /// Raster mask source (data URL or path).  `points` is an optional
    /// approximate outline used only for hotspots.
    Mask { source: String, points: Vec<Point> },
    /// A hole that restores the original photo.
    Cutout { points: Vec<Point> },
}

/// Everything about a region except its geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Surface {
    pub area_type: Option<AreaType>,
    /// The document's spelling of an unrecognised tag (`area_type` is then
    /// `Other`).
    pub area_tag: Option<String>,
    pub texture_mode: Option<TextureMode>,
    pub fill_color: Option<String>,
    pub texture_url: Option<String>,
    pub texture_name: Option<String>,
    pub stone: Option<StoneAssignment>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub material_opacity: Option<f32>,
    pub fill_opacity: Option<f32>,
    pub cutouts: Vec<String>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.trim().is_empty())
}

impl Surface {
    pub fn is_color_fill(&self) -> bool {
        self.texture_mode == Some(TextureMode::ColorFill)
    }

    pub fn is_texture_fill(&self) -> bool {
        self.texture_mode == Some(TextureMode::TextureFill)
    }

    pub fn is_brick(&self) -> bool {
        matches!(self.texture_mode, Some(TextureMode::BrickLinear | TextureMode::BrickRunning))
    }

    pub fn fill_color(&self) -> Option<&str> {
        non_empty(&self.fill_color)
    }

    pub fn texture_url(&self) -> Option<&str> {
        non_empty(&self.texture_url)
    }

    pub fn stone_url(&self) -> Option<&str> {
        self.stone.as_ref().map(|s| s.url.as_str()).filter(|u| !u.trim().is_empty())
    }

    /// Global alpha for a solid colour fill.
    pub fn color_alpha(&self) -> f32 {
        if self.area_type.is_some_and(AreaType::always_opaque) {
            return 1.0;
        }
        let a = self.material_opacity.unwrap_or(1.0) * self.fill_opacity.unwrap_or(1.0);
        a.clamp(0.0, 1.0)
    }

    /// Global alpha for a tiled surface texture.
    pub fn texture_alpha(&self) -> f32 {
        self.material_opacity.unwrap_or(0.8).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: String,
    pub name: Option<String>,
    pub shape: RegionShape,
    pub surface: Surface,
}

impl Region {
    pub fn polygon(id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            name: None,
            shape: RegionShape::Polygon { points },
            surface: Surface::default(),
        }
    }

    pub fn cutout(id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            name: None,
            shape: RegionShape::Cutout { points },
            surface: Surface::default(),
        }
    }

    pub fn masked(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            shape: RegionShape::Mask { source: source.into(), points: Vec::new() },
            surface: Surface::default(),
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn points(&self) -> &[Point] {
        match &self.shape {
            RegionShape::Polygon { points }
            | RegionShape::Mask { points, .. }
            | RegionShape::Cutout { points } => points,
        }
    }

    pub fn is_cutout(&self) -> bool {
        matches!(self.shape, RegionShape::Cutout { .. })
    }

    pub fn is_mask(&self) -> bool {
        matches!(self.shape, RegionShape::Mask { .. })
    }

    pub fn area_type(&self) -> Option<AreaType> {
        self.surface.area_type
    }

    /// Texture-cache key under which this region's decoded mask is stored.
    pub fn mask_key(&self) -> Option<String> {
        match &self.shape {
            RegionShape::Mask { .. } => Some(format!("mask:{}", self.id)),
            _ => None,
        }
    }

    pub fn mask_source(&self) -> Option<&str> {
        match &self.shape {
            RegionShape::Mask { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl TryFrom<RegionRecord> for Region {
    type Error = SceneError;

    fn try_from(r: RegionRecord) -> Result<Self, Self::Error> {
        let mask = r.mask.filter(|m| !m.trim().is_empty());
        let shape = if r.is_cutout {
            if r.use_mask {
                return Err(SceneError::InvalidRegion {
                    id: r.id,
                    reason: "a cutout cannot use a mask".to_string(),
                });
            }
            RegionShape::Cutout { points: r.points }
        } else if let (true, Some(source)) = (r.use_mask, mask) {
            RegionShape::Mask { source, points: r.points }
        } else {
            RegionShape::Polygon { points: r.points }
        };
        let area_type = r.area_type.as_deref().map(AreaType::from_tag);
        let area_tag = r.area_type.filter(|_| area_type == Some(AreaType::Other));
        Ok(Region {
            id: r.id,
            name: r.name,
            shape,
            surface: Surface {
                area_type,
                area_tag,
                texture_mode: r.texture_mode,
                fill_color: r.fill_color,
                texture_url: r.texture_url,
                texture_name: r.texture_name,
                stone: r.stone,
                scale: r.scale,
                rotation: r.rotation,
                material_opacity: r.material_opacity,
                fill_opacity: r.fill_opacity,
                cutouts: r.cutouts,
            },
        })
    }
}

impl From<&Region> for RegionRecord {
    fn from(r: &Region) -> Self {
        let (use_mask, mask, is_cutout) = match &r.shape {
            RegionShape::Polygon { .. } => (false, None, false),
            RegionShape::Mask { source, .. } => (true, Some(source.clone()), false),
            RegionShape::Cutout { .. } => (false, None, true),
        };
        let s = &r.surface;
        RegionRecord {
            id: r.id.clone(),
            name: r.name.clone(),
            points: r.points().to_vec(),
            use_mask,
            mask,
            area_type: match (&s.area_tag, s.area_type) {
                (Some(tag), Some(AreaType::Other)) => Some(tag.clone()),
                (_, t) => t.map(|t| t.as_str().to_string()),
            },
            texture_mode: s.texture_mode,
            fill_color: s.fill_color.clone(),
            texture_url: s.texture_url.clone(),
            texture_name: s.texture_name.clone(),
            stone: s.stone.clone(),
            scale: s.scale,
            rotation: s.rotation,
            material_opacity: s.material_opacity,
            fill_opacity: s.fill_opacity,
            cutouts: s.cutouts.clone(),
            is_cutout,
        }
    }
}

// ============================================================================
// DOCUMENTS
// ============================================================================

/// A stored scene preset: house photo source, regions and effects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub house: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub areas: Vec<RegionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depth_edges: Vec<DepthEdge>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hotspot_positions: HashMap<String, Point>,
}

/// A photo uploaded and segmented by the user.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocument {
    pub sample: UploadSample,
    #[serde(default)]
    pub custom_areas: Vec<UploadArea>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UploadSample {
    #[serde(default)]
    pub name: Option<String>,
    pub image: String,
}

/// Points here are normalized `[x, y]` pairs in the mask's own space; they
/// are not canvas coordinates, so conversion drops them.
#[derive(Clone, Debug, Deserialize)]
pub struct UploadArea {
    #[serde(default)]
    pub points: Vec<[f32; 2]>,
    #[serde(default)]
    pub mask: Option<String>,
}

impl From<UploadDocument> for SceneDocument {
    fn from(up: UploadDocument) -> Self {
        let areas = up
            .custom_areas
            .into_iter()
            .enumerate()
            .map(|(i, a)| RegionRecord {
                id: format!("custom-area-{}", i),
                name: Some(format!("Wall {}", i + 1)),
                use_mask: true,
                mask: a.mask,
                ..Default::default()
            })
            .collect();
        SceneDocument {
            house: up.sample.image,
            name: up.sample.name,
            areas,
            ..Default::default()
        }
    }
}

impl SceneDocument {
    /// Parse either a scene preset or a custom-upload document.
    pub fn from_json(text: &str) -> Result<Self, SceneError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("customAreas").is_some() && value.get("sample").is_some() {
            let up: UploadDocument = serde_json::from_value(value)?;
            return Ok(up.into());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// SCENE
// ============================================================================

/// One loaded house photo with its regions.  A new photo means a new
/// `Scene` (and a new `id`, which invalidates placement caches).
#[derive(Clone, Debug)]
pub struct Scene {
    pub id: Uuid,
    pub name: Option<String>,
    pub house: Arc<RgbaImage>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub regions: Vec<Region>,
    pub depth_edges: Vec<DepthEdge>,
    pub hotspot_positions: HashMap<String, Point>,
}

impl Scene {
    pub fn new(house: RgbaImage, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            house: Arc::new(house),
            canvas_width,
            canvas_height,
            regions: Vec::new(),
            depth_edges: Vec::new(),
            hotspot_positions: HashMap::new(),
        }
    }

    /// Build a scene from a document whose house photo has already been
    /// decoded.  Regions without an id get `area-<index>`.
    pub fn from_document(
        doc: SceneDocument,
        house: RgbaImage,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Result<Self, SceneError> {
        let mut scene = Scene::new(house, canvas_width, canvas_height);
        scene.name = doc.name;
        for (i, mut rec) in doc.areas.into_iter().enumerate() {
            if rec.id.trim().is_empty() {
                rec.id = format!("area-{}", i);
            }
            scene.regions.push(Region::try_from(rec)?);
        }
        scene.depth_edges = doc.depth_edges;
        scene.hotspot_positions = doc.hotspot_positions;
        Ok(scene)
    }

    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn regions_of_type(&self, area_type: AreaType) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.area_type() == Some(area_type))
    }

    /// Serialize back to a document (house source must be supplied since
    /// the scene only keeps decoded pixels).
    pub fn to_document(&self, house_source: &str) -> SceneDocument {
        SceneDocument {
            house: house_source.to_string(),
            name: self.name.clone(),
            areas: self.regions.iter().map(RegionRecord::from).collect(),
            depth_edges: self.depth_edges.clone(),
            hotspot_positions: self.hotspot_positions.clone(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum SceneError {
    Json(serde_json::Error),
    Io(std::io::Error),
    InvalidRegion { id: String, reason: String },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Json(e) => write!(f, "Invalid scene document: {}", e),
            SceneError::Io(e) => write!(f, "Could not read scene document: {}", e),
            SceneError::InvalidRegion { id, reason } => {
                write!(f, "Invalid region '{}': {}", id, reason)
            }
        }
    }
}

impl std::error::Error for SceneError {}

impl From<serde_json::Error> for SceneError {
    fn from(e: serde_json::Error) -> Self {
        SceneError::Json(e)
    }
}

impl From<std::io::Error> for SceneError {
    fn from(e: std::io::Error) -> Self {
        SceneError::Io(e)
    }
}
