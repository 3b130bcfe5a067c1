// ============================================================================
// SEGMENTATION — AI mask providers and the selection overlay editor
// ============================================================================
//
// The segmentation service itself is a black box behind `SegmentationBackend`.
// Two ways of asking it for masks exist (a text prompt, or positive/negative
// click points); both are `MaskProvider`s and the active one is chosen from
// settings.  `MaskSelection` merges the returned masks into the red overlay
// that later becomes a mask-mode region.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::geometry::Point;
use crate::io::{self, LoadError};

/// Overlay colour painted over selected pixels: `rgba(122, 5, 5, 100)`.
pub const OVERLAY_COLOR: [u8; 4] = [122, 5, 5, 100];
pub const HISTORY_LIMIT: usize = 20;
/// Masks selecting more than this share of the image are assumed inverted.
const INVERT_RATIO: f32 = 0.6;
const BOUNDARY_ROW_STEP: u32 = 10;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum SegmentationError {
    EmptyPrompt,
    NoPoints,
    NoMasks,
    Backend(String),
    Load(LoadError),
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationError::EmptyPrompt => write!(f, "Segmentation prompt is empty"),
            SegmentationError::NoPoints => write!(f, "No click points given"),
            SegmentationError::NoMasks => write!(f, "Segmentation returned no masks"),
            SegmentationError::Backend(e) => write!(f, "Segmentation service error: {}", e),
            SegmentationError::Load(e) => write!(f, "Could not load mask: {}", e),
        }
    }
}

impl std::error::Error for SegmentationError {}

impl From<LoadError> for SegmentationError {
    fn from(e: LoadError) -> Self {
        SegmentationError::Load(e)
    }
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// The external segmentation service.
pub trait SegmentationBackend: Send + Sync {
    fn segment_with_prompt(
        &self,
        image: &RgbaImage,
        prompt: &str,
        negative_prompt: Option<&str>,
    ) -> Result<Vec<RgbaImage>, SegmentationError>;

    fn segment_with_points(
        &self,
        image: &RgbaImage,
        positive: &[Point],
        negative: &[Point],
    ) -> Result<Vec<RgbaImage>, SegmentationError>;
}

/// Anything that can produce candidate masks for a photo.
pub trait MaskProvider {
    fn masks(&self, image: &RgbaImage) -> Result<Vec<RgbaImage>, SegmentationError>;
}

pub struct TextPromptProvider {
    backend: Arc<dyn SegmentationBackend>,
    pub prompt: String,
    pub negative_prompt: Option<String>,
}

impl TextPromptProvider {
    pub fn new(backend: Arc<dyn SegmentationBackend>, prompt: impl Into<String>) -> Self {
        Self {
            backend,
            prompt: prompt.into(),
            negative_prompt: None,
        }
    }

    pub fn with_negative(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }
}

impl MaskProvider for TextPromptProvider {
    fn masks(&self, image: &RgbaImage) -> Result<Vec<RgbaImage>, SegmentationError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(SegmentationError::EmptyPrompt);
        }
        let negative = self.negative_prompt.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let masks = self.backend.segment_with_prompt(image, prompt, negative)?;
        if masks.is_empty() {
            return Err(SegmentationError::NoMasks);
        }
        Ok(masks)
    }
}

/// Positive / negative click points, in photo pixel coordinates.
pub struct ClickPointProvider {
    backend: Arc<dyn SegmentationBackend>,
    pub positive: Vec<Point>,
    pub negative: Vec<Point>,
}

impl ClickPointProvider {
    pub fn new(backend: Arc<dyn SegmentationBackend>) -> Self {
        Self {
            backend,
            positive: Vec::new(),
            negative: Vec::new(),
        }
    }

    pub fn add_point(&mut self, p: Point, include: bool) {
        if include {
            self.positive.push(p);
        } else {
            self.negative.push(p);
        }
    }
}

impl MaskProvider for ClickPointProvider {
    fn masks(&self, image: &RgbaImage) -> Result<Vec<RgbaImage>, SegmentationError> {
        if self.positive.is_empty() {
            return Err(SegmentationError::NoPoints);
        }
        let masks = self.backend.segment_with_points(image, &self.positive, &self.negative)?;
        if masks.is_empty() {
            return Err(SegmentationError::NoMasks);
        }
        Ok(masks)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaskStrategy {
    #[default]
    TextPrompt,
    ClickPoints,
}

impl MaskStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "text_prompt" | "text" => Some(MaskStrategy::TextPrompt),
            "click_points" | "clicks" => Some(MaskStrategy::ClickPoints),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaskStrategy::TextPrompt => "text_prompt",
            MaskStrategy::ClickPoints => "click_points",
        }
    }
}

/// Inputs for whichever strategy is active.
#[derive(Clone, Debug, Default)]
pub struct MaskRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub positive_points: Vec<Point>,
    pub negative_points: Vec<Point>,
}

/// Build the provider selected by `strategy`.
pub fn provider_for(
    strategy: MaskStrategy,
    backend: Arc<dyn SegmentationBackend>,
    request: MaskRequest,
) -> Box<dyn MaskProvider> {
    match strategy {
        MaskStrategy::TextPrompt => Box::new(TextPromptProvider {
            backend,
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
        }),
        MaskStrategy::ClickPoints => Box::new(ClickPointProvider {
            backend,
            positive: request.positive_points,
            negative: request.negative_points,
        }),
    }
}

/// Serves pre-generated mask images regardless of the query.  Used for
/// offline runs where the masks were produced earlier.
pub struct StaticMaskBackend {
    masks: Vec<RgbaImage>,
}

impl StaticMaskBackend {
    pub fn new(masks: Vec<RgbaImage>) -> Self {
        Self { masks }
    }

    pub fn from_sources(sources: &[String], base_dir: &Path) -> Result<Self, SegmentationError> {
        let masks = sources
            .iter()
            .map(|s| io::load_image_source(s, base_dir))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { masks })
    }
}

impl SegmentationBackend for StaticMaskBackend {
    fn segment_with_prompt(
        &self,
        _image: &RgbaImage,
        _prompt: &str,
        _negative_prompt: Option<&str>,
    ) -> Result<Vec<RgbaImage>, SegmentationError> {
        Ok(self.masks.clone())
    }

    fn segment_with_points(
        &self,
        _image: &RgbaImage,
        _positive: &[Point],
        _negative: &[Point],
    ) -> Result<Vec<RgbaImage>, SegmentationError> {
        Ok(self.masks.clone())
    }
}

// ============================================================================
// SELECTION OVERLAY
// ============================================================================

#[derive(Clone, Debug)]
pub enum MaskOperation {
    /// Mask as stored (already inverted if it was detected as inverted).
    Add { mask: RgbaImage, label: String },
    Remove { mask: RgbaImage },
}

/// Editable union of masks, painted as a translucent red overlay at the
/// photo's resolution.
pub struct MaskSelection {
    overlay: RgbaImage,
    operations: Vec<MaskOperation>,
    history: VecDeque<(RgbaImage, usize)>,
}

fn brightness(p: &[u8]) -> f32 {
    (p[0] as f32 + p[1] as f32 + p[2] as f32) / 3.0
}

impl MaskSelection {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            overlay: RgbaImage::new(width, height),
            operations: Vec::new(),
            history: VecDeque::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.overlay.width()
    }

    pub fn height(&self) -> u32 {
        self.overlay.height()
    }

    pub fn operations(&self) -> &[MaskOperation] {
        &self.operations
    }

    fn fit(&self, mask: &RgbaImage) -> RgbaImage {
        if mask.dimensions() == self.overlay.dimensions() {
            mask.clone()
        } else {
            imageops::resize(mask, self.width(), self.height(), FilterType::Triangle)
        }
    }

    /// Merge a mask into the selection.  Returns the number of pixels
    /// painted.  Masks where more than 60 % of pixels are bright are taken
    /// to select the background and are inverted first.
    pub fn add_mask(&mut self, mask: &RgbaImage, label: &str) -> usize {
        let mut fitted = self.fit(mask);
        let total = (fitted.width() * fitted.height()).max(1) as f32;
        let bright = fitted.pixels().filter(|p| brightness(&p.0) > 128.0).count() as f32;
        let invert = bright / total > INVERT_RATIO;
        if invert {
            log_info!("Mask '{}' looks inverted ({:.1}% bright); inverting", label, bright / total * 100.0);
        }

        let mut painted = 0;
        for (src, dst) in fitted.pixels().zip(self.overlay.pixels_mut()) {
            let b = brightness(&src.0);
            let mut selected = b > 128.0 || (src[3] > 128 && b > 50.0);
            if invert {
                selected = !selected;
            }
            if selected {
                dst.0 = OVERLAY_COLOR;
                painted += 1;
            }
        }

        if invert {
            for p in fitted.pixels_mut() {
                p[0] = 255 - p[0];
                p[1] = 255 - p[1];
                p[2] = 255 - p[2];
            }
        }
        self.operations.push(MaskOperation::Add { mask: fitted, label: label.to_string() });
        painted
    }

    /// Clear the selection wherever `mask` has `r > 128` or `a > 128`.
    pub fn remove_mask(&mut self, mask: &RgbaImage) {
        let fitted = self.fit(mask);
        for (src, dst) in fitted.pixels().zip(self.overlay.pixels_mut()) {
            if src[0] > 128 || src[3] > 128 {
                dst[3] = 0;
            }
        }
        self.operations.push(MaskOperation::Remove { mask: fitted });
    }

    /// Record the current state for [`MaskSelection::undo`].  Keeps at most
    /// [`HISTORY_LIMIT`] entries, dropping the oldest.
    pub fn snapshot(&mut self) {
        self.history.push_back((self.overlay.clone(), self.operations.len()));
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn undo(&mut self) -> bool {
        let Some((overlay, ops)) = self.history.pop_back() else {
            return false;
        };
        self.overlay = overlay;
        self.operations.truncate(ops);
        true
    }

    pub fn clear(&mut self) {
        self.snapshot();
        self.overlay = RgbaImage::new(self.width(), self.height());
        self.operations.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn selected_count(&self) -> usize {
        self.overlay.pixels().filter(|p| p[3] > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_count() == 0
    }

    /// The overlay itself, in the red-tinted encoding mask regions accept.
    pub fn to_mask_image(&self) -> RgbaImage {
        self.overlay.clone()
    }

    /// Rough outline: the left-most pixel with alpha > 50 on every 10th
    /// row, top to bottom, followed by the right-most ones in the same row
    /// order.  Points are `[x, y]` normalized to 0..1.
    pub fn extract_boundary_points(&self) -> Vec<[f32; 2]> {
        let (w, h) = self.overlay.dimensions();
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let rows = || (0..h).step_by(BOUNDARY_ROW_STEP as usize);
        let edge = |y: u32, from_right: bool| {
            let opaque = |x: &u32| self.overlay.get_pixel(*x, y)[3] > 50;
            let x = if from_right { (0..w).rev().find(opaque) } else { (0..w).find(opaque) };
            x.map(|x| [x as f32 / w as f32, y as f32 / h as f32])
        };
        let left = rows().filter_map(|y| edge(y, false));
        let right = rows().filter_map(|y| edge(y, true));
        left.chain(right).collect()
    }
}
