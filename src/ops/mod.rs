// ============================================================================
// OPS — pixel operations behind the compositor
// ============================================================================
//
// Layout:
//   tiles.rs        — tile normalization and scale calibration
//   path.rs         — polygon paths + scanline rasterization (even-odd / nonzero)
//   fill.rs         — solid colour, texture and stone/brick region fills
//   mask_fill.rs    — raster-mask regions aligned to the photo placement
//   depth.rs        — depth-edge shadow effects
//   filters.rs      — separable gaussian blur (label / divider shadows)
//   lighting.rs     — evening lighting colour-matrix chain
//   segmentation.rs — AI mask providers and the selection overlay editor
//   text.rs         — label layout / rasterization and system font lookup
//   compare.rs      — before/after and material A/B comparison rendering
// ============================================================================

pub mod compare;
pub mod depth;
pub mod fill;
pub mod filters;
pub mod lighting;
pub mod mask_fill;
pub mod path;
pub mod segmentation;
pub mod text;
pub mod tiles;
