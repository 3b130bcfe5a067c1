//! Masonry preview — composites tiled stone, brick and siding materials onto
//! polygon- or mask-defined regions of a house photograph.
//!
//! The crate is the CPU rendering core of the visualizer: it owns the scene
//! model, the per-region fill primitives, the layered compositor and the
//! before/after and material A/B comparison renderer. Catalog browsing,
//! persistence and the AI segmentation service are outside collaborators.
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | Points, bounds, background placement, display mapping |
//! | [`canvas`] | RGBA raster surface with source-over compositing |
//! | [`scene`] | Scene documents and the typed region model |
//! | [`textures`] | Shared texture cache with deferred loading |
//! | [`compositor`] | Full-frame layered render pipeline |
//! | [`session`] | Mutable visualizer state and user-facing operations |
//! | [`ops`] | Tiling, path rasterization, fills, masks, comparison, ... |
//! | [`io`] | Image decoding (paths, data URLs) and encoding |
//! | [`settings`] | Persistent `key=value` configuration |

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod compositor;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod scene;
pub mod session;
pub mod settings;
pub mod textures;
