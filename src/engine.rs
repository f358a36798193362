// src/engine.rs
//
// The thumbnailing core. Header probe and limit checks, a bounded worker
// pool, and a per-request pipeline that drives an `ImageEngine` through
// decode, color normalization, plan operations, orientation fix and encode.
//
// This file is a facade over the modules in engine/.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed source width or height.
/// Images beyond 32768 on either side are rejected as decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total source pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Sources below this on either side are rejected as degenerate.
pub const MIN_DIMENSION: u32 = 2;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod backend;
pub mod color;
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod io;
pub mod limits;
#[cfg(test)]
pub(crate) mod mock;
pub mod orientation;
pub mod pipeline;
pub mod pool;
pub mod raster;
pub mod resize;
pub mod tasks;

pub use backend::{Canvas, ColorSpace, ImageEngine, Interlace, ResizeFilter, SizeHint, SourceInfo};
pub use common::{run_with_panic_policy, EngineResult};
pub use io::{DirectoryLoader, SourceImage, SourceLoader};
pub use limits::Limits;
pub use orientation::Orientation;
pub use pipeline::{Pipeline, PipelineOptions, Stage, Thumbnail};
pub use pool::{Pool, PoolPermit};
pub use raster::{RasterCanvas, RasterEngine};
pub use tasks::{Outcome, Thumbnailer};
