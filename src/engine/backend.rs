// src/engine/backend.rs
//
// Pixel engine capability.
// The pipeline only talks to these two traits; `raster` is the production
// implementation and tests substitute a recording double.

use crate::engine::common::EngineResult;
use crate::engine::orientation::Orientation;
use crate::ops::{InputFormat, OutputFormat};

/// Header-level facts about a source, obtained without decoding pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    /// Stored (physical) width as declared by the container
    pub width: u32,
    /// Stored (physical) height as declared by the container
    pub height: u32,
    pub format: InputFormat,
    pub orientation: Orientation,
}

/// Decode-time size hint in physical pixels.
///
/// The decoder may return any size between the hint and the full source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeHint {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeFilter {
    /// High-quality, used for real downscales
    Lanczos,
    /// Cheap, used for enlargements and near-1:1 resizes
    Triangle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Gray,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interlace {
    #[default]
    None,
    /// Progressive JPEG / WebP equivalent of line interlacing
    Line,
}

/// Decoder side of the engine.
pub trait ImageEngine: Send + Sync {
    type Canvas: Canvas;

    /// Read dimensions, format and orientation from the header only.
    fn probe(&self, bytes: &[u8]) -> EngineResult<SourceInfo>;

    /// Decode the first frame. Released when the canvas is dropped.
    fn decode(&self, bytes: &[u8], hint: Option<SizeHint>) -> EngineResult<Self::Canvas>;
}

/// One decoded image held by the engine.
///
/// All geometry is physical (stored) pixel space.
pub trait Canvas {
    fn dimensions(&self) -> (u32, u32);
    fn input_format(&self) -> InputFormat;
    fn orientation(&self) -> Orientation;

    /// Drop every frame but the first.
    fn reset_frame(&mut self) -> EngineResult<()>;
    /// Move any page/canvas offset to the origin.
    fn reset_canvas(&mut self) -> EngineResult<()>;

    /// Embedded ICC profile, if any.
    fn profile(&self) -> Option<&[u8]>;
    /// Convert pixels from `profile` into sRGB.
    fn apply_profile(&mut self, profile: &[u8]) -> EngineResult<()>;
    /// Retag without touching pixels.
    fn set_colorspace(&mut self, space: ColorSpace);
    fn colorspace(&self) -> ColorSpace;
    /// Convert pixels into `space`.
    fn transform_colorspace(&mut self, space: ColorSpace) -> EngineResult<()>;

    fn blur(&mut self, radius: f32, sigma: f32) -> EngineResult<()>;
    fn resize(&mut self, width: u32, height: u32, filter: ResizeFilter) -> EngineResult<()>;
    fn crop(&mut self, width: u32, height: u32, x: u32, y: u32) -> EngineResult<()>;
    fn sharpen(&mut self, radius: f32, sigma: f32, amount: f32, threshold: f32)
        -> EngineResult<()>;
    fn set_depth(&mut self, bits: u8) -> EngineResult<()>;

    /// Mirror top-to-bottom.
    fn flip(&mut self) -> EngineResult<()>;
    /// Mirror left-to-right.
    fn flop(&mut self) -> EngineResult<()>;
    /// Clockwise, in multiples of 90.
    fn rotate(&mut self, degrees: u32) -> EngineResult<()>;
    fn transpose(&mut self) -> EngineResult<()>;
    fn transverse(&mut self) -> EngineResult<()>;
    fn set_orientation(&mut self, orientation: Orientation);

    /// Stretch contrast to the full range.
    fn normalize(&mut self) -> EngineResult<()>;
    /// Drop metadata and profiles.
    fn strip(&mut self) -> EngineResult<()>;
    fn has_alpha(&self) -> bool;
    /// Replace the color of fully transparent pixels with the background.
    fn set_alpha_background(&mut self) -> EngineResult<()>;

    fn set_format(&mut self, format: OutputFormat);
    fn set_quality(&mut self, quality: u8);
    fn set_interlace(&mut self, interlace: Interlace);
    fn encode(&mut self) -> EngineResult<Vec<u8>>;
}
