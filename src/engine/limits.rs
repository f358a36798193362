// src/engine/limits.rs
//
// Source size ceilings and enforcement helpers.
// Checked against header values before any pixel is decoded, and again
// against the decoded canvas.

use crate::engine::common::EngineResult;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS, MIN_DIMENSION};
use crate::error::ThumbError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted width or height
    pub max_dimension: u32,
    /// Largest accepted width * height
    pub max_pixels: u64,
    /// Largest accepted encoded source; `None` = unbounded
    pub max_bytes: Option<u64>,
    /// Sources narrower or shorter than this are not worth thumbnailing
    pub min_dimension: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
            max_bytes: None,
            min_dimension: MIN_DIMENSION,
        }
    }
}

impl Limits {
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn enforce_source_len(&self, len: usize) -> EngineResult<()> {
        if let Some(limit) = self.max_bytes {
            let len = len as u64;
            if len > limit {
                return Err(ThumbError::source_too_large(len, limit));
            }
        }
        Ok(())
    }

    /// Ceilings first: a 34000x1 strip is too large, not too small.
    pub fn enforce_dimensions(&self, width: u32, height: u32) -> EngineResult<()> {
        self.enforce_ceilings(width, height)?;
        if width < self.min_dimension || height < self.min_dimension {
            return Err(ThumbError::image_too_small(width, height, self.min_dimension));
        }
        Ok(())
    }

    pub fn enforce_ceilings(&self, width: u32, height: u32) -> EngineResult<()> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ThumbError::dimension_exceeds_limit(
                width.max(height),
                self.max_dimension,
            ));
        }
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(ThumbError::pixel_count_exceeds_limit(pixels, self.max_pixels));
        }
        Ok(())
    }
}
