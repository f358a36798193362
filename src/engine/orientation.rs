// src/engine/orientation.rs
//
// EXIF orientation model.
// Geometry in a plan is expressed in upright ("logical") space while the
// decoded pixels stay in stored ("physical") space until finalize; this module
// converts between the two.

use crate::engine::backend::Canvas;
use crate::engine::common::EngineResult;

/// EXIF Orientation tag values 1..=8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Normal,
        Orientation::FlipHorizontal,
        Orientation::Rotate180,
        Orientation::FlipVertical,
        Orientation::Transpose,
        Orientation::Rotate90,
        Orientation::Transverse,
        Orientation::Rotate270,
    ];

    /// Unknown or missing values are treated as Normal.
    pub fn from_exif(value: u16) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    pub fn exif_value(&self) -> u16 {
        match self {
            Orientation::Normal => 1,
            Orientation::FlipHorizontal => 2,
            Orientation::Rotate180 => 3,
            Orientation::FlipVertical => 4,
            Orientation::Transpose => 5,
            Orientation::Rotate90 => 6,
            Orientation::Transverse => 7,
            Orientation::Rotate270 => 8,
        }
    }

    /// True for the four orientations stored with width and height swapped.
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }

    /// Swap `(w, h)` when the orientation implies a quarter turn.
    ///
    /// The same call converts physical to logical and logical to physical.
    pub fn dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map a logical crop box inside a `container_w x container_h` logical
    /// image onto the physical pixel grid.
    ///
    /// Returns `(width, height, x, y)` in physical space. The box must fit in
    /// the container.
    pub fn crop(
        &self,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        container_w: u32,
        container_h: u32,
    ) -> (u32, u32, u32, u32) {
        let mirror_x = container_w - x - width;
        let mirror_y = container_h - y - height;
        match self {
            Orientation::Normal => (width, height, x, y),
            Orientation::FlipHorizontal => (width, height, mirror_x, y),
            Orientation::Rotate180 => (width, height, mirror_x, mirror_y),
            Orientation::FlipVertical => (width, height, x, mirror_y),
            Orientation::Transpose => (height, width, y, x),
            Orientation::Rotate90 => (height, width, y, mirror_x),
            Orientation::Transverse => (height, width, mirror_y, mirror_x),
            Orientation::Rotate270 => (height, width, mirror_y, x),
        }
    }

    /// Physically rotate/flip the canvas upright and retag it Normal.
    ///
    /// Touches nothing when already Normal.
    pub fn fix<C: Canvas + ?Sized>(&self, canvas: &mut C) -> EngineResult<()> {
        match self {
            Orientation::Normal => return Ok(()),
            Orientation::FlipHorizontal => canvas.flop()?,
            Orientation::Rotate180 => canvas.rotate(180)?,
            Orientation::FlipVertical => canvas.flip()?,
            Orientation::Transpose => canvas.transpose()?,
            Orientation::Rotate90 => canvas.rotate(90)?,
            Orientation::Transverse => canvas.transverse()?,
            Orientation::Rotate270 => canvas.rotate(270)?,
        }
        canvas.set_orientation(Orientation::Normal);
        Ok(())
    }
}
