// src/engine/mock.rs
//
// Recording engine for pipeline tests. Tracks geometry without pixels,
// records every primitive call, injects failures by primitive name and
// counts canvas releases.

use crate::engine::backend::{
    Canvas, ColorSpace, ImageEngine, Interlace, ResizeFilter, SizeHint, SourceInfo,
};
use crate::engine::common::EngineResult;
use crate::engine::orientation::Orientation;
use crate::error::ThumbError;
use crate::ops::{InputFormat, OutputFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    ResetFrame,
    ResetCanvas,
    ApplyProfile,
    TransformColorspace,
    Blur(f32),
    Resize(u32, u32, ResizeFilter),
    Crop(u32, u32, u32, u32),
    Sharpen,
    Depth(u8),
    Flip,
    Flop,
    Rotate(u32),
    Transpose,
    Transverse,
    Normalize,
    Strip,
    AlphaBackground,
    Format(OutputFormat),
    Quality(u8),
    Interlace(Interlace),
    Encode,
}

#[derive(Default)]
struct Shared {
    ops: Mutex<Vec<Recorded>>,
    hint: Mutex<Option<SizeHint>>,
    releases: AtomicUsize,
}

#[derive(Clone)]
pub struct MockEngine {
    width: u32,
    height: u32,
    format: InputFormat,
    orientation: Orientation,
    profile: Option<Vec<u8>>,
    space: ColorSpace,
    alpha: bool,
    prescale: u32,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
    shared: Arc<Shared>,
}

impl MockEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: InputFormat::Jpeg,
            orientation: Orientation::Normal,
            profile: None,
            space: ColorSpace::Srgb,
            alpha: false,
            prescale: 1,
            fail_on: None,
            panic_on: None,
            shared: Arc::default(),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_profile(mut self, profile: Vec<u8>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_gray(mut self) -> Self {
        self.space = ColorSpace::Gray;
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    /// Divide decoded size by `factor` when a hint allows it.
    pub fn with_prescale(mut self, factor: u32) -> Self {
        self.prescale = factor.max(1);
        self
    }

    /// Make the named primitive return an error.
    pub fn fail_on(mut self, primitive: &'static str) -> Self {
        self.fail_on = Some(primitive);
        self
    }

    /// Make the named primitive panic.
    pub fn panic_on(mut self, primitive: &'static str) -> Self {
        self.panic_on = Some(primitive);
        self
    }

    pub fn ops(&self) -> Vec<Recorded> {
        self.shared.ops.lock().clone()
    }

    pub fn last_hint(&self) -> Option<SizeHint> {
        *self.shared.hint.lock()
    }

    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }
}

impl ImageEngine for MockEngine {
    type Canvas = MockCanvas;

    fn probe(&self, _bytes: &[u8]) -> EngineResult<SourceInfo> {
        if self.fail_on == Some("probe") {
            return Err(ThumbError::decode_failed("injected probe failure"));
        }
        Ok(SourceInfo {
            width: self.width,
            height: self.height,
            format: self.format,
            orientation: self.orientation,
        })
    }

    fn decode(&self, _bytes: &[u8], hint: Option<SizeHint>) -> EngineResult<MockCanvas> {
        *self.shared.hint.lock() = hint;
        if self.fail_on == Some("decode") {
            return Err(ThumbError::engine_fault("decode", "injected"));
        }
        if self.panic_on == Some("decode") {
            panic!("injected decode panic");
        }
        let (width, height) = match hint {
            Some(h) if self.prescale > 1 => (
                (self.width / self.prescale).max(h.width),
                (self.height / self.prescale).max(h.height),
            ),
            _ => (self.width, self.height),
        };
        Ok(MockCanvas {
            width,
            height,
            engine: self.clone(),
            space: self.space,
            alpha: self.alpha,
            profile: self.profile.clone(),
        })
    }
}

pub struct MockCanvas {
    width: u32,
    height: u32,
    engine: MockEngine,
    space: ColorSpace,
    alpha: bool,
    profile: Option<Vec<u8>>,
}

impl MockCanvas {
    fn record(&self, primitive: &'static str, op: Recorded) -> EngineResult<()> {
        if self.engine.fail_on == Some(primitive) {
            return Err(ThumbError::engine_fault(primitive, "injected"));
        }
        if self.engine.panic_on == Some(primitive) {
            panic!("injected panic in {primitive}");
        }
        self.engine.shared.ops.lock().push(op);
        Ok(())
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.width, &mut self.height);
    }
}

impl Drop for MockCanvas {
    fn drop(&mut self) {
        self.engine.shared.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Canvas for MockCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn input_format(&self) -> InputFormat {
        self.engine.format
    }

    fn orientation(&self) -> Orientation {
        self.engine.orientation
    }

    fn reset_frame(&mut self) -> EngineResult<()> {
        self.record("reset_frame", Recorded::ResetFrame)
    }

    fn reset_canvas(&mut self) -> EngineResult<()> {
        self.record("reset_canvas", Recorded::ResetCanvas)
    }

    fn profile(&self) -> Option<&[u8]> {
        self.profile.as_deref()
    }

    fn apply_profile(&mut self, _profile: &[u8]) -> EngineResult<()> {
        self.record("apply_profile", Recorded::ApplyProfile)
    }

    fn set_colorspace(&mut self, space: ColorSpace) {
        self.space = space;
    }

    fn colorspace(&self) -> ColorSpace {
        self.space
    }

    fn transform_colorspace(&mut self, space: ColorSpace) -> EngineResult<()> {
        self.record("transform_colorspace", Recorded::TransformColorspace)?;
        self.space = space;
        Ok(())
    }

    fn blur(&mut self, _radius: f32, sigma: f32) -> EngineResult<()> {
        self.record("blur", Recorded::Blur(sigma))
    }

    fn resize(&mut self, width: u32, height: u32, filter: ResizeFilter) -> EngineResult<()> {
        self.record("resize", Recorded::Resize(width, height, filter))?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn crop(&mut self, width: u32, height: u32, x: u32, y: u32) -> EngineResult<()> {
        if x + width > self.width || y + height > self.height {
            return Err(ThumbError::engine_fault("crop", "out of bounds"));
        }
        self.record("crop", Recorded::Crop(width, height, x, y))?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn sharpen(&mut self, _radius: f32, _sigma: f32, _amount: f32, _threshold: f32) -> EngineResult<()> {
        self.record("sharpen", Recorded::Sharpen)
    }

    fn set_depth(&mut self, bits: u8) -> EngineResult<()> {
        self.record("set_depth", Recorded::Depth(bits))
    }

    fn flip(&mut self) -> EngineResult<()> {
        self.record("flip", Recorded::Flip)
    }

    fn flop(&mut self) -> EngineResult<()> {
        self.record("flop", Recorded::Flop)
    }

    fn rotate(&mut self, degrees: u32) -> EngineResult<()> {
        self.record("rotate", Recorded::Rotate(degrees))?;
        if degrees % 180 == 90 {
            self.swap();
        }
        Ok(())
    }

    fn transpose(&mut self) -> EngineResult<()> {
        self.record("transpose", Recorded::Transpose)?;
        self.swap();
        Ok(())
    }

    fn transverse(&mut self) -> EngineResult<()> {
        self.record("transverse", Recorded::Transverse)?;
        self.swap();
        Ok(())
    }

    fn set_orientation(&mut self, _orientation: Orientation) {}

    fn normalize(&mut self) -> EngineResult<()> {
        self.record("normalize", Recorded::Normalize)
    }

    fn strip(&mut self) -> EngineResult<()> {
        self.record("strip", Recorded::Strip)?;
        self.profile = None;
        Ok(())
    }

    fn has_alpha(&self) -> bool {
        self.alpha
    }

    fn set_alpha_background(&mut self) -> EngineResult<()> {
        self.record("set_alpha_background", Recorded::AlphaBackground)
    }

    fn set_format(&mut self, format: OutputFormat) {
        self.engine.shared.ops.lock().push(Recorded::Format(format));
    }

    fn set_quality(&mut self, quality: u8) {
        self.engine.shared.ops.lock().push(Recorded::Quality(quality));
    }

    fn set_interlace(&mut self, interlace: Interlace) {
        self.engine.shared.ops.lock().push(Recorded::Interlace(interlace));
    }

    fn encode(&mut self) -> EngineResult<Vec<u8>> {
        self.record("encode", Recorded::Encode)?;
        Ok(vec![self.width as u8, self.height as u8])
    }
}
