// src/engine/pipeline.rs
//
// Per-request transform pipeline.
//
// Decoded → Normalized → {Resized|Cropped}* → Finalized → Encoded, or Failed.
//
// Plan geometry is computed in logical (upright) space against the nominal
// source size; the canvas stays in physical space until finalize, so every
// engine call goes through the orientation model. The canvas is owned here
// and dropped on encode or on the first failure.

use crate::engine::backend::{Canvas, ColorSpace, ImageEngine, Interlace, ResizeFilter, SizeHint, SourceInfo};
use crate::engine::color::is_reference_srgb;
use crate::engine::encoder::DEFAULT_QUALITY;
use crate::engine::orientation::Orientation;
use crate::error::{OutcomeClass, Result, ThumbError};
use crate::ops::{InputFormat, Operation, OutputFormat, TransformPlan};
use std::fmt;

const LOG_TARGET: &str = "thumbwright::pipeline";

/// Unsharp parameters applied after a real downscale.
const SHARPEN_RADIUS: f32 = 0.0;
const SHARPEN_SIGMA: f32 = 0.8;
const SHARPEN_AMOUNT: f32 = 0.6;
const SHARPEN_THRESHOLD: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Decoded,
    Normalized,
    Resized,
    Cropped,
    Finalized,
    Encoded,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decoded => "Decoded",
            Stage::Normalized => "Normalized",
            Stage::Resized => "Resized",
            Stage::Cropped => "Cropped",
            Stage::Finalized => "Finalized",
            Stage::Encoded => "Encoded",
            Stage::Failed => "Failed",
        }
    }

    fn accepts_ops(&self) -> bool {
        matches!(self, Stage::Normalized | Stage::Resized | Stage::Cropped)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering knobs the pipeline reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineOptions {
    /// Pre-resize blur strength; 0 disables
    pub blur_factor: f64,
    pub sharpen: bool,
    pub auto_contrast: bool,
    pub jpeg_quality: u8,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            blur_factor: 0.0,
            sharpen: true,
            auto_contrast: false,
            jpeg_quality: 85,
        }
    }
}

/// Encoded output plus what callers need to serve it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub input_format: InputFormat,
    pub output_format: OutputFormat,
}

/// Largest size with the aspect ratio of `src` that fits inside `bounds`,
/// never larger than `src`.
pub fn fit_inside(src: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = src;
    if sw == 0 || sh == 0 {
        return src;
    }
    let scale = (bounds.0 as f64 / sw as f64).min(bounds.1 as f64 / sh as f64);
    if scale >= 1.0 {
        return src;
    }
    (
        ((sw as f64 * scale).round() as u32).max(1),
        ((sh as f64 * scale).round() as u32).max(1),
    )
}

/// Smallest size with the aspect ratio of `src` that covers `bounds`.
/// `bounds` must already be clamped to `src`.
pub fn cover(src: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (src.0 as u64, src.1 as u64);
    let (bw, bh) = (bounds.0 as u64, bounds.1 as u64);
    if sw == 0 || sh == 0 {
        return src;
    }
    // Compare bw/sw against bh/sh without floats
    if bw * sh >= bh * sw {
        (bounds.0, (sh * bw).div_ceil(sw) as u32)
    } else {
        ((sw * bh).div_ceil(sh) as u32, bounds.1)
    }
}

/// Lanczos only when both axes shrink by more than 2.5%.
pub fn select_filter(current: (u32, u32), target: (u32, u32)) -> ResizeFilter {
    let (cw, ch) = current;
    let (tw, th) = target;
    if tw < cw - cw / 40 && th < ch - ch / 40 {
        ResizeFilter::Lanczos
    } else {
        ResizeFilter::Triangle
    }
}

/// Top-left of a centered `crop` inside `container`; the odd pixel of an
/// uneven margin comes off the leading edge.
pub fn center_offset(container: (u32, u32), crop: (u32, u32)) -> (u32, u32) {
    (
        (container.0 - crop.0 + 1) / 2,
        (container.1 - crop.1 + 1) / 2,
    )
}

/// One in-flight transformation.
pub struct Pipeline<C: Canvas> {
    canvas: Option<C>,
    stage: Stage,
    options: PipelineOptions,
    input_format: InputFormat,
    orientation: Orientation,
    /// Upright size declared by the source header
    nominal: (u32, u32),
    /// Upright size the plan geometry works from
    logical: (u32, u32),
    /// Upright size of the pixels actually held
    working: (u32, u32),
    /// Upright decode target, when the plan allowed one
    hint: Option<(u32, u32)>,
    shrank: bool,
}

impl<C: Canvas> Pipeline<C> {
    /// Decode `bytes` and reset it to a single frame at the origin.
    ///
    /// `scale_box` is the requested box of the plan's leading scale; its
    /// fitted size becomes the decoder hint.
    pub fn decode<E>(
        engine: &E,
        bytes: &[u8],
        info: &SourceInfo,
        scale_box: Option<(u32, u32)>,
        options: PipelineOptions,
    ) -> Result<Self>
    where
        E: ImageEngine<Canvas = C> + ?Sized,
    {
        let nominal = info.orientation.dimensions(info.width, info.height);
        let hint = scale_box.map(|b| fit_inside(nominal, b));
        let size_hint = hint.map(|(w, h)| {
            let (width, height) = info.orientation.dimensions(w, h);
            SizeHint { width, height }
        });

        let mut canvas = engine.decode(bytes, size_hint).map_err(|err| match err.class() {
            OutcomeClass::Internal => ThumbError::decode_failed(err.to_string()),
            _ => err,
        })?;

        let (w, h) = canvas.dimensions();
        if w == 0 || h == 0 {
            return Err(ThumbError::corrupted_image());
        }

        let orientation = canvas.orientation();
        let setup = canvas.reset_frame().and_then(|_| canvas.reset_canvas());
        if let Err(err) = setup {
            return Err(internal("decode", err));
        }

        tracing::debug!(
            target: LOG_TARGET,
            format = %canvas.input_format(),
            nominal_w = nominal.0,
            nominal_h = nominal.1,
            decoded_w = w,
            decoded_h = h,
            ?orientation,
            "decoded"
        );

        Ok(Self {
            input_format: canvas.input_format(),
            canvas: Some(canvas),
            stage: Stage::Decoded,
            options,
            orientation,
            nominal,
            logical: nominal,
            working: orientation.dimensions(w, h),
            hint,
            shrank: false,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current upright working size.
    pub fn dimensions(&self) -> (u32, u32) {
        self.working
    }

    pub fn shrank(&self) -> bool {
        self.shrank
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Bring pixels into sRGB, record working size, apply the pre-resize blur.
    pub fn normalize(&mut self) -> Result<()> {
        self.step("normalize", |s| s.stage == Stage::Decoded, |s| s.normalize_inner())?;
        self.stage = Stage::Normalized;
        Ok(())
    }

    fn normalize_inner(&mut self) -> Result<()> {
        let canvas = self.canvas_mut()?;
        let profile = canvas.profile().map(|p| p.to_vec());
        match profile {
            Some(icc) if is_reference_srgb(&icc) => canvas.set_colorspace(ColorSpace::Srgb),
            Some(icc) => match canvas.apply_profile(&icc) {
                Ok(()) => canvas.set_colorspace(ColorSpace::Srgb),
                Err(err) => {
                    tracing::warn!(target: "thumbwright::color", error = %err, "embedded profile not applied, converting directly");
                    if canvas.colorspace() != ColorSpace::Srgb {
                        canvas.transform_colorspace(ColorSpace::Srgb)?;
                    }
                }
            },
            None if canvas.colorspace() != ColorSpace::Srgb => {
                canvas.transform_colorspace(ColorSpace::Srgb)?
            }
            None => {}
        }

        let (w, h) = canvas.dimensions();
        self.working = self.orientation.dimensions(w, h);
        self.shrank = self.working.0 < self.nominal.0 && self.working.1 < self.nominal.1;

        if let Some((hw, hh)) = self.hint {
            if self.options.blur_factor > 0.0 && self.nominal.0 > hw && self.nominal.1 > hh {
                let sigma = self.options.blur_factor * (self.working.0 as f64 / hw as f64);
                tracing::debug!(target: LOG_TARGET, sigma, "pre-resize blur");
                self.canvas_mut()?.blur(0.0, sigma as f32)?;
            }
        }
        Ok(())
    }

    /// Apply one plan operation.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        let stage = self.step(op.name(), |s| s.stage.accepts_ops(), |s| match *op {
            Operation::Scale { width, height } | Operation::PreviewScale { width, height } => {
                s.scale(width, height).map(|_| Stage::Resized)
            }
            Operation::Crop { width, height } => s.crop(width, height).map(|_| Stage::Cropped),
        })?;
        self.stage = stage;
        Ok(())
    }

    fn scale(&mut self, width: u32, height: u32) -> Result<()> {
        let target = fit_inside(self.logical, (width, height));
        self.resize_to(target)
    }

    /// Resize to an upright `target`; a no-op when the pixels already match.
    fn resize_to(&mut self, target: (u32, u32)) -> Result<()> {
        if target != self.working {
            let filter = select_filter(self.working, target);
            let (pw, ph) = self.orientation.dimensions(target.0, target.1);
            tracing::debug!(
                target: LOG_TARGET,
                from_w = self.working.0,
                from_h = self.working.1,
                to_w = target.0,
                to_h = target.1,
                ?filter,
                "resize"
            );
            self.canvas_mut()?.resize(pw, ph, filter)?;
            self.working = target;
            self.shrank = filter == ResizeFilter::Lanczos;
        }
        self.logical = target;
        Ok(())
    }

    fn crop(&mut self, width: u32, height: u32) -> Result<()> {
        let bounds = (width.min(self.logical.0), height.min(self.logical.1));
        let covering = cover(self.logical, bounds);
        if covering != self.logical {
            self.resize_to(covering)?;
        }

        let container = self.working;
        let bounds = (bounds.0.min(container.0), bounds.1.min(container.1));
        if bounds == container {
            return Ok(());
        }
        let (x, y) = center_offset(container, bounds);
        let (pw, ph, px, py) =
            self.orientation
                .crop(bounds.0, bounds.1, x, y, container.0, container.1);
        tracing::debug!(target: LOG_TARGET, w = bounds.0, h = bounds.1, x, y, "crop");
        self.canvas_mut()?.crop(pw, ph, px, py)?;
        self.working = bounds;
        self.logical = bounds;
        Ok(())
    }

    /// Sharpen, force 8-bit, make upright, strip, and tidy alpha.
    pub fn finalize(&mut self) -> Result<()> {
        self.step("finalize", |s| s.stage.accepts_ops(), |s| {
            let sharpen = s.shrank && s.options.sharpen;
            let auto_contrast = s.options.auto_contrast;
            let orientation = s.orientation;
            let canvas = s.canvas_mut()?;
            if sharpen {
                canvas.sharpen(SHARPEN_RADIUS, SHARPEN_SIGMA, SHARPEN_AMOUNT, SHARPEN_THRESHOLD)?;
            }
            canvas.set_depth(8)?;
            orientation.fix(canvas)?;
            if auto_contrast {
                canvas.normalize()?;
            }
            canvas.strip()?;
            if canvas.has_alpha() {
                canvas.set_alpha_background()?;
            }
            s.orientation = Orientation::Normal;
            Ok(())
        })?;
        self.stage = Stage::Finalized;
        Ok(())
    }

    /// Encode and release the canvas.
    pub fn encode(&mut self) -> Result<Thumbnail> {
        let thumbnail = self.step("encode", |s| s.stage == Stage::Finalized, |s| {
            let output_format = OutputFormat::for_input(s.input_format);
            let quality = match output_format {
                OutputFormat::Jpeg => s.options.jpeg_quality,
                _ => DEFAULT_QUALITY,
            };
            let canvas = s.canvas_mut()?;
            canvas.set_format(output_format);
            canvas.set_quality(quality);
            canvas.set_interlace(Interlace::Line);
            let bytes = canvas.encode()?;
            let (width, height) = canvas.dimensions();
            Ok(Thumbnail {
                bytes,
                width,
                height,
                input_format: s.input_format,
                output_format,
            })
        })?;
        self.canvas = None;
        self.stage = Stage::Encoded;
        tracing::debug!(
            target: LOG_TARGET,
            width = thumbnail.width,
            height = thumbnail.height,
            bytes = thumbnail.bytes.len(),
            format = %thumbnail.output_format,
            "encoded"
        );
        Ok(thumbnail)
    }

    /// Run every remaining step for `plan`.
    pub fn execute(mut self, plan: &TransformPlan) -> Result<Thumbnail> {
        self.normalize()?;
        for op in plan.ops() {
            self.apply(op)?;
        }
        self.finalize()?;
        self.encode()
    }

    fn canvas_mut(&mut self) -> Result<&mut C> {
        let stage = self.stage;
        self.canvas
            .as_mut()
            .ok_or_else(|| ThumbError::invalid_state("canvas", stage.as_str()))
    }

    /// Gate a step on the stage and turn any failure into a terminal one.
    fn step<T>(
        &mut self,
        name: &'static str,
        allowed: impl FnOnce(&Self) -> bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if !allowed(self) {
            return Err(ThumbError::invalid_state(name, self.stage.as_str()));
        }
        f(self).map_err(|err| {
            tracing::warn!(target: LOG_TARGET, step = name, error = %err, "pipeline step failed");
            self.stage = Stage::Failed;
            self.canvas = None;
            internal(name, err)
        })
    }
}

/// Failures after a successful decode are engine faults.
fn internal(step: &'static str, err: ThumbError) -> ThumbError {
    match err.class() {
        OutcomeClass::Internal => err,
        _ => ThumbError::engine_fault(step, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, Recorded};

    fn info(width: u32, height: u32) -> SourceInfo {
        SourceInfo {
            width,
            height,
            format: InputFormat::Jpeg,
            orientation: Orientation::Normal,
        }
    }

    fn run(engine: &MockEngine, info: &SourceInfo, plan: &str) -> Result<Thumbnail> {
        let plan = TransformPlan::parse(plan).unwrap();
        Pipeline::decode(engine, b"src", info, plan.scale_hint(), PipelineOptions::default())?
            .execute(&plan)
    }

    #[test]
    fn test_fit_inside() {
        assert_eq!(fit_inside((370, 500), (100, 100)), (74, 100));
        assert_eq!(fit_inside((2, 3), (2048, 2048)), (2, 3));
        assert_eq!(fit_inside((1000, 500), (100, 100)), (100, 50));
        assert_eq!(fit_inside((100, 100), (100, 100)), (100, 100));
        assert_eq!(fit_inside((5000, 10), (16, 16)), (16, 1));
    }

    #[test]
    fn test_cover() {
        assert_eq!(cover((400, 300), (200, 100)), (200, 150));
        assert_eq!(cover((300, 400), (200, 100)), (200, 267));
        assert_eq!(cover((400, 300), (400, 300)), (400, 300));
        assert_eq!(cover((1000, 10), (16, 10)), (1000, 10));
    }

    #[test]
    fn test_select_filter_table() {
        // 2.5% of 400 is 10
        assert_eq!(select_filter((400, 400), (390, 390)), ResizeFilter::Triangle);
        assert_eq!(select_filter((400, 400), (389, 389)), ResizeFilter::Lanczos);
        assert_eq!(select_filter((400, 400), (389, 400)), ResizeFilter::Triangle);
        assert_eq!(select_filter((400, 400), (800, 800)), ResizeFilter::Triangle);
        assert_eq!(select_filter((400, 400), (100, 50)), ResizeFilter::Lanczos);
    }

    #[test]
    fn test_center_offset() {
        assert_eq!(center_offset((10, 10), (6, 6)), (2, 2));
        assert_eq!(center_offset((11, 10), (6, 6)), (3, 2));
        assert_eq!(center_offset((6, 6), (6, 6)), (0, 0));
    }

    #[test]
    fn test_scale_resizes_with_lanczos_and_sharpens() {
        let engine = MockEngine::new(400, 300);
        let thumb = run(&engine, &info(400, 300), "=s100x100").unwrap();
        assert_eq!((thumb.width, thumb.height), (100, 75));
        let ops = engine.ops();
        assert!(ops.contains(&Recorded::Resize(100, 75, ResizeFilter::Lanczos)));
        assert!(ops.iter().any(|o| matches!(o, Recorded::Sharpen)));
        assert!(ops.contains(&Recorded::Interlace(Interlace::Line)));
        assert!(ops.contains(&Recorded::Quality(85)));
        assert_eq!(engine.releases(), 1);
    }

    #[test]
    fn test_no_upscale_and_no_resize_when_unchanged() {
        let engine = MockEngine::new(2, 3);
        let thumb = run(&engine, &info(2, 3), "=s2048x2048").unwrap();
        assert_eq!((thumb.width, thumb.height), (2, 3));
        assert!(!engine.ops().iter().any(|o| matches!(o, Recorded::Resize(..))));
        assert!(!engine.ops().iter().any(|o| matches!(o, Recorded::Sharpen)));
    }

    #[test]
    fn test_crop_covers_then_centers() {
        let engine = MockEngine::new(400, 300);
        let thumb = run(&engine, &info(400, 300), "=c200x100").unwrap();
        assert_eq!((thumb.width, thumb.height), (200, 100));
        let ops = engine.ops();
        assert!(ops.contains(&Recorded::Resize(200, 150, ResizeFilter::Lanczos)));
        assert!(ops.contains(&Recorded::Crop(200, 100, 0, 25)));
    }

    #[test]
    fn test_crop_keeps_shrank_flag() {
        // No resize needed, so nothing shrank and nothing is sharpened
        let engine = MockEngine::new(200, 101);
        run(&engine, &info(200, 101), "=c200x100").unwrap();
        let ops = engine.ops();
        assert!(ops.contains(&Recorded::Crop(200, 100, 0, 1)));
        assert!(!ops.iter().any(|o| matches!(o, Recorded::Sharpen)));
    }

    #[test]
    fn test_crop_through_rotation() {
        // Stored 300x400, displayed 400x300
        let engine = MockEngine::new(300, 400).with_orientation(Orientation::Rotate90);
        let src = SourceInfo {
            orientation: Orientation::Rotate90,
            ..info(300, 400)
        };
        let thumb = run(&engine, &src, "=c200x100").unwrap();
        assert_eq!((thumb.width, thumb.height), (200, 100));
        let ops = engine.ops();
        // Physical resize is the swapped cover size
        assert!(ops.contains(&Recorded::Resize(150, 200, ResizeFilter::Lanczos)));
        // Logical (0,25) 200x100 in 200x150 → physical (25,0) 100x200
        assert!(ops.contains(&Recorded::Crop(100, 200, 25, 0)));
        assert!(ops.contains(&Recorded::Rotate(90)));
    }

    #[test]
    fn test_hint_is_physical_and_prescale_marks_shrank() {
        let engine = MockEngine::new(800, 600)
            .with_orientation(Orientation::Rotate270)
            .with_prescale(4);
        let src = SourceInfo {
            orientation: Orientation::Rotate270,
            ..info(800, 600)
        };
        let plan = TransformPlan::parse("=s75x100").unwrap();
        let mut p = Pipeline::decode(&engine, b"src", &src, plan.scale_hint(), PipelineOptions::default()).unwrap();
        // Upright 600x800 fits 75x100; physical hint swaps back
        assert_eq!(engine.last_hint(), Some(SizeHint { width: 100, height: 75 }));
        p.normalize().unwrap();
        assert_eq!(p.dimensions(), (150, 200));
        assert!(p.shrank());
    }

    #[test]
    fn test_crop_before_scale_disables_hint() {
        let engine = MockEngine::new(800, 600).with_prescale(4);
        run(&engine, &info(800, 600), "=c300x300=s100x100").unwrap();
        assert_eq!(engine.last_hint(), None);
    }

    #[test]
    fn test_blur_keys_off_nominal_size() {
        let engine = MockEngine::new(800, 600).with_prescale(2);
        let plan = TransformPlan::parse("=s100x100").unwrap();
        let options = PipelineOptions {
            blur_factor: 0.5,
            ..PipelineOptions::default()
        };
        let mut p = Pipeline::decode(&engine, b"src", &info(800, 600), plan.scale_hint(), options).unwrap();
        p.normalize().unwrap();
        // working 400 / hint 100 * 0.5
        assert!(engine.ops().contains(&Recorded::Blur(2.0)));
    }

    #[test]
    fn test_color_paths_are_exclusive() {
        let srgb = crate::engine::color::tests::srgb_icc();
        let other = crate::engine::color::tests::display_p3_icc();

        let engine = MockEngine::new(64, 64).with_profile(srgb);
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        let ops = engine.ops();
        assert!(!ops.iter().any(|o| matches!(o, Recorded::ApplyProfile | Recorded::TransformColorspace)));

        let engine = MockEngine::new(64, 64).with_profile(other.clone());
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        let ops = engine.ops();
        assert!(ops.contains(&Recorded::ApplyProfile));
        assert!(!ops.contains(&Recorded::TransformColorspace));

        let engine = MockEngine::new(64, 64).with_gray();
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        let ops = engine.ops();
        assert!(!ops.contains(&Recorded::ApplyProfile));
        assert!(ops.contains(&Recorded::TransformColorspace));

        // Failed profile falls back to the direct path
        let engine = MockEngine::new(64, 64).with_profile(other).with_gray().fail_on("apply_profile");
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        assert!(engine.ops().contains(&Recorded::TransformColorspace));
    }

    #[test]
    fn test_decode_failure_is_unsupported_and_releases_nothing() {
        let engine = MockEngine::new(64, 64).fail_on("decode");
        let err = run(&engine, &info(64, 64), "=s32x32").unwrap_err();
        assert_eq!(err.class(), OutcomeClass::UnsupportedMedia);
        assert_eq!(engine.releases(), 0);
    }

    #[test]
    fn test_mid_pipeline_failure_is_internal_and_releases_once() {
        for step in ["resize", "crop", "sharpen", "encode", "strip"] {
            let engine = MockEngine::new(400, 300).fail_on(step);
            let err = run(&engine, &info(400, 300), "=c200x100").unwrap_err();
            assert_eq!(err.class(), OutcomeClass::Internal, "{step}");
            assert_eq!(engine.releases(), 1, "{step}");
        }
    }

    #[test]
    fn test_failed_pipeline_rejects_further_steps() {
        let engine = MockEngine::new(400, 300).fail_on("resize");
        let plan = TransformPlan::parse("=s100x100").unwrap();
        let mut p = Pipeline::decode(&engine, b"src", &info(400, 300), None, PipelineOptions::default()).unwrap();
        p.normalize().unwrap();
        assert!(p.apply(&plan.ops()[0]).is_err());
        assert_eq!(p.stage(), Stage::Failed);
        assert_eq!(engine.releases(), 1);

        let calls = engine.ops().len();
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, ThumbError::InvalidState { .. }));
        assert!(p.encode().is_err());
        assert_eq!(engine.ops().len(), calls);
        assert_eq!(engine.releases(), 1);
    }

    #[test]
    fn test_steps_out_of_order_are_invalid() {
        let engine = MockEngine::new(64, 64);
        let mut p = Pipeline::decode(&engine, b"src", &info(64, 64), None, PipelineOptions::default()).unwrap();
        let op = Operation::Scale { width: 32, height: 32 };
        assert!(matches!(p.apply(&op), Err(ThumbError::InvalidState { .. })));
        assert!(matches!(p.encode(), Err(ThumbError::InvalidState { .. })));
    }

    #[test]
    fn test_encode_settings_follow_input() {
        let engine = MockEngine::new(64, 64).with_format(InputFormat::Gif);
        let thumb = run(&engine, &info(64, 64), "=s32x32").unwrap();
        assert_eq!(thumb.output_format, OutputFormat::Png);
        assert!(engine.ops().contains(&Recorded::Quality(DEFAULT_QUALITY)));
    }

    #[test]
    fn test_finalize_order_with_auto_contrast() {
        let engine = MockEngine::new(300, 400)
            .with_orientation(Orientation::Rotate90)
            .with_alpha();
        let src = SourceInfo {
            orientation: Orientation::Rotate90,
            ..info(300, 400)
        };
        let plan = TransformPlan::parse("=s100x100").unwrap();
        let options = PipelineOptions {
            auto_contrast: true,
            ..PipelineOptions::default()
        };
        Pipeline::decode(&engine, b"src", &src, plan.scale_hint(), options)
            .unwrap()
            .execute(&plan)
            .unwrap();

        let ops = engine.ops();
        let start = ops.iter().position(|o| *o == Recorded::Sharpen).unwrap();
        assert_eq!(
            &ops[start..start + 6],
            &[
                Recorded::Sharpen,
                Recorded::Depth(8),
                Recorded::Rotate(90),
                Recorded::Normalize,
                Recorded::Strip,
                Recorded::AlphaBackground,
            ]
        );

        // Auto-contrast is off by default
        let engine = MockEngine::new(300, 400).with_orientation(Orientation::Rotate90);
        run(&engine, &src, "=s100x100").unwrap();
        assert!(!engine.ops().contains(&Recorded::Normalize));
    }

    #[test]
    fn test_alpha_background_only_with_alpha() {
        let engine = MockEngine::new(64, 64).with_alpha();
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        assert!(engine.ops().contains(&Recorded::AlphaBackground));

        let engine = MockEngine::new(64, 64);
        run(&engine, &info(64, 64), "=s32x32").unwrap();
        assert!(!engine.ops().contains(&Recorded::AlphaBackground));
    }
}
