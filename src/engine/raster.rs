// src/engine/raster.rs
//
// Production image engine: image-crate buffers driven by the codec, resize
// and color modules.

use crate::engine::backend::{
    Canvas, ColorSpace, ImageEngine, Interlace, ResizeFilter, SizeHint, SourceInfo,
};
use crate::engine::color;
use crate::engine::common::EngineResult;
use crate::engine::decoder;
use crate::engine::encoder::{self, EncodeSettings};
use crate::engine::io::extract_icc_profile;
use crate::engine::limits::Limits;
use crate::engine::orientation::Orientation;
use crate::engine::resize;
use crate::error::ThumbError;
use crate::ops::{InputFormat, OutputFormat};
use image::{imageops, DynamicImage, GenericImageView, ImageBuffer, Pixel};

/// Background written under fully transparent pixels.
const ALPHA_BACKGROUND: u8 = 0xFF;

/// Fraction of darkest / brightest samples clipped by `normalize`.
const NORMALIZE_BLACK_POINT: f64 = 0.02;
const NORMALIZE_WHITE_POINT: f64 = 0.01;

#[derive(Clone, Debug, Default)]
pub struct RasterEngine {
    limits: Limits,
}

impl RasterEngine {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl ImageEngine for RasterEngine {
    type Canvas = RasterCanvas;

    fn probe(&self, bytes: &[u8]) -> EngineResult<SourceInfo> {
        decoder::probe(bytes)
    }

    fn decode(&self, bytes: &[u8], hint: Option<SizeHint>) -> EngineResult<RasterCanvas> {
        let format = decoder::detect_format(bytes)?;
        let img = decoder::decode(bytes, format, hint, &self.limits)?;
        let orientation = decoder::detect_exif_orientation(bytes)
            .map(Orientation::from_exif)
            .unwrap_or_default();
        Ok(RasterCanvas::new(img, format, orientation, extract_icc_profile(bytes)))
    }
}

/// A decoded first frame plus the state the engine tracks alongside it.
pub struct RasterCanvas {
    img: DynamicImage,
    format: InputFormat,
    orientation: Orientation,
    icc: Option<Vec<u8>>,
    space: ColorSpace,
    settings: EncodeSettings,
}

impl RasterCanvas {
    pub fn new(
        img: DynamicImage,
        format: InputFormat,
        orientation: Orientation,
        icc: Option<Vec<u8>>,
    ) -> Self {
        let space = if img.color().has_color() {
            ColorSpace::Srgb
        } else {
            ColorSpace::Gray
        };
        Self {
            img,
            format,
            orientation,
            icc,
            space,
            settings: EncodeSettings {
                format: OutputFormat::for_input(format),
                ..EncodeSettings::default()
            },
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.img
    }

    fn replace(&mut self, f: impl FnOnce(DynamicImage) -> EngineResult<DynamicImage>) -> EngineResult<()> {
        let img = std::mem::replace(&mut self.img, DynamicImage::new_rgb8(0, 0));
        self.img = f(img)?;
        Ok(())
    }
}

impl Canvas for RasterCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.img.dimensions()
    }

    fn input_format(&self) -> InputFormat {
        self.format
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    // Decoders only ever produce frame 0.
    fn reset_frame(&mut self) -> EngineResult<()> {
        Ok(())
    }

    // image-crate buffers have no page offset.
    fn reset_canvas(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn profile(&self) -> Option<&[u8]> {
        self.icc.as_deref()
    }

    fn apply_profile(&mut self, profile: &[u8]) -> EngineResult<()> {
        color::apply_profile_to_srgb(&mut self.img, profile)
    }

    fn set_colorspace(&mut self, space: ColorSpace) {
        self.space = space;
    }

    fn colorspace(&self) -> ColorSpace {
        self.space
    }

    fn transform_colorspace(&mut self, space: ColorSpace) -> EngineResult<()> {
        let has_alpha = self.img.color().has_alpha();
        self.replace(|img| {
            Ok(match (space, has_alpha) {
                (ColorSpace::Srgb, true) => DynamicImage::ImageRgba8(img.to_rgba8()),
                (ColorSpace::Srgb, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
                (ColorSpace::Gray, true) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
                (ColorSpace::Gray, false) => DynamicImage::ImageLuma8(img.to_luma8()),
            })
        })?;
        self.space = space;
        Ok(())
    }

    fn blur(&mut self, _radius: f32, sigma: f32) -> EngineResult<()> {
        if sigma > 0.0 {
            self.img = self.img.blur(sigma);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, filter: ResizeFilter) -> EngineResult<()> {
        self.replace(|img| resize::resize_owned(img, width, height, filter))
    }

    fn crop(&mut self, width: u32, height: u32, x: u32, y: u32) -> EngineResult<()> {
        let (w, h) = self.img.dimensions();
        let fits = width > 0
            && height > 0
            && x.checked_add(width).is_some_and(|r| r <= w)
            && y.checked_add(height).is_some_and(|b| b <= h);
        if !fits {
            return Err(ThumbError::engine_fault(
                "crop",
                format!("box {width}x{height}+{x}+{y} outside {w}x{h}"),
            ));
        }
        self.img = self.img.crop_imm(x, y, width, height);
        Ok(())
    }

    fn sharpen(&mut self, _radius: f32, sigma: f32, amount: f32, threshold: f32) -> EngineResult<()> {
        self.img = unsharp_mask(&self.img, sigma, amount, threshold);
        Ok(())
    }

    fn set_depth(&mut self, bits: u8) -> EngineResult<()> {
        if bits != 8 {
            return Err(ThumbError::engine_fault("depth", format!("unsupported depth {bits}")));
        }
        self.replace(|img| {
            Ok(match img {
                img @ (DynamicImage::ImageLuma8(_)
                | DynamicImage::ImageLumaA8(_)
                | DynamicImage::ImageRgb8(_)
                | DynamicImage::ImageRgba8(_)) => img,
                DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
                DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
                other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            })
        })
    }

    fn flip(&mut self) -> EngineResult<()> {
        self.img = self.img.flipv();
        Ok(())
    }

    fn flop(&mut self) -> EngineResult<()> {
        self.img = self.img.fliph();
        Ok(())
    }

    fn rotate(&mut self, degrees: u32) -> EngineResult<()> {
        self.img = match degrees % 360 {
            0 => return Ok(()),
            90 => self.img.rotate90(),
            180 => self.img.rotate180(),
            270 => self.img.rotate270(),
            other => {
                return Err(ThumbError::engine_fault(
                    "rotate",
                    format!("{other} is not a multiple of 90"),
                ))
            }
        };
        Ok(())
    }

    fn transpose(&mut self) -> EngineResult<()> {
        self.img = self.img.rotate90().fliph();
        Ok(())
    }

    fn transverse(&mut self) -> EngineResult<()> {
        self.img = self.img.rotate270().fliph();
        Ok(())
    }

    fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    fn normalize(&mut self) -> EngineResult<()> {
        normalize_contrast(&mut self.img);
        Ok(())
    }

    fn strip(&mut self) -> EngineResult<()> {
        self.icc = None;
        Ok(())
    }

    fn has_alpha(&self) -> bool {
        self.img.color().has_alpha()
    }

    fn set_alpha_background(&mut self) -> EngineResult<()> {
        match &mut self.img {
            DynamicImage::ImageRgba8(rgba) => {
                for px in rgba.pixels_mut().filter(|p| p.0[3] == 0) {
                    px.0 = [ALPHA_BACKGROUND, ALPHA_BACKGROUND, ALPHA_BACKGROUND, 0];
                }
            }
            DynamicImage::ImageLumaA8(la) => {
                for px in la.pixels_mut().filter(|p| p.0[1] == 0) {
                    px.0 = [ALPHA_BACKGROUND, 0];
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn set_format(&mut self, format: OutputFormat) {
        self.settings.format = format;
    }

    fn set_quality(&mut self, quality: u8) {
        self.settings.quality = quality;
    }

    fn set_interlace(&mut self, interlace: Interlace) {
        self.settings.interlace = interlace;
    }

    fn encode(&mut self) -> EngineResult<Vec<u8>> {
        encoder::encode(&self.img, &self.settings)
    }
}

/// Unsharp mask at a fractional strength. `imageops::unsharpen` applies the
/// whole difference, so the result is blended back towards the source by
/// `amount`. `threshold` is a fraction of full scale. Alpha untouched.
fn unsharp_mask(img: &DynamicImage, sigma: f32, amount: f32, threshold: f32) -> DynamicImage {
    let sigma = sigma.max(0.1);
    let threshold = (threshold * 255.0).round() as i32;
    match img {
        DynamicImage::ImageRgb8(b) => DynamicImage::ImageRgb8(sharpen_buffer(b, sigma, amount, threshold)),
        DynamicImage::ImageRgba8(b) => DynamicImage::ImageRgba8(sharpen_buffer(b, sigma, amount, threshold)),
        DynamicImage::ImageLuma8(b) => DynamicImage::ImageLuma8(sharpen_buffer(b, sigma, amount, threshold)),
        DynamicImage::ImageLumaA8(b) => DynamicImage::ImageLumaA8(sharpen_buffer(b, sigma, amount, threshold)),
        // Depth is forced to 8 bits before sharpening; other layouts pass through.
        _ => img.clone(),
    }
}

fn sharpen_buffer<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    sigma: f32,
    amount: f32,
    threshold: i32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let mut out = imageops::unsharpen(src, sigma, threshold);
    let alpha = P::HAS_ALPHA.then_some(usize::from(P::CHANNEL_COUNT) - 1);
    for (sharp, orig) in out.pixels_mut().zip(src.pixels()) {
        for (c, (v, &o)) in sharp.channels_mut().iter_mut().zip(orig.channels()).enumerate() {
            *v = if Some(c) == alpha {
                o
            } else {
                (o as f32 + amount * (*v as f32 - o as f32)).round().clamp(0.0, 255.0) as u8
            };
        }
    }
    out
}

/// Stretch color samples so the darkest 2% map to 0 and the brightest 1% to 255.
fn normalize_contrast(img: &mut DynamicImage) {
    let (channels, samples): (usize, &mut [u8]) = match img {
        DynamicImage::ImageRgb8(b) => (3, &mut **b),
        DynamicImage::ImageRgba8(b) => (4, &mut **b),
        DynamicImage::ImageLuma8(b) => (1, &mut **b),
        DynamicImage::ImageLumaA8(b) => (2, &mut **b),
        _ => return,
    };
    let color = if channels == 4 || channels == 2 {
        channels - 1
    } else {
        channels
    };

    let mut histogram = [0u64; 256];
    for px in samples.chunks_exact(channels) {
        for &v in &px[..color] {
            histogram[v as usize] += 1;
        }
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return;
    }

    let black_cut = (total as f64 * NORMALIZE_BLACK_POINT) as u64;
    let white_cut = (total as f64 * NORMALIZE_WHITE_POINT) as u64;
    let mut seen = 0u64;
    let low = histogram
        .iter()
        .position(|&n| {
            seen += n;
            seen > black_cut
        })
        .unwrap_or(0);
    seen = 0;
    let high = 255
        - histogram
            .iter()
            .rev()
            .position(|&n| {
                seen += n;
                seen > white_cut
            })
            .unwrap_or(0);
    if high <= low {
        return;
    }

    let scale = 255.0 / (high - low) as f32;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = ((v as f32 - low as f32) * scale).round().clamp(0.0, 255.0) as u8;
    }
    for px in samples.chunks_exact_mut(channels) {
        for v in &mut px[..color] {
            *v = lut[*v as usize];
        }
    }
}
