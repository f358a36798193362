// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp).
// Outputs never carry an embedded profile; pixels are sRGB by then.

use crate::engine::backend::Interlace;
use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::error::ThumbError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Quality used for every format except JPEG.
pub const DEFAULT_QUALITY: u8 = 95;

/// Everything the encoder needs besides the pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    pub format: OutputFormat,
    pub quality: u8,
    pub interlace: Interlace,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: DEFAULT_QUALITY,
            interlace: Interlace::None,
        }
    }
}

pub fn encode(img: &DynamicImage, settings: &EncodeSettings) -> EngineResult<Vec<u8>> {
    match settings.format {
        OutputFormat::Jpeg => encode_jpeg(
            img,
            settings.quality,
            settings.interlace == Interlace::Line,
        ),
        OutputFormat::Png => encode_png(img),
        OutputFormat::WebP => encode_webp(img, settings.quality),
    }
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8, progressive: bool) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.clamp(1, 100);

        // Avoid a copy when already RGB8
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        if w == 0 || h == 0 {
            return Err(ThumbError::encode_failed("jpeg", "zero-sized image"));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_optimize_coding(true);
        if progressive {
            comp.set_progressive_mode();
            comp.set_optimize_scans(true);
            comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        }

        let mut output = Vec::with_capacity((w as usize * h as usize * 3 / 10).max(4096));
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ThumbError::encode_failed("jpeg", format!("failed to start compress: {e:?}"))
            })?;
            for row in rgb.as_raw().chunks(w as usize * 3) {
                writer.write_scanlines(row).map_err(|e| {
                    ThumbError::encode_failed("jpeg", format!("failed to write scanlines: {e:?}"))
                })?;
            }
            writer
                .finish()
                .map_err(|e| ThumbError::encode_failed("jpeg", format!("failed to finish: {e:?}")))?;
        }
        Ok(output)
    })
}

/// Lossless; the image crate writes the stream and oxipng recompresses it.
pub fn encode_png(img: &DynamicImage) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ThumbError::encode_failed("png", e.to_string()))?;

        let mut options = oxipng::Options::from_preset(2);
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(&buf, &options)
            .map_err(|e| ThumbError::encode_failed("png", format!("oxipng: {e}")))
    })
}

pub fn encode_webp(img: &DynamicImage, quality: u8) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ThumbError::encode_failed("webp", "failed to create WebPConfig"))?;
        config.quality = quality.min(100) as f32;
        config.method = 4;

        let encoded = if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            webp::Encoder::from_rgba(&rgba, w, h).encode_advanced(&config)
        } else {
            let rgb: Cow<'_, image::RgbImage> = match img {
                DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                _ => Cow::Owned(img.to_rgb8()),
            };
            let (w, h) = rgb.dimensions();
            webp::Encoder::from_rgb(&rgb, w, h).encode_advanced(&config)
        };
        let mem = encoded.map_err(|e| ThumbError::encode_failed("webp", format!("{e:?}")))?;

        Ok(mem.to_vec())
    })
}
