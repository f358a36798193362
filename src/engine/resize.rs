// src/engine/resize.rs
//
// SIMD resize via fast_image_resize, with an image-crate fallback when fir
// rejects the buffer.

use crate::engine::backend::ResizeFilter;
use crate::engine::common::EngineResult;
use crate::error::ThumbError;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

fn resize_options(filter: ResizeFilter) -> ResizeOptions {
    let kernel = match filter {
        ResizeFilter::Lanczos => fir::FilterType::Lanczos3,
        ResizeFilter::Triangle => fir::FilterType::Bilinear,
    };
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(kernel))
}

fn fallback_filter(filter: ResizeFilter) -> FilterType {
    match filter {
        ResizeFilter::Lanczos => FilterType::Lanczos3,
        ResizeFilter::Triangle => FilterType::Triangle,
    }
}

/// Resize taking ownership, so 8-bit buffers move into fir without a copy.
pub fn resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> EngineResult<DynamicImage> {
    let src = (img.width(), img.height());
    let dst = (dst_width, dst_height);
    if src.0 == 0 || src.1 == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ThumbError::resize_failed(src, dst, "invalid dimensions for resize"));
    }

    let (pixel_type, pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        DynamicImage::ImageLuma8(gray) => (PixelType::U8, gray.into_raw()),
        DynamicImage::ImageLumaA8(gray) => (PixelType::U8x2, gray.into_raw()),
        other if other.color().has_alpha() => (PixelType::U8x4, other.to_rgba8().into_raw()),
        other => (PixelType::U8x3, other.to_rgb8().into_raw()),
    };

    resize_pixels(src, pixels, pixel_type, dst, filter)
        .map_err(|reason| ThumbError::resize_failed(src, dst, reason))
}

fn resize_pixels(
    (src_width, src_height): (u32, u32),
    mut pixels: Vec<u8>,
    pixel_type: PixelType,
    (dst_width, dst_height): (u32, u32),
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, String> {
    let required = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|n| n.checked_mul(pixel_type.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;
    if pixels.len() < required {
        return Err(format!(
            "source buffer too small: expected {required} bytes, got {}",
            pixels.len()
        ));
    }

    let options = resize_options(filter);
    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src) => resize_image(src, pixel_type, dst_width, dst_height, &options),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned.buffer_mut().copy_from_slice(&pixels[..required]);
            resize_image(aligned, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    primary.or_else(|err| {
        tracing::debug!(target: "thumbwright::pipeline", error = %err, "fir resize failed, using image crate");
        resize_with_image_crate(
            &pixels,
            (src_width, src_height),
            pixel_type,
            (dst_width, dst_height),
            filter,
        )
        .map_err(|fallback| format!("{err}; image crate fallback failed: {fallback}"))
    })
}

fn resize_image(
    mut src: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst = fir::images::Image::new(dst_width, dst_height, pixel_type);

    // Straight alpha would bleed transparent colors into their neighbours
    let premultiply = matches!(pixel_type, PixelType::U8x4 | PixelType::U8x2);
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    fir::Resizer::new()
        .resize(&src, &mut dst, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    from_raw(pixel_type, dst_width, dst_height, dst.into_vec())
}

fn from_raw(
    pixel_type: PixelType,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
) -> std::result::Result<DynamicImage, String> {
    let img = match pixel_type {
        PixelType::U8 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        PixelType::U8x2 => {
            GrayAlphaImage::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8)
        }
        PixelType::U8x3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        PixelType::U8x4 => {
            RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
        }
        other => return Err(format!("unsupported pixel type {other:?}")),
    };
    img.ok_or_else(|| "resized buffer size mismatch".to_string())
}

fn resize_with_image_crate(
    pixels: &[u8],
    (src_width, src_height): (u32, u32),
    pixel_type: PixelType,
    (dst_width, dst_height): (u32, u32),
    filter: ResizeFilter,
) -> std::result::Result<DynamicImage, String> {
    let src = from_raw(pixel_type, src_width, src_height, pixels.to_vec())?;
    Ok(src.resize_exact(dst_width, dst_height, fallback_filter(filter)))
}
