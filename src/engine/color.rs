// src/engine/color.rs
//
// Color management: recognizing the reference sRGB profile and converting
// pixels from an embedded ICC profile into sRGB.

use crate::engine::common::EngineResult;
use crate::error::ThumbError;
use image::{DynamicImage, RgbImage, RgbaImage};
use moxcms::{ColorProfile, DataColorSpace, Layout, Transform8BitExecutor, TransformOptions};

/// Mid-saturation colors and grays. Out-of-gamut primaries would clip to
/// themselves under a wide-gamut profile, so they can't tell profiles apart.
const SRGB_PROBES: [[u8; 3]; 6] = [
    [200, 100, 50],
    [60, 160, 90],
    [90, 80, 200],
    [30, 30, 30],
    [128, 128, 128],
    [230, 230, 230],
];

/// Largest per-channel drift still treated as an identity transform.
const SRGB_TOLERANCE: u8 = 1;

/// True when `icc` is an RGB profile that maps pixels onto sRGB unchanged.
///
/// Pixels tagged with such a profile are already in the output space, so
/// there is nothing to convert.
pub fn is_reference_srgb(icc: &[u8]) -> bool {
    let Ok(profile) = parse_rgb_profile(icc) else {
        return false;
    };
    let Ok(transform) = srgb_transform(&profile, Layout::Rgb) else {
        return false;
    };

    let src = SRGB_PROBES.concat();
    let mut out = vec![0u8; src.len()];
    if transform.transform(&src, &mut out).is_err() {
        return false;
    }
    src.iter()
        .zip(&out)
        .all(|(a, b)| a.abs_diff(*b) <= SRGB_TOLERANCE)
}

fn parse_rgb_profile(icc: &[u8]) -> EngineResult<ColorProfile> {
    let profile = ColorProfile::new_from_slice(icc)
        .map_err(|e| ThumbError::engine_fault("color:profile", e))?;
    if profile.color_space != DataColorSpace::Rgb {
        return Err(ThumbError::engine_fault(
            "color:profile",
            format!("only RGB profiles can be applied, got {:?}", profile.color_space),
        ));
    }
    Ok(profile)
}

fn srgb_transform(
    src: &ColorProfile,
    layout: Layout,
) -> EngineResult<Box<Transform8BitExecutor>> {
    src.create_transform_8bit(layout, &ColorProfile::new_srgb(), layout, TransformOptions::default())
        .map_err(|e| ThumbError::engine_fault("color:transform", e))
}

/// Convert `img` from the embedded `icc` profile into sRGB.
///
/// Only RGB profiles are applied; anything else is an error so the caller can
/// fall back to a plain colorspace conversion. Alpha is carried over untouched.
pub fn apply_profile_to_srgb(img: &mut DynamicImage, icc: &[u8]) -> EngineResult<()> {
    let profile = parse_rgb_profile(icc)?;

    let converted = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let mut out = vec![0u8; rgba.as_raw().len()];
        srgb_transform(&profile, Layout::Rgba)?
            .transform(rgba.as_raw(), &mut out)
            .map_err(|e| ThumbError::engine_fault("color:transform", e))?;
        RgbaImage::from_raw(rgba.width(), rgba.height(), out).map(DynamicImage::ImageRgba8)
    } else {
        let rgb = img.to_rgb8();
        let mut out = vec![0u8; rgb.as_raw().len()];
        srgb_transform(&profile, Layout::Rgb)?
            .transform(rgb.as_raw(), &mut out)
            .map_err(|e| ThumbError::engine_fault("color:transform", e))?;
        RgbImage::from_raw(rgb.width(), rgb.height(), out).map(DynamicImage::ImageRgb8)
    };

    *img = converted
        .ok_or_else(|| ThumbError::engine_fault("color:transform", "buffer size mismatch"))?;
    Ok(())
}
