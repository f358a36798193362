// src/engine/decoder.rs
//
// Decoder operations: header probe, JPEG (mozjpeg, DCT pre-scaling), PNG
// (zune-png), WebP (libwebp), GIF and fallbacks (image crate).
// Every decoder returns the first frame only.

use crate::engine::backend::{SizeHint, SourceInfo};
use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::limits::Limits;
use crate::engine::orientation::Orientation;
use crate::error::ThumbError;
use crate::ops::InputFormat;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use img_parts::jpeg::Jpeg;
use mozjpeg::decompress::DecompressBuilder;
use mozjpeg_sys::{
    jpeg_common_struct, jpeg_error_mgr, jpeg_std_error, JWRN_HIT_MARKER, JWRN_JPEG_EOF,
};
use std::cell::Cell;
use std::io::Cursor;
use std::os::raw::c_int;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Detect input format using magic bytes.
pub fn detect_format(bytes: &[u8]) -> EngineResult<InputFormat> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok(InputFormat::Jpeg),
        Ok(ImageFormat::Png) => Ok(InputFormat::Png),
        Ok(ImageFormat::WebP) => Ok(InputFormat::WebP),
        Ok(ImageFormat::Gif) => Ok(InputFormat::Gif),
        Ok(other) => Err(ThumbError::unsupported_format(format!("{other:?}"))),
        Err(_) => Err(ThumbError::unsupported_format("unknown")),
    }
}

/// Dimensions, format and orientation from the header, without decoding pixels.
pub fn probe(bytes: &[u8]) -> EngineResult<SourceInfo> {
    let format = detect_format(bytes)?;
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ThumbError::decode_failed(format!("probe: {e}")))?
        .into_dimensions()
        .map_err(|e| ThumbError::decode_failed(format!("probe: {e}")))?;
    let orientation = detect_exif_orientation(bytes)
        .map(Orientation::from_exif)
        .unwrap_or_default();
    Ok(SourceInfo {
        width,
        height,
        format,
        orientation,
    })
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // Short or Long depending on the writer
    let value = field.value.get_uint(0)? as u16;
    (1..=8).contains(&value).then_some(value)
}

/// Decode the first frame, honoring `hint` where the codec can pre-scale.
pub fn decode(
    bytes: &[u8],
    format: InputFormat,
    hint: Option<SizeHint>,
    limits: &Limits,
) -> EngineResult<DynamicImage> {
    let img = match format {
        // Both JPEG decoders pad truncated scans instead of failing
        InputFormat::Jpeg if !jpeg_scan_terminated(bytes) => {
            return Err(ThumbError::decode_failed("jpeg: scan data does not end in EOI"))
        }
        InputFormat::Jpeg => match decode_jpeg_mozjpeg(bytes, hint, limits) {
            Ok(img) => img,
            Err(err @ (ThumbError::DimensionExceedsLimit { .. }
            | ThumbError::PixelCountExceedsLimit { .. }
            | ThumbError::ImageTooSmall { .. }
            | ThumbError::CorruptedImage)) => return Err(err),
            Err(err) => {
                // CMYK and other layouts libjpeg won't convert to RGB
                tracing::debug!(target: "thumbwright::pipeline", error = %err, "mozjpeg failed, retrying with image crate");
                decode_with_image_crate(bytes, ImageFormat::Jpeg)?
            }
        },
        InputFormat::Png => decode_png_zune(bytes)?,
        InputFormat::WebP => decode_webp_libwebp(bytes)?,
        InputFormat::Gif => decode_with_image_crate(bytes, ImageFormat::Gif)?,
    };
    match hint {
        // Pre-scaled output may fall below the source minimum
        Some(_) => limits.enforce_ceilings(img.width(), img.height())?,
        None => limits.enforce_dimensions(img.width(), img.height())?,
    }
    Ok(img)
}

/// Walk the marker segments up to the first SOS and require its entropy-coded
/// data to end in EOI. Only 0x00/0xFF padding may follow the marker.
///
/// Segment payloads (an EXIF thumbnail in APP1, say) are skipped by length, so
/// an EOI inside them does not count.
pub fn jpeg_scan_terminated(data: &[u8]) -> bool {
    let Ok(jpeg) = Jpeg::from_bytes(img_parts::Bytes::copy_from_slice(data)) else {
        return false;
    };
    let Some(scan) = jpeg.segments().iter().find(|s| s.has_entropy()) else {
        return false;
    };
    // The entropy buffer is the remainder of the file after the SOS header.
    let entropy_len = scan.len_with_entropy() - scan.len();
    let Some(tail) = data.get(data.len().saturating_sub(entropy_len)..) else {
        return false;
    };
    let end = tail
        .iter()
        .rposition(|&b| b != 0x00 && b != 0xFF)
        .map_or(0, |i| i + 1);
    tail[..end].ends_with(&[0xFF, 0xD9])
}

thread_local! {
    // Raised by libjpeg when the scan runs out of data and gets padded.
    static JPEG_TRUNCATED: Cell<bool> = const { Cell::new(false) };
}

/// libjpeg error manager that records truncation warnings and unwinds on
/// fatal errors.
fn truncation_error_mgr() -> jpeg_error_mgr {
    // SAFETY: jpeg_std_error initializes every field of the zeroed struct.
    let mut err: jpeg_error_mgr = unsafe { std::mem::zeroed() };
    unsafe {
        jpeg_std_error(&mut err);
    }
    err.error_exit = Some(unwind_error_exit);
    err.emit_message = Some(record_truncation);
    err
}

unsafe extern "C-unwind" fn record_truncation(cinfo: &mut jpeg_common_struct, level: c_int) {
    if level >= 0 {
        return;
    }
    // SAFETY: libjpeg only calls this with `err` pointing at our manager.
    let code = unsafe { (*cinfo.err).msg_code };
    if code == JWRN_HIT_MARKER || code == JWRN_JPEG_EOF {
        JPEG_TRUNCATED.with(|flag| flag.set(true));
    }
}

unsafe extern "C-unwind" fn unwind_error_exit(cinfo: &mut jpeg_common_struct) {
    // SAFETY: as above.
    let code = unsafe { (*cinfo.err).msg_code };
    std::panic::resume_unwind(Box::new(format!("libjpeg fatal error {code}")));
}

/// Panics inside codecs mean corrupt input, not an engine fault.
fn decode_guard<T>(
    stage: &'static str,
    f: impl FnOnce() -> EngineResult<T>,
) -> EngineResult<T> {
    run_with_panic_policy(stage, f).map_err(|err| match err {
        ThumbError::InternalPanic { message } => ThumbError::decode_failed(message),
        other => other,
    })
}

/// Smallest libjpeg scale numerator (n/8) whose output still covers the hint.
pub fn jpeg_scale_numerator(width: u32, height: u32, hint: Option<SizeHint>) -> u8 {
    let Some(hint) = hint else { return 8 };
    let covers = |n: u32| {
        (width * n).div_ceil(8) >= hint.width && (height * n).div_ceil(8) >= hint.height
    };
    (1..8).find(|&n| covers(n)).unwrap_or(8) as u8
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(
    data: &[u8],
    hint: Option<SizeHint>,
    limits: &Limits,
) -> EngineResult<DynamicImage> {
    decode_guard("decode:mozjpeg", || {
        JPEG_TRUNCATED.with(|flag| flag.set(false));
        let mut decompress = DecompressBuilder::new()
            .with_err(truncation_error_mgr())
            .from_mem(data)
            .map_err(|e| ThumbError::decode_failed(format!("jpeg: init failed: {e:?}")))?;

        let (full_w, full_h) = decompress.size();
        let (full_w, full_h) = (full_w as u32, full_h as u32);
        limits.enforce_dimensions(full_w, full_h)?;

        let numerator = jpeg_scale_numerator(full_w, full_h, hint);
        if numerator < 8 {
            decompress.scale(numerator);
        }

        let mut decompress = decompress
            .rgb()
            .map_err(|e| ThumbError::decode_failed(format!("jpeg: rgb conversion failed: {e:?}")))?;
        let width = decompress.width() as u32;
        let height = decompress.height() as u32;

        let pixels: Vec<[u8; 3]> = decompress
            .read_scanlines()
            .map_err(|e| ThumbError::decode_failed(format!("jpeg: read failed: {e:?}")))?;
        if JPEG_TRUNCATED.with(Cell::get) {
            return Err(ThumbError::corrupted_image());
        }
        let flat: Vec<u8> = pixels.into_iter().flatten().collect();

        RgbImage::from_raw(width, height, flat)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ThumbError::decode_failed("jpeg: scanline buffer size mismatch"))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> EngineResult<DynamicImage> {
    decode_guard("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);
        let pixels = decoder
            .decode()
            .map_err(|e| ThumbError::decode_failed(format!("png: {e}")))?;

        let info = decoder
            .get_info()
            .ok_or_else(|| ThumbError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => return Err(ThumbError::decode_failed("png: unexpected non-U8 pixel buffer")),
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| ThumbError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => {
                GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
            }
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(ThumbError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };
        img.ok_or_else(|| ThumbError::decode_failed("png: pixel buffer size mismatch"))
    })
}

/// Decode WebP using libwebp. Animated files go through the image crate (first frame).
pub fn decode_webp_libwebp(data: &[u8]) -> EngineResult<DynamicImage> {
    decode_guard("decode:webp", || {
        let features = BitstreamFeatures::new(data)
            .ok_or_else(|| ThumbError::decode_failed("webp: failed to read bitstream features"))?;

        if features.has_animation() {
            return decode_with_image_crate(data, ImageFormat::WebP);
        }

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ThumbError::decode_failed("webp: decode failed"))?;
        Ok(decoded.to_image())
    })
}

/// Decode with the image crate; multi-frame formats yield their first frame.
pub fn decode_with_image_crate(data: &[u8], format: ImageFormat) -> EngineResult<DynamicImage> {
    decode_guard("decode:image", || {
        image::load_from_memory_with_format(data, format)
            .map_err(|e| ThumbError::decode_failed(format!("{format:?}: {e}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutcomeClass;
    use image::{GenericImageView, Rgb};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_detect_format() {
        let png = encode(gradient(4, 4), ImageFormat::Png);
        let jpeg = encode(gradient(4, 4), ImageFormat::Jpeg);
        assert_eq!(detect_format(&png).unwrap(), InputFormat::Png);
        assert_eq!(detect_format(&jpeg).unwrap(), InputFormat::Jpeg);

        let err = detect_format(b"hello, I am a text file").unwrap_err();
        assert_eq!(err.class(), OutcomeClass::UnsupportedMedia);
    }

    #[test]
    fn test_probe_reads_header() {
        let png = encode(gradient(30, 20), ImageFormat::Png);
        let info = probe(&png).unwrap();
        assert_eq!((info.width, info.height), (30, 20));
        assert_eq!(info.format, InputFormat::Png);
        assert_eq!(info.orientation, Orientation::Normal);
    }

    #[test]
    fn test_scale_numerator() {
        assert_eq!(jpeg_scale_numerator(800, 600, None), 8);
        // 800/8 = 100 covers a 100-wide hint
        assert_eq!(
            jpeg_scale_numerator(800, 600, Some(SizeHint { width: 100, height: 75 })),
            1
        );
        assert_eq!(
            jpeg_scale_numerator(800, 600, Some(SizeHint { width: 101, height: 75 })),
            2
        );
        assert_eq!(
            jpeg_scale_numerator(800, 600, Some(SizeHint { width: 800, height: 600 })),
            8
        );
        assert_eq!(
            jpeg_scale_numerator(800, 600, Some(SizeHint { width: 2048, height: 2048 })),
            8
        );
    }

    #[test]
    fn test_jpeg_prescale_keeps_cover_of_hint() {
        let jpeg = encode(gradient(400, 300), ImageFormat::Jpeg);
        let hint = SizeHint { width: 60, height: 45 };
        let img = decode(&jpeg, InputFormat::Jpeg, Some(hint), &Limits::default()).unwrap();
        let (w, h) = img.dimensions();
        assert!(w >= 60 && h >= 45, "{w}x{h}");
        assert!(w < 400 && h < 300, "{w}x{h}");
    }

    #[test]
    fn test_prescaled_thin_strip_is_not_too_small() {
        let jpeg = encode(gradient(4000, 2), ImageFormat::Jpeg);
        let hint = SizeHint { width: 16, height: 1 };
        let img = decode(&jpeg, InputFormat::Jpeg, Some(hint), &Limits::default()).unwrap();
        assert_eq!(img.dimensions(), (500, 1));
    }

    #[test]
    fn test_truncated_jpeg_is_unsupported() {
        let jpeg = encode(gradient(64, 64), ImageFormat::Jpeg);
        let truncated = &jpeg[..jpeg.len() / 2];
        let err = decode(truncated, InputFormat::Jpeg, None, &Limits::default()).unwrap_err();
        assert_eq!(err.class(), OutcomeClass::UnsupportedMedia, "{err}");
    }

    // High-entropy pixels so the scan dominates the file
    fn noise(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        }))
    }

    fn with_app1(jpeg: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_eoi_inside_app1_does_not_mask_truncation() {
        let thumb = encode(noise(8, 8), ImageFormat::Jpeg);
        let mut payload = b"Exif\x00\x00".to_vec();
        payload.extend_from_slice(&thumb);
        let jpeg = with_app1(&encode(noise(400, 300), ImageFormat::Jpeg), &payload);
        assert!(jpeg_scan_terminated(&jpeg));
        assert!(decode(&jpeg, InputFormat::Jpeg, None, &Limits::default()).is_ok());

        let truncated = &jpeg[..jpeg.len() * 2 / 3];
        assert!(!jpeg_scan_terminated(truncated));
        let err = decode(truncated, InputFormat::Jpeg, None, &Limits::default()).unwrap_err();
        assert_eq!(err.class(), OutcomeClass::UnsupportedMedia, "{err}");
    }

    #[test]
    fn test_scan_terminator_allows_only_padding() {
        let jpeg = encode(noise(32, 32), ImageFormat::Jpeg);
        let mut padded = jpeg.clone();
        padded.extend_from_slice(&[0x00, 0x00, 0xFF]);
        assert!(jpeg_scan_terminated(&padded));

        let mut trailer = jpeg.clone();
        trailer.extend_from_slice(b"vendor trailer");
        assert!(!jpeg_scan_terminated(&trailer));

        assert!(!jpeg_scan_terminated(&[0xFF, 0xD8, 0xFF, 0xD9]));
    }

    #[test]
    fn test_eoi_appended_to_cut_scan_is_corrupt() {
        let jpeg = encode(noise(400, 300), ImageFormat::Jpeg);
        let mut data = jpeg[..jpeg.len() * 2 / 3].to_vec();
        data.extend_from_slice(&[0xFF, 0xD9]);
        // Structurally complete; only the entropy decoder can tell
        assert!(jpeg_scan_terminated(&data));
        let err = decode(&data, InputFormat::Jpeg, None, &Limits::default()).unwrap_err();
        assert!(matches!(err, ThumbError::CorruptedImage), "{err}");
    }

    #[test]
    fn test_decoded_size_checked_against_limits() {
        let png = encode(gradient(1, 1), ImageFormat::Png);
        let err = decode(&png, InputFormat::Png, None, &Limits::default()).unwrap_err();
        assert!(matches!(err, ThumbError::ImageTooSmall { .. }));

        let png = encode(gradient(100, 100), ImageFormat::Png);
        let limits = Limits::default().with_max_pixels(5_000);
        let err = decode(&png, InputFormat::Png, None, &limits).unwrap_err();
        assert_eq!(err.class(), OutcomeClass::TooLarge);
    }

    #[test]
    fn test_webp_and_gif_first_frame() {
        let rgb: Vec<u8> = [10u8, 20, 30].repeat(6 * 4);
        let webp = webp::Encoder::from_rgb(&rgb, 6, 4).encode_lossless().to_vec();
        let img = decode(&webp, InputFormat::WebP, None, &Limits::default()).unwrap();
        assert_eq!(img.dimensions(), (6, 4));
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);

        let gif = encode(gradient(5, 7), ImageFormat::Gif);
        let img = decode(&gif, InputFormat::Gif, None, &Limits::default()).unwrap();
        assert_eq!(img.dimensions(), (5, 7));
    }
}
