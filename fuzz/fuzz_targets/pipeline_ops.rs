#![no_main]

use arbitrary::Arbitrary;
use image::{DynamicImage, ImageFormat, RgbaImage};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use thumbwright::engine::{Pool, RasterEngine};
use thumbwright::{SourceImage, ThumbnailConfig, Thumbnailer, TransformPlan};

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    width: u16,
    height: u16,
}

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    jpeg: bool,
    orientation: u8,
    ops: Vec<OperationSeed>,
    pixels: Vec<u8>,
}

fn service() -> &'static Thumbnailer<RasterEngine> {
    static SERVICE: OnceLock<Thumbnailer<RasterEngine>> = OnceLock::new();
    SERVICE.get_or_init(|| {
        Thumbnailer::with_engine(
            RasterEngine::default(),
            ThumbnailConfig::default(),
            Arc::new(Pool::new(1)),
        )
    })
}

fn build_source(input: &Input) -> Vec<u8> {
    let width = input.width as u32 % 96 + 2;
    let height = input.height as u32 % 96 + 2;
    let mut buffer = vec![0u8; (width * height * 4) as usize];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = input.pixels.get(i % input.pixels.len().max(1)).copied().unwrap_or(0);
    }
    let rgba = RgbaImage::from_raw(width, height, buffer).expect("buffer sized for image");
    let img = DynamicImage::ImageRgba8(rgba);

    let mut out = Vec::new();
    if input.jpeg {
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .expect("jpeg encode");
        with_orientation(out, input.orientation % 8 + 1)
    } else {
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .expect("png encode");
        out
    }
}

fn with_orientation(jpeg: Vec<u8>, orientation: u8) -> Vec<u8> {
    let mut payload = b"Exif\x00\x00MM\x00\x2a\x00\x00\x00\x08\x00\x01\x01\x12\x00\x03\x00\x00\x00\x01".to_vec();
    payload.extend_from_slice(&[0, orientation, 0, 0, 0, 0, 0, 0]);
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

fuzz_target!(|input: Input| {
    let suffix: String = input
        .ops
        .iter()
        .take(6)
        .map(|seed| {
            let prefix = ["s", "c", "sp", "ps"][seed.kind as usize % 4];
            format!("={prefix}{}x{}", seed.width % 2100, seed.height % 2100)
        })
        .collect();
    let Ok(plan) = TransformPlan::parse(&suffix) else {
        return;
    };

    let bytes = build_source(&input);
    let source = SourceImage::from_bytes(bytes, None).expect("no byte ceiling");
    let thumb = service().run(&source, &plan).expect("valid plan on valid image");
    assert!(thumb.width >= 1 && thumb.height >= 1);
    assert!(image::load_from_memory(&thumb.bytes).is_ok());
});
