#![no_main]

use libfuzzer_sys::fuzz_target;
use thumbwright::engine::decoder::{detect_exif_orientation, probe};
use thumbwright::engine::io::extract_icc_profile;
use thumbwright::engine::color::is_reference_srgb;

fuzz_target!(|data: &[u8]| {
    if let Some(value) = detect_exif_orientation(data) {
        assert!((1..=8).contains(&value));
    }
    if let Some(icc) = extract_icc_profile(data) {
        let _ = is_reference_srgb(&icc);
    }
    let _ = probe(data);
});
