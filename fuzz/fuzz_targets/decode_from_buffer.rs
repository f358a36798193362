#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};
use thumbwright::engine::{Pool, RasterEngine};
use thumbwright::{Limits, OutcomeClass, SourceImage, ThumbnailConfig, Thumbnailer};

fn service() -> &'static Thumbnailer<RasterEngine> {
    static SERVICE: OnceLock<Thumbnailer<RasterEngine>> = OnceLock::new();
    SERVICE.get_or_init(|| {
        // Keep bombs cheap under the fuzzer
        let limits = Limits::default().with_max_pixels(4_000_000);
        let config = ThumbnailConfig::default().with_limits(limits);
        Thumbnailer::with_engine(RasterEngine::new(limits), config, Arc::new(Pool::new(1)))
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(source) = SourceImage::from_bytes(data, None) else {
        return;
    };
    if let Err(err) = service().thumbnail(&source, "=s64x64") {
        // Garbage input is the caller's problem, never an engine fault
        assert_ne!(err.class(), OutcomeClass::BadRequest, "{err}");
    }
});
