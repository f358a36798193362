// lib.rs
//
// thumbwright: on-demand thumbnailing core
//
// A request path `<name>=<op>[=<op>...]` names a source image and an ordered
// list of scale/crop operations. The engine decodes the source (pre-scaled
// where the codec allows), brings it into sRGB, applies the operations in
// upright coordinates, fixes EXIF orientation and re-encodes it.
//
// Transport, caching and source storage belong to the caller; see
// `SourceLoader` and `Outcome`.

// Memory allocator optimization - jemalloc for better performance.
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

pub use config::ThumbnailConfig;
pub use engine::{
    DirectoryLoader, Limits, Orientation, Outcome, SourceImage, SourceLoader, Thumbnail,
    Thumbnailer,
};
pub use error::{OutcomeClass, Result, ThumbError};
pub use ops::{InputFormat, Operation, OutputFormat, TransformPlan, TransformRequest};
