// src/engine/io.rs
//
// I/O: source buffers, directory loading, and ICC profile extraction

use crate::error::{Result, ThumbError};
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageICC};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Immutable encoded source plus the byte cap it was admitted under.
#[derive(Clone, Debug)]
pub struct SourceImage {
    bytes: Arc<Vec<u8>>,
    max_bytes: Option<u64>,
}

impl SourceImage {
    /// Wrap in-memory bytes. Fails with TooLarge over `max_bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, max_bytes: Option<u64>) -> Result<Self> {
        let bytes = bytes.into();
        check_len(bytes.len() as u64, max_bytes)?;
        Ok(Self {
            bytes: Arc::new(bytes),
            max_bytes,
        })
    }

    /// Read a local file. The size is checked from metadata before reading.
    pub fn from_path(path: impl AsRef<Path>, max_bytes: Option<u64>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let meta = std::fs::metadata(path).map_err(|e| io_error(display.clone(), e))?;
        if !meta.is_file() {
            return Err(ThumbError::file_not_found(display));
        }
        check_len(meta.len(), max_bytes)?;

        let bytes = std::fs::read(path).map_err(|e| io_error(display, e))?;
        Self::from_bytes(bytes, max_bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }
}

fn check_len(len: u64, max_bytes: Option<u64>) -> Result<()> {
    match max_bytes {
        Some(max) if len > max => Err(ThumbError::source_too_large(len, max)),
        _ => Ok(()),
    }
}

fn io_error(path: String, e: std::io::Error) -> ThumbError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ThumbError::file_not_found(path)
    } else {
        ThumbError::file_read_failed(path, e)
    }
}

/// Fetches source bytes by request name.
pub trait SourceLoader {
    fn load(&self, name: &str) -> Result<SourceImage>;
}

/// Serves sources from a local directory.
#[derive(Clone, Debug)]
pub struct DirectoryLoader {
    root: PathBuf,
    max_bytes: Option<u64>,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>, max_bytes: Option<u64>) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }
}

impl SourceLoader for DirectoryLoader {
    fn load(&self, name: &str) -> Result<SourceImage> {
        let relative = Path::new(name);
        // Only plain relative components; no escaping the root.
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ThumbError::invalid_request(
                name.to_string(),
                "source name must be a relative path",
            ));
        }
        SourceImage::from_path(self.root.join(relative), self.max_bytes)
    }
}

/// Extract ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }

    let bytes = img_parts::Bytes::copy_from_slice(data);
    let icc = if data.starts_with(&[0xFF, 0xD8]) {
        Jpeg::from_bytes(bytes).ok()?.icc_profile()?
    } else if data.starts_with(b"\x89PNG") {
        Png::from_bytes(bytes).ok()?.icc_profile()?
    } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        WebP::from_bytes(bytes).ok()?.icc_profile()?
    } else {
        return None;
    };

    let icc = icc.to_vec();
    if validate_icc_profile(&icc) {
        Some(icc)
    } else {
        tracing::debug!(target: "thumbwright::color", len = icc.len(), "ignoring malformed ICC profile");
        None
    }
}

/// Header sanity check; a profile that fails it is treated as absent.
pub(crate) fn validate_icc_profile(icc: &[u8]) -> bool {
    if icc.len() < 128 {
        return false;
    }

    let declared = u32::from_be_bytes([icc[0], icc[1], icc[2], icc[3]]) as usize;
    if declared != icc.len() {
        return false;
    }

    // Major version is 2, 4 or 5 in practice
    if icc[8] > 10 {
        return false;
    }

    // CMM, device class, data color space and PCS are four-char signatures
    let signature = |range: std::ops::Range<usize>| {
        icc[range]
            .iter()
            .all(|&b| b == 0 || (32..=126).contains(&b))
    };
    signature(4..8) && signature(12..16) && signature(16..20) && signature(20..24)
}
