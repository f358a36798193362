// src/config.rs
//
// Service configuration. Plain struct with defaults and setters; `from_env`
// overlays THUMBWRIGHT_* variables and ignores values that do not parse.

use crate::engine::limits::Limits;
use crate::engine::pipeline::PipelineOptions;
use crate::engine::pool::default_capacity;
use std::str::FromStr;

const ENV_PREFIX: &str = "THUMBWRIGHT_";
const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug, PartialEq)]
pub struct ThumbnailConfig {
    /// Pre-resize blur strength; 0 disables
    pub blur_factor: f64,
    /// Unsharp after a real downscale
    pub sharpen: bool,
    /// Stretch contrast before encoding
    pub auto_contrast: bool,
    pub jpeg_quality: u8,
    /// Concurrent transformations admitted by the pool
    pub workers: usize,
    pub limits: Limits,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            blur_factor: 0.0,
            sharpen: true,
            auto_contrast: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            workers: default_capacity(),
            limits: Limits::default(),
        }
    }
}

impl ThumbnailConfig {
    /// Negative factors turn blur off; NaN and infinities are ignored.
    pub fn with_blur_factor(mut self, blur_factor: f64) -> Self {
        if blur_factor.is_finite() {
            self.blur_factor = blur_factor.max(0.0);
        } else {
            tracing::warn!(target: "thumbwright::service", blur_factor, "ignoring non-finite blur factor");
        }
        self
    }

    pub fn with_sharpen(mut self, sharpen: bool) -> Self {
        self.sharpen = sharpen;
        self
    }

    pub fn with_auto_contrast(mut self, auto_contrast: bool) -> Self {
        self.auto_contrast = auto_contrast;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.limits = self.limits.with_max_pixels(max_pixels);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.limits = self.limits.with_max_bytes(max_bytes);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Defaults overlaid with `THUMBWRIGHT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = parse_var::<f64>(&read, "BLUR_FACTOR") {
            config = config.with_blur_factor(v);
        }
        if let Some(v) = parse_var::<bool>(&read, "SHARPEN") {
            config = config.with_sharpen(v);
        }
        if let Some(v) = parse_var::<bool>(&read, "AUTO_CONTRAST") {
            config = config.with_auto_contrast(v);
        }
        if let Some(v) = parse_var::<u8>(&read, "JPEG_QUALITY") {
            config = config.with_jpeg_quality(v);
        }
        if let Some(v) = parse_var::<usize>(&read, "WORKERS") {
            config = config.with_workers(v);
        }
        if let Some(v) = parse_var::<u64>(&read, "MAX_PIXELS") {
            config = config.with_max_pixels(v);
        }
        if let Some(v) = parse_var::<u64>(&read, "MAX_BYTES") {
            config = config.with_max_bytes(Some(v));
        }
        config
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            blur_factor: self.blur_factor,
            sharpen: self.sharpen,
            auto_contrast: self.auto_contrast,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

fn parse_var<T: FromStr>(read: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = read(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                target: "thumbwright::service",
                variable = %format!("{ENV_PREFIX}{name}"),
                value = %raw,
                "ignoring unparsable configuration value"
            );
            None
        }
    }
}
