// src/error.rs
//
// Unified error handling for thumbwright
// Uses thiserror for simple, type-safe error handling
//
// Outcome taxonomy (what the transport layer sees):
// - BadRequest: malformed or out-of-range transform plan
// - NotFound: source bytes unavailable
// - UnsupportedMedia: undecodable, truncated, too small, unknown codec
// - TooLarge: pixel/dimension/byte ceilings exceeded
// - Internal: engine faults after a successful decode (should not happen)

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Failure classes exposed to the transport collaborator.
///
/// Classification is a pure function of the error variant; messages are
/// never inspected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    /// Malformed or out-of-range plan / request path
    BadRequest,
    /// Source bytes unavailable (collaborator concern, passed through)
    NotFound,
    /// Undecodable, corrupt, truncated or degenerate image
    UnsupportedMedia,
    /// Source exceeds a configured ceiling
    TooLarge,
    /// Engine-level fault after decode; not user-actionable
    Internal,
}

impl OutcomeClass {
    /// HTTP status the transport should answer with.
    pub fn status(&self) -> u16 {
        match self {
            OutcomeClass::BadRequest => 400,
            OutcomeClass::NotFound => 404,
            OutcomeClass::TooLarge => 413,
            OutcomeClass::UnsupportedMedia => 415,
            OutcomeClass::Internal => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            OutcomeClass::BadRequest => "THUMB_BAD_REQUEST",
            OutcomeClass::NotFound => "THUMB_NOT_FOUND",
            OutcomeClass::UnsupportedMedia => "THUMB_UNSUPPORTED_MEDIA",
            OutcomeClass::TooLarge => "THUMB_TOO_LARGE",
            OutcomeClass::Internal => "THUMB_INTERNAL",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::BadRequest => "BadRequest",
            OutcomeClass::NotFound => "NotFound",
            OutcomeClass::UnsupportedMedia => "UnsupportedMedia",
            OutcomeClass::TooLarge => "TooLarge",
            OutcomeClass::Internal => "Internal",
        }
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// thumbwright error types
#[derive(Debug, Error)]
pub enum ThumbError {
    // Source Errors
    #[error("Source not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read source '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Request Errors
    #[error("Invalid transform segment '{segment}': {reason}")]
    InvalidSegment {
        segment: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Dimension {value} out of range [{min}, {max}]")]
    DimensionOutOfRange { value: u64, min: u32, max: u32 },

    #[error("Only one scale operation is allowed per request")]
    DuplicateScale,

    #[error("Request must specify at least one operation")]
    MissingOperations,

    #[error("Invalid request path '{path}': {reason}")]
    InvalidRequest {
        path: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Corrupted image data")]
    CorruptedImage,

    #[error("Image {width}x{height} is below the minimum dimension {min}")]
    ImageTooSmall { width: u32, height: u32, min: u32 },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Source size {bytes} bytes exceeds maximum {max} bytes")]
    SourceTooLarge { bytes: u64, max: u64 },

    // Engine Errors (after decode)
    #[error("Engine failure during {stage}: {message}")]
    EngineFault {
        stage: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Pipeline step '{step}' is not valid in stage {stage}")]
    InvalidState {
        step: Cow<'static, str>,
        stage: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for ThumbError {
    fn clone(&self) -> Self {
        match self {
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::InvalidSegment { segment, reason } => Self::InvalidSegment {
                segment: segment.clone(),
                reason: reason.clone(),
            },
            Self::DimensionOutOfRange { value, min, max } => Self::DimensionOutOfRange {
                value: *value,
                min: *min,
                max: *max,
            },
            Self::DuplicateScale => Self::DuplicateScale,
            Self::MissingOperations => Self::MissingOperations,
            Self::InvalidRequest { path, reason } => Self::InvalidRequest {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::CorruptedImage => Self::CorruptedImage,
            Self::ImageTooSmall { width, height, min } => Self::ImageTooSmall {
                width: *width,
                height: *height,
                min: *min,
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::SourceTooLarge { bytes, max } => Self::SourceTooLarge {
                bytes: *bytes,
                max: *max,
            },
            Self::EngineFault { stage, message } => Self::EngineFault {
                stage: stage.clone(),
                message: message.clone(),
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::InvalidState { step, stage } => Self::InvalidState {
                step: step.clone(),
                stage: stage.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ThumbError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_segment(
        segment: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidSegment {
            segment: segment.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_out_of_range(value: u64, min: u32, max: u32) -> Self {
        Self::DimensionOutOfRange { value, min, max }
    }

    pub fn duplicate_scale() -> Self {
        Self::DuplicateScale
    }

    pub fn missing_operations() -> Self {
        Self::MissingOperations
    }

    pub fn invalid_request(
        path: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidRequest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn image_too_small(width: u32, height: u32, min: u32) -> Self {
        Self::ImageTooSmall { width, height, min }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn source_too_large(bytes: u64, max: u64) -> Self {
        Self::SourceTooLarge { bytes, max }
    }

    /// Wrap a failure raised by an engine primitive after decode.
    pub fn engine_fault(stage: impl Into<Cow<'static, str>>, cause: impl fmt::Display) -> Self {
        Self::EngineFault {
            stage: stage.into(),
            message: Cow::Owned(cause.to_string()),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(
        step: impl Into<Cow<'static, str>>,
        stage: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidState {
            step: step.into(),
            stage: stage.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// True when the failure is caused by the request or its source, not by us.
    ///
    /// Nothing in this crate retries; the flag only helps callers decide
    /// what to log loudly.
    pub fn is_client_error(&self) -> bool {
        !matches!(self.class(), OutcomeClass::Internal)
    }

    /// Get the outcome class for this error
    pub fn class(&self) -> OutcomeClass {
        match self {
            Self::InvalidSegment { .. }
            | Self::DimensionOutOfRange { .. }
            | Self::DuplicateScale
            | Self::MissingOperations
            | Self::InvalidRequest { .. } => OutcomeClass::BadRequest,

            Self::FileNotFound { .. } => OutcomeClass::NotFound,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::CorruptedImage
            | Self::ImageTooSmall { .. } => OutcomeClass::UnsupportedMedia,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::SourceTooLarge { .. } => OutcomeClass::TooLarge,

            // A read failure other than "missing" is an I/O fault on our side.
            Self::FileReadFailed { .. }
            | Self::EngineFault { .. }
            | Self::ResizeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::InvalidState { .. }
            | Self::InternalPanic { .. } => OutcomeClass::Internal,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ThumbError>;
