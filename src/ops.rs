// src/ops.rs
//
// Transform plans.
// A plan is parsed once from the request suffix and is immutable afterwards;
// the pipeline executes it step by step.

use crate::error::{Result, ThumbError};
use std::fmt;

/// Smallest width/height a plan may request.
pub const MIN_PLAN_DIMENSION: u32 = 16;

/// Largest width/height a plan may request.
pub const MAX_PLAN_DIMENSION: u32 = 2048;

/// One step of a transform plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fit inside the box, preserving aspect ratio (`s`)
    Scale { width: u32, height: u32 },

    /// Cover the box, then center crop to it (`c`)
    Crop { width: u32, height: u32 },

    /// Low-fidelity variant of Scale (`sp`, also spelled `ps`)
    PreviewScale { width: u32, height: u32 },
}

impl Operation {
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            Operation::Scale { width, height }
            | Operation::Crop { width, height }
            | Operation::PreviewScale { width, height } => (width, height),
        }
    }

    /// Scale and PreviewScale share the one-per-plan budget.
    pub fn is_scale(&self) -> bool {
        matches!(self, Operation::Scale { .. } | Operation::PreviewScale { .. })
    }

    /// Canonical suffix prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            Operation::Scale { .. } => "s",
            Operation::Crop { .. } => "c",
            Operation::PreviewScale { .. } => "sp",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Scale { .. } => "scale",
            Operation::Crop { .. } => "crop",
            Operation::PreviewScale { .. } => "preview-scale",
        }
    }

    fn parse_segment(segment: &str) -> Result<Self> {
        // Longest prefix first: "sp"/"ps" must not be read as "s" + garbage.
        let (kind, rest) = if let Some(rest) = segment
            .strip_prefix("sp")
            .or_else(|| segment.strip_prefix("ps"))
        {
            (OpKind::PreviewScale, rest)
        } else if let Some(rest) = segment.strip_prefix('s') {
            (OpKind::Scale, rest)
        } else if let Some(rest) = segment.strip_prefix('c') {
            (OpKind::Crop, rest)
        } else {
            return Err(ThumbError::invalid_segment(
                segment.to_string(),
                "unknown operation",
            ));
        };

        let (w, h) = rest.split_once('x').ok_or_else(|| {
            ThumbError::invalid_segment(segment.to_string(), "expected <width>x<height>")
        })?;
        let width = parse_dimension(segment, w)?;
        let height = parse_dimension(segment, h)?;

        Ok(match kind {
            OpKind::Scale => Operation::Scale { width, height },
            OpKind::Crop => Operation::Crop { width, height },
            OpKind::PreviewScale => Operation::PreviewScale { width, height },
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}{}x{}", self.prefix(), w, h)
    }
}

enum OpKind {
    Scale,
    Crop,
    PreviewScale,
}

fn parse_dimension(segment: &str, digits: &str) -> Result<u32> {
    // str::parse accepts a leading '+', so check the charset ourselves.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ThumbError::invalid_segment(
            segment.to_string(),
            "dimension must be a decimal number",
        ));
    }
    // All-digit strings only fail to parse on overflow, which is out of range anyway.
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    if value < MIN_PLAN_DIMENSION as u64 || value > MAX_PLAN_DIMENSION as u64 {
        return Err(ThumbError::dimension_out_of_range(
            value,
            MIN_PLAN_DIMENSION,
            MAX_PLAN_DIMENSION,
        ));
    }
    Ok(value as u32)
}

/// Validated, ordered list of operations.
///
/// Invariants: at least one operation, at most one Scale-family operation,
/// every dimension within `[MIN_PLAN_DIMENSION, MAX_PLAN_DIMENSION]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformPlan {
    ops: Vec<Operation>,
}

impl TransformPlan {
    /// Parse a suffix such as `=s100x100=c50x50`.
    ///
    /// Empty segments (`==`, a leading `=`) are skipped.
    pub fn parse(suffix: &str) -> Result<Self> {
        let mut ops = Vec::new();
        let mut seen_scale = false;

        for segment in suffix.split('=').filter(|s| !s.is_empty()) {
            let op = Operation::parse_segment(segment)?;
            if op.is_scale() {
                if seen_scale {
                    return Err(ThumbError::duplicate_scale());
                }
                seen_scale = true;
            }
            ops.push(op);
        }

        if ops.is_empty() {
            return Err(ThumbError::missing_operations());
        }
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Requested box of the first Scale-family operation, usable as a decode
    /// hint only when no Crop runs before it.
    ///
    /// A Crop ahead of the scale needs full-resolution pixels to pick its
    /// window, so the decoder must not pre-scale in that case.
    pub fn scale_hint(&self) -> Option<(u32, u32)> {
        for op in &self.ops {
            match op {
                Operation::Crop { .. } => return None,
                op if op.is_scale() => return Some(op.dimensions()),
                _ => {}
            }
        }
        None
    }
}

impl fmt::Display for TransformPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            write!(f, "={op}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for TransformPlan {
    type Err = ThumbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A request path split into the source name and its plan,
/// e.g. `photos/watermelon.jpg=c200x100`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformRequest {
    pub source: String,
    pub plan: TransformPlan,
}

impl TransformRequest {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim_start_matches('/');
        let Some(split) = path.find('=') else {
            return Err(ThumbError::missing_operations());
        };
        let (source, suffix) = path.split_at(split);
        if source.is_empty() {
            return Err(ThumbError::invalid_request(
                path.to_string(),
                "missing source name",
            ));
        }
        Ok(Self {
            source: source.to_string(),
            plan: TransformPlan::parse(suffix)?,
        })
    }
}

impl fmt::Display for TransformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.source, self.plan)
    }
}

/// Source container format detected at probe time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
}

impl InputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Jpeg => "jpeg",
            InputFormat::Png => "png",
            InputFormat::WebP => "webp",
            InputFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// JPEG stays JPEG, WebP stays WebP, everything else becomes PNG.
    pub fn for_input(input: InputFormat) -> Self {
        match input {
            InputFormat::Jpeg => OutputFormat::Jpeg,
            InputFormat::WebP => OutputFormat::WebP,
            InputFormat::Png | InputFormat::Gif => OutputFormat::Png,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
