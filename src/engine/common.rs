// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the engine result alias and the panic boundary.

use crate::error::ThumbError;
use std::panic::{self, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ThumbError>;

/// Run `f`, turning a panic into an Internal error tagged with `stage`.
///
/// Anything owned by `f` (canvas, pool permit) is dropped during unwinding,
/// so release still happens exactly once.
pub fn run_with_panic_policy<T>(
    stage: &'static str,
    f: impl FnOnce() -> EngineResult<T>,
) -> EngineResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(target: "thumbwright::pipeline", stage, %message, "engine panicked");
            Err(ThumbError::internal_panic(format!("{stage}: {message}")))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
