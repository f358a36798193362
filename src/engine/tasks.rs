// src/engine/tasks.rs
//
// Request handling: parse, load, check limits, wait for a worker slot, run
// the pipeline under the panic boundary, map the result to an outcome.
// Parsing and limit checks happen before a slot is taken.

use crate::config::ThumbnailConfig;
use crate::engine::backend::ImageEngine;
use crate::engine::common::run_with_panic_policy;
use crate::engine::io::{SourceImage, SourceLoader};
use crate::engine::pipeline::{Pipeline, Thumbnail};
use crate::engine::pool::{self, Pool};
use crate::engine::raster::RasterEngine;
use crate::error::{OutcomeClass, Result};
use crate::ops::{TransformPlan, TransformRequest};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "thumbwright::service";

/// Terminal result of one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success(Thumbnail),
    Failure { class: OutcomeClass, message: String },
}

impl Outcome {
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success(_) => 200,
            Outcome::Failure { class, .. } => class.status(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        match self {
            Outcome::Success(thumb) => Some(thumb),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn class(&self) -> Option<OutcomeClass> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure { class, .. } => Some(*class),
        }
    }
}

impl From<Result<Thumbnail>> for Outcome {
    fn from(result: Result<Thumbnail>) -> Self {
        match result {
            Ok(thumb) => Outcome::Success(thumb),
            Err(err) => Outcome::Failure {
                class: err.class(),
                message: err.to_string(),
            },
        }
    }
}

/// Shared entry point for thumbnail requests.
pub struct Thumbnailer<E: ImageEngine = RasterEngine> {
    engine: E,
    config: ThumbnailConfig,
    pool: Arc<Pool>,
}

impl Thumbnailer<RasterEngine> {
    /// Production engine on the process-wide pool.
    ///
    /// The pool is sized by the first caller; later `workers` values are ignored.
    pub fn new(config: ThumbnailConfig) -> Self {
        let pool = pool::init_global(config.workers);
        Self::with_engine(RasterEngine::new(config.limits), config, pool)
    }
}

impl<E: ImageEngine> Thumbnailer<E> {
    pub fn with_engine(engine: E, config: ThumbnailConfig, pool: Arc<Pool>) -> Self {
        Self {
            engine,
            config,
            pool,
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Transform an already loaded source.
    pub fn run(&self, source: &SourceImage, plan: &TransformPlan) -> Result<Thumbnail> {
        let limits = &self.config.limits;
        limits.enforce_source_len(source.len())?;
        let bytes = source.as_bytes();
        let info = run_with_panic_policy("probe", || self.engine.probe(bytes))?;
        limits.enforce_dimensions(info.width, info.height)?;

        let started = Instant::now();
        let _permit = self.pool.acquire();
        let waited = started.elapsed();

        let options = self.config.pipeline_options();
        let thumb = run_with_panic_policy("pipeline", || {
            Pipeline::decode(&self.engine, bytes, &info, plan.scale_hint(), options)?
                .execute(plan)
        })?;

        tracing::debug!(
            target: LOG_TARGET,
            plan = %plan,
            width = thumb.width,
            height = thumb.height,
            wait_ms = waited.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "thumbnail rendered"
        );
        Ok(thumb)
    }

    /// Parse `suffix` and transform `source`.
    pub fn thumbnail(&self, source: &SourceImage, suffix: &str) -> Result<Thumbnail> {
        let plan = TransformPlan::parse(suffix)?;
        self.run(source, &plan)
    }

    /// Serve a full request path such as `/photo.jpg=s100x100`.
    pub fn handle(&self, path: &str, loader: &impl SourceLoader) -> Outcome {
        let result = TransformRequest::parse(path).and_then(|request| {
            let source = loader.load(&request.source)?;
            self.run(&source, &request.plan)
        });
        if let Err(err) = &result {
            match err.class() {
                OutcomeClass::Internal => {
                    tracing::error!(target: LOG_TARGET, path, error = %err, "request failed")
                }
                class => tracing::debug!(target: LOG_TARGET, path, %class, error = %err, "request rejected"),
            }
        }
        Outcome::from(result)
    }
}
