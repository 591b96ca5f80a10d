//! # Prediction Pipeline
//!
//! The per-request pipeline that turns uploaded audio bytes into a
//! `PredictionResult`. One linear pass, no retries:
//!
//! `Received → Decoded → (Trimmed) → FeatureExtracted → ModelResolved →
//! Dispatched → Normalized → Completed`, with `Failed` reachable from any
//! state. Every error carries the stage it originated from.
//!
//! ## Ordering notes:
//! The registry lookup and chorus-window relationship checks run before any
//! decoding or extraction work even though `ModelResolved` sits later in the
//! nominal progression: unknown models and inverted windows must fail
//! before a single expensive step runs.
//!
//! ## Concurrency:
//! Each request is an independent pipeline instance; the only shared state
//! is the read-only registry. Decode and inference run on the blocking pool
//! so actix workers stay free; the extractor subprocess is bounded by its
//! own semaphore.

pub mod features;
pub mod ingest;
pub mod result;

pub use features::{FeatureExtractor, FeatureVector};
pub use ingest::{AudioClip, ChorusWindow};
pub use result::PredictionResult;

use crate::error::{AppResult, PredictionError};
use crate::models::{dispatch, ModelRegistry};
use actix_web::web;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// States of the per-request pipeline. `Completed` and `Failed` are
/// terminal; errors record which stage they originated from via
/// [`crate::error::PredictionError::stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Decoded,
    Trimmed,
    FeatureExtracted,
    ModelResolved,
    Dispatched,
    Normalized,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::Trimmed => "trimmed",
            Stage::FeatureExtracted => "feature_extracted",
            Stage::ModelResolved => "model_resolved",
            Stage::Dispatched => "dispatched",
            Stage::Normalized => "normalized",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

/// Everything the HTTP layer hands to the pipeline.
#[derive(Debug)]
pub struct PredictionRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub model_name: String,
    pub chorus_start: Option<f64>,
    pub chorus_end: Option<f64>,
}

/// Execute one prediction request end to end.
pub async fn run(
    registry: &Arc<ModelRegistry>,
    extractor: &FeatureExtractor,
    request: PredictionRequest,
) -> AppResult<PredictionResult> {
    let mut stage = Stage::Received;

    // Cheap fail-fast validations before any decode or subprocess work:
    // the model must exist and the window must be internally consistent.
    registry.lookup(&request.model_name)?;
    let window = ChorusWindow::from_options(request.chorus_start, request.chorus_end)?;

    debug!(
        model = %request.model_name,
        filename = %request.filename,
        bytes = request.bytes.len(),
        window = ?window,
        stage = stage.as_str(),
        "Prediction request accepted"
    );

    // Decode, trim and write the scratch WAV off the async workers.
    let bytes = request.bytes;
    let filename = request.filename.clone();
    let (scratch, duration_secs) = web::block(move || {
        let clip = ingest::ingest(&bytes, &filename, window)?;
        let duration = clip.duration_secs();
        let scratch = ingest::write_scratch_wav(&clip)?;
        Ok::<_, PredictionError>((scratch, duration))
    })
    .await??;
    stage = if window.is_some() {
        Stage::Trimmed
    } else {
        Stage::Decoded
    };
    debug!(duration_secs, stage = stage.as_str(), "Audio decoded");

    // Extraction is the dominant cost; the scratch guard stays alive until
    // the subprocess is done with the file.
    let feature_vector = extractor.extract(scratch.path()).await?;
    drop(scratch);
    stage = Stage::FeatureExtracted;
    debug!(
        dimension = feature_vector.len(),
        stage = stage.as_str(),
        "Features extracted"
    );

    // Dispatch and normalize on the blocking pool; the registry Arc crosses
    // the thread boundary, lookups stay lock-free.
    let registry = Arc::clone(registry);
    let model_name = request.model_name.clone();
    let prediction_result = web::block(move || {
        // Cannot fail: presence was checked up front and the registry is
        // immutable, but the re-lookup keeps this closure self-contained.
        let model = registry.lookup(&model_name)?;
        let prediction = dispatch(model, &feature_vector, registry.nn_scaler())?;
        result::normalize(registry.labels(), &model_name, &prediction)
    })
    .await??;
    stage = Stage::Completed;

    info!(
        model = %prediction_result.model_used,
        emotion = %prediction_result.emotion,
        confidence = ?prediction_result.confidence,
        processing_time_ms = prediction_result.processing_time_ms,
        stage = stage.as_str(),
        "Prediction completed"
    );

    Ok(prediction_result)
}
