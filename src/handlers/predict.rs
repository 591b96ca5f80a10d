//! # Prediction Endpoint
//!
//! `POST /api/predict` accepts a multipart form and runs the full prediction
//! pipeline:
//!
//! - `file`: the audio upload (WAV or MP3), required
//! - `model_name`: registry key of the model to use, required
//! - `chorus_start` / `chorus_end`: optional trim window in seconds; both or
//!   neither must be present
//!
//! ## Response:
//! ```json
//! {
//!   "emotion": "happy",
//!   "confidence": 0.87,
//!   "model_used": "Random_Forest",
//!   "processing_time_ms": 12.4,
//!   "timestamp": "2025-01-01T12:00:00Z"
//! }
//! ```
//! `confidence` is omitted for models without probability support.

use crate::error::PredictionError;
use crate::pipeline::{self, PredictionRequest};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use tracing::debug;

/// Uploads past this size are rejected before decoding.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, PredictionError> {
    let form = parse_form(payload).await?;

    let request = PredictionRequest {
        bytes: form.file_bytes,
        filename: form.filename,
        model_name: form.model_name,
        chorus_start: form.chorus_start,
        chorus_end: form.chorus_end,
    };

    let result = pipeline::run(&state.registry, &state.extractor, request).await?;
    Ok(HttpResponse::Ok().json(result))
}

struct PredictForm {
    file_bytes: Vec<u8>,
    filename: String,
    model_name: String,
    chorus_start: Option<f64>,
    chorus_end: Option<f64>,
}

/// Pull the expected fields out of the multipart stream.
///
/// Unknown fields are read and ignored so clients can send extras without
/// breaking. Field-level failures are client errors, not server errors.
async fn parse_form(mut payload: Multipart) -> Result<PredictForm, PredictionError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut model_name: Option<String> = None;
    let mut chorus_start: Option<f64> = None;
    let mut chorus_end: Option<f64> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|e| PredictionError::InvalidRequest(format!("multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .ok_or_else(|| {
                PredictionError::InvalidRequest("multipart field without a name".to_string())
            })?
            .to_string();

        match field_name.as_str() {
            "file" => {
                filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|s| s.to_string());

                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        PredictionError::InvalidRequest(format!("upload interrupted: {}", e))
                    })?;
                    if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                        return Err(PredictionError::InvalidRequest(format!(
                            "file exceeds the {} MB upload limit",
                            MAX_UPLOAD_BYTES / (1024 * 1024)
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file_bytes = Some(bytes);
            }
            "model_name" => {
                model_name = Some(read_text_field(&mut field, "model_name").await?);
            }
            "chorus_start" => {
                chorus_start = Some(read_seconds_field(&mut field, "chorus_start").await?);
            }
            "chorus_end" => {
                chorus_end = Some(read_seconds_field(&mut field, "chorus_end").await?);
            }
            other => {
                debug!(field = other, "Ignoring unexpected multipart field");
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| {
                        PredictionError::InvalidRequest(format!("multipart error: {}", e))
                    })?;
                }
            }
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| {
        PredictionError::InvalidRequest("missing required field 'file'".to_string())
    })?;
    if file_bytes.is_empty() {
        return Err(PredictionError::InvalidRequest(
            "uploaded file is empty".to_string(),
        ));
    }
    let model_name = model_name.ok_or_else(|| {
        PredictionError::InvalidRequest("missing required field 'model_name'".to_string())
    })?;

    Ok(PredictForm {
        file_bytes,
        filename: filename.unwrap_or_else(|| "upload".to_string()),
        model_name,
        chorus_start,
        chorus_end,
    })
}

async fn read_text_field(
    field: &mut actix_multipart::Field,
    name: &str,
) -> Result<String, PredictionError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk
            .map_err(|e| PredictionError::InvalidRequest(format!("multipart error: {}", e)))?;
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|_| PredictionError::InvalidRequest(format!("field '{}' is not UTF-8", name)))
}

async fn read_seconds_field(
    field: &mut actix_multipart::Field,
    name: &str,
) -> Result<f64, PredictionError> {
    let text = read_text_field(field, name).await?;
    text.parse().map_err(|_| {
        PredictionError::InvalidTimeRange(format!("field '{}' is not a number: '{}'", name, text))
    })
}
