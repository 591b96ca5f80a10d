//! # Error Handling
//!
//! Defines the prediction error taxonomy and how each failure is converted to
//! an HTTP response. Every error carries the pipeline stage it originated
//! from, so callers always see a structured `{type, stage, kind, message}`
//! body instead of an opaque exception.
//!
//! ## Error Categories:
//! - **InvalidRequest / UnsupportedFormat / InvalidTimeRange / UnknownModel**:
//!   Client sent something we refuse before doing expensive work (400 errors)
//! - **CorruptAudio**: The upload claimed a supported container but failed to
//!   decode (422)
//! - **FeatureExtraction**: The external feature toolkit timed out, exited
//!   non-zero, or produced output we could not parse (504/500)
//! - **Inference**: Dimension mismatch or a wrapped model-internal failure (500)
//! - **Internal**: Registry/label inconsistency or infrastructure failure (500)

use crate::pipeline::Stage;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure kinds of the external feature-extraction subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureExtractionKind {
    /// The subprocess exceeded the configured deadline and was killed
    Timeout,

    /// The subprocess exited non-zero or could not be spawned
    ToolkitFailure,

    /// The subprocess succeeded but its output did not parse into exactly
    /// the expected number of floats
    MalformedOutput,
}

impl FeatureExtractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureExtractionKind::Timeout => "timeout",
            FeatureExtractionKind::ToolkitFailure => "toolkit-failure",
            FeatureExtractionKind::MalformedOutput => "malformed-output",
        }
    }
}

/// Failure kinds of the model dispatch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceKind {
    /// Feature vector length did not match the model's expected dimension;
    /// the model was never invoked
    DimensionMismatch,

    /// The underlying model raised an error during scaling or inference
    ModelException,
}

impl InferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceKind::DimensionMismatch => "dimension-mismatch",
            InferenceKind::ModelException => "model-exception",
        }
    }
}

/// All the ways a prediction request can fail.
///
/// ## Design:
/// Each variant maps deterministically to the pipeline stage where it
/// originates (see [`PredictionError::stage`]); the HTTP layer never has to
/// guess where things went wrong. Variants hold human-readable detail only;
/// no model-specific error types leak to callers.
#[derive(Debug)]
pub enum PredictionError {
    /// The request body is not a usable prediction request (missing file,
    /// missing model name, unreadable multipart field)
    InvalidRequest(String),

    /// The filename extension is not one of the supported audio containers
    UnsupportedFormat(String),

    /// The upload failed to probe or decode as audio
    CorruptAudio(String),

    /// The chorus window violates `0 <= start < end <= duration`
    InvalidTimeRange(String),

    /// The requested model name is not in the registry
    UnknownModel(String),

    /// The external feature-extraction subprocess failed
    FeatureExtraction {
        kind: FeatureExtractionKind,
        message: String,
    },

    /// The model dispatch step failed
    Inference {
        kind: InferenceKind,
        message: String,
    },

    /// Registry/label inconsistency or other server-side failure
    Internal(String),
}

impl PredictionError {
    /// Pipeline stage this error originates from.
    ///
    /// The mapping is total and deterministic: an error kind can only arise
    /// in one stage of the linear pipeline.
    pub fn stage(&self) -> Stage {
        match self {
            PredictionError::InvalidRequest(_) => Stage::Received,
            PredictionError::UnknownModel(_) => Stage::ModelResolved,
            PredictionError::UnsupportedFormat(_) | PredictionError::CorruptAudio(_) => {
                Stage::Decoded
            }
            PredictionError::InvalidTimeRange(_) => Stage::Trimmed,
            PredictionError::FeatureExtraction { .. } => Stage::FeatureExtracted,
            PredictionError::Inference { .. } => Stage::Dispatched,
            PredictionError::Internal(_) => Stage::Normalized,
        }
    }

    /// Machine-readable error type for the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            PredictionError::InvalidRequest(_) => "invalid_request",
            PredictionError::UnsupportedFormat(_) => "unsupported_format",
            PredictionError::CorruptAudio(_) => "corrupt_audio",
            PredictionError::InvalidTimeRange(_) => "invalid_time_range",
            PredictionError::UnknownModel(_) => "unknown_model",
            PredictionError::FeatureExtraction { .. } => "feature_extraction_error",
            PredictionError::Inference { .. } => "inference_error",
            PredictionError::Internal(_) => "internal_error",
        }
    }

    /// Sub-kind string, present only for the kinded variants.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            PredictionError::FeatureExtraction { kind, .. } => Some(kind.as_str()),
            PredictionError::Inference { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for PredictionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            PredictionError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            PredictionError::CorruptAudio(msg) => write!(f, "Corrupt audio: {}", msg),
            PredictionError::InvalidTimeRange(msg) => write!(f, "Invalid time range: {}", msg),
            PredictionError::UnknownModel(name) => write!(f, "Unknown model: '{}'", name),
            PredictionError::FeatureExtraction { kind, message } => {
                write!(f, "Feature extraction failed ({}): {}", kind.as_str(), message)
            }
            PredictionError::Inference { kind, message } => {
                write!(f, "Inference failed ({}): {}", kind.as_str(), message)
            }
            PredictionError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for PredictionError {}

/// Converts prediction errors into the JSON error envelope.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "feature_extraction_error",
///     "kind": "timeout",
///     "stage": "feature_extracted",
///     "message": "feature extractor exceeded 30s deadline",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for PredictionError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::InvalidRequest(_)
            | PredictionError::UnsupportedFormat(_)
            | PredictionError::InvalidTimeRange(_)
            | PredictionError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            PredictionError::CorruptAudio(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::Timeout,
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            PredictionError::FeatureExtraction { .. }
            | PredictionError::Inference { .. }
            | PredictionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "kind": self.kind(),
                "stage": self.stage().as_str(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Infrastructure failures (blocking-pool shutdown, file I/O at startup, etc.)
/// surface as internal errors.
impl From<anyhow::Error> for PredictionError {
    fn from(err: anyhow::Error) -> Self {
        PredictionError::Internal(err.to_string())
    }
}

impl From<actix_web::error::BlockingError> for PredictionError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        PredictionError::Internal(format!("blocking task failed: {}", err))
    }
}

/// Type alias for Results that use the prediction error type.
pub type AppResult<T> = Result<T, PredictionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PredictionError::UnknownModel("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PredictionError::CorruptAudio("truncated".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::Timeout,
                message: "deadline".into()
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            PredictionError::Inference {
                kind: InferenceKind::DimensionMismatch,
                message: "6372 != 6373".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(
            PredictionError::UnknownModel("x".into()).stage(),
            Stage::ModelResolved
        );
        assert_eq!(
            PredictionError::InvalidTimeRange("5 >= 3".into()).stage(),
            Stage::Trimmed
        );
        assert_eq!(
            PredictionError::FeatureExtraction {
                kind: FeatureExtractionKind::MalformedOutput,
                message: "short row".into()
            }
            .stage(),
            Stage::FeatureExtracted
        );
        assert_eq!(
            PredictionError::Internal("label index out of range".into()).stage(),
            Stage::Normalized
        );
    }

    #[test]
    fn test_kind_is_none_for_unkinded_variants() {
        assert!(PredictionError::UnknownModel("x".into()).kind().is_none());
        assert_eq!(
            PredictionError::Inference {
                kind: InferenceKind::ModelException,
                message: "nan".into()
            }
            .kind(),
            Some("model-exception")
        );
    }
}
