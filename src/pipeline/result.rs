//! # Result Normalization
//!
//! The last pipeline step: decode the predicted class index back to its
//! emotion name through the shared label encoder and assemble the final
//! result record. Touches no shared state.

use crate::error::PredictionError;
use crate::models::dispatch::Prediction;
use crate::models::labels::LabelEncoder;
use serde::Serialize;

/// The single record exposed to callers of the prediction pipeline.
///
/// `confidence` is omitted from the JSON entirely when the model has no
/// probability support; absence and 0.0 mean different things.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub emotion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub model_used: String,
    pub processing_time_ms: f64,
    pub timestamp: String,
}

/// Decode the class index and assemble the result record.
///
/// An out-of-range index means the model and the label encoder disagree,
/// an `InternalError`, not a user problem.
pub fn normalize(
    labels: &LabelEncoder,
    model_name: &str,
    prediction: &Prediction,
) -> Result<PredictionResult, PredictionError> {
    let emotion = labels.decode(prediction.class_index)?.to_string();

    Ok(PredictionResult {
        emotion,
        confidence: prediction.confidence,
        model_used: model_name.to_string(),
        processing_time_ms: prediction.inference_ms,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelEncoder {
        LabelEncoder::from_classes(vec![
            "angry".to_string(),
            "happy".to_string(),
            "sad".to_string(),
        ])
    }

    #[test]
    fn test_normalize_decodes_label() {
        let prediction = Prediction {
            class_index: 1,
            confidence: Some(0.87),
            inference_ms: 4.2,
        };
        let result = normalize(&labels(), "KNN", &prediction).unwrap();
        assert_eq!(result.emotion, "happy");
        assert_eq!(result.confidence, Some(0.87));
        assert_eq!(result.model_used, "KNN");
        assert_eq!(result.processing_time_ms, 4.2);
        assert!(!result.timestamp.is_empty());
    }

    #[test]
    fn test_absent_confidence_is_omitted_from_json() {
        let prediction = Prediction {
            class_index: 0,
            confidence: None,
            inference_ms: 1.0,
        };
        let result = normalize(&labels(), "SVM", &prediction).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("confidence").is_none());
        assert_eq!(json["emotion"], "angry");
    }

    #[test]
    fn test_out_of_range_index_is_internal_error() {
        let prediction = Prediction {
            class_index: 9,
            confidence: None,
            inference_ms: 1.0,
        };
        let err = normalize(&labels(), "KNN", &prediction).unwrap_err();
        assert!(matches!(err, PredictionError::Internal(_)));
    }
}
