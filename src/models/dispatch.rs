//! # Prediction Dispatcher
//!
//! Routes one feature vector through the model-specific strategy:
//!
//! 1. Verify the vector length against the descriptor's expected dimension;
//!    a mismatch never reaches the model
//! 2. Standardize with the shared scaler when the descriptor requires it
//! 3. Run kind-specific inference (classical predict/predict_proba, or a
//!    neural forward pass)
//! 4. Arg-max with a strictly-greater comparison, so score ties always
//!    resolve to the lowest class index
//! 5. Time only the inference step; decode and extraction costs are not
//!    part of `processing_time_ms`
//!
//! Any error the underlying model raises is wrapped as an `InferenceError`
//! of kind `model-exception`; candle's error type never crosses this
//! boundary.

use crate::error::{InferenceKind, PredictionError};
use crate::models::registry::{ModelArtifact, RegisteredModel};
use crate::models::scaler::FeatureScaler;
use crate::models::argmax;
use std::time::Instant;

/// Raw dispatch outcome, before label decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class index (still encoded; the normalizer decodes it)
    pub class_index: usize,

    /// Max per-class probability, absent for models without probability
    /// support; absence and 0.0 are deliberately distinguishable
    pub confidence: Option<f32>,

    /// Wall-clock duration of the inference step only, in milliseconds
    pub inference_ms: f64,
}

/// Run one feature vector through one registered model.
pub fn dispatch(
    model: &RegisteredModel,
    features: &[f32],
    scaler: &FeatureScaler,
) -> Result<Prediction, PredictionError> {
    let descriptor = &model.descriptor;

    if features.len() != descriptor.expected_dimension {
        return Err(PredictionError::Inference {
            kind: InferenceKind::DimensionMismatch,
            message: format!(
                "model '{}' expects {} features, got {}",
                descriptor.name,
                descriptor.expected_dimension,
                features.len()
            ),
        });
    }

    let scaled;
    let input: &[f32] = if descriptor.requires_scaling {
        scaled = scaler.transform(features);
        &scaled
    } else {
        features
    };

    let started = Instant::now();
    let (class_index, confidence) = match &model.artifact {
        ModelArtifact::Classical(classical) => {
            let class_index = classical.predict(input);
            let confidence = classical
                .predict_proba(input)
                .map(|probs| probs[class_index]);
            (class_index, confidence)
        }
        ModelArtifact::Neural(neural) => {
            let probs = neural.forward(input).map_err(|e| PredictionError::Inference {
                kind: InferenceKind::ModelException,
                message: format!("neural forward pass failed: {}", e),
            })?;
            let class_index = argmax(&probs);
            (class_index, Some(probs[class_index]))
        }
    };
    let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

    Ok(Prediction {
        class_index,
        confidence,
        inference_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classical::ClassicalModel;
    use crate::models::registry::{ModelDescriptor, ModelKind};
    use candle_core::{Device, Tensor};
    use candle_nn::Linear;

    fn scaler() -> FeatureScaler {
        FeatureScaler::from_parts(vec![1.0, 1.0], vec![2.0, 2.0]).unwrap()
    }

    fn classical_model(model: ClassicalModel, name: &str) -> RegisteredModel {
        let descriptor = ModelDescriptor {
            name: name.to_string(),
            kind: ModelKind::Classical,
            expected_dimension: model.expected_dimension(),
            requires_scaling: false,
            supports_probability: model.supports_probability(),
        };
        RegisteredModel {
            descriptor,
            artifact: ModelArtifact::Classical(model),
        }
    }

    fn neural_model() -> RegisteredModel {
        let device = Device::Cpu;
        let weight =
            Tensor::from_slice(&[10.0f32, 0.0, 0.0, 10.0], (2, 2), &device).unwrap();
        let model = crate::models::neural::NeuralModel::from_layers(
            vec![Linear::new(weight, None)],
            2,
            2,
        );
        RegisteredModel {
            descriptor: ModelDescriptor {
                name: "Neural_Network".to_string(),
                kind: ModelKind::Neural,
                expected_dimension: 2,
                requires_scaling: true,
                supports_probability: true,
            },
            artifact: ModelArtifact::Neural(model),
        }
    }

    #[test]
    fn test_dimension_mismatch_never_reaches_model() {
        let model = classical_model(
            ClassicalModel::LogisticRegression {
                coef: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                intercept: vec![0.0, 0.0],
            },
            "Logistic_Regression",
        );
        let err = dispatch(&model, &[1.0, 2.0, 3.0], &scaler()).unwrap_err();
        assert!(matches!(
            err,
            PredictionError::Inference {
                kind: InferenceKind::DimensionMismatch,
                ..
            }
        ));
    }

    #[test]
    fn test_classical_with_probability() {
        let model = classical_model(
            ClassicalModel::LogisticRegression {
                coef: vec![vec![5.0, 0.0], vec![0.0, 5.0]],
                intercept: vec![0.0, 0.0],
            },
            "Logistic_Regression",
        );
        let prediction = dispatch(&model, &[1.0, 0.0], &scaler()).unwrap();
        assert_eq!(prediction.class_index, 0);
        let confidence = prediction.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(confidence > 0.5);
        assert!(prediction.inference_ms >= 0.0);
    }

    #[test]
    fn test_classical_without_probability_has_absent_confidence() {
        let model = classical_model(
            ClassicalModel::LinearSvm {
                coef: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                intercept: vec![0.0, 0.0],
            },
            "SVM",
        );
        let prediction = dispatch(&model, &[1.0, 0.0], &scaler()).unwrap();
        assert_eq!(prediction.class_index, 0);
        // Absent, not 0.0
        assert!(prediction.confidence.is_none());
    }

    #[test]
    fn test_neural_scaling_is_applied() {
        let model = neural_model();
        // Raw [3.0, 1.0] standardizes to [1.0, 0.0] with mean=1, scale=2,
        // so class 0 must win even though both raw features are positive.
        let prediction = dispatch(&model, &[3.0, 1.0], &scaler()).unwrap();
        assert_eq!(prediction.class_index, 0);
        let confidence = prediction.confidence.unwrap();
        assert!(confidence > 0.5 && confidence <= 1.0);
    }

    #[test]
    fn test_dispatch_is_deterministic() {
        let model = neural_model();
        let a = dispatch(&model, &[0.2, 0.9], &scaler()).unwrap();
        let b = dispatch(&model, &[0.2, 0.9], &scaler()).unwrap();
        assert_eq!(a.class_index, b.class_index);
        assert_eq!(a.confidence, b.confidence);
    }
}
