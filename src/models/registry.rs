//! # Model Registry
//!
//! Loads every pretrained artifact once at startup and serves read-only
//! lookups for the rest of the process lifetime. Holds the model artifacts,
//! the shared label encoder and the shared neural-net scaler.
//!
//! ## Key Properties:
//! - **Built once**: the registry is constructed before the HTTP server
//!   starts and never mutated afterwards: no locks, no hot-reload
//! - **Precomputed descriptors**: kind, expected dimension, scaling
//!   requirement and probability support come from static knowledge of the
//!   artifact type, never inferred per-request
//! - **Fail-fast startup**: a missing directory, encoder, scaler or any
//!   structurally invalid artifact refuses to start the process
//! - **Cheap lookups**: `lookup(name)` is the very first check of a
//!   prediction request, before any decoding or extraction work

use crate::error::PredictionError;
use crate::models::classical::ClassicalModel;
use crate::models::labels::LabelEncoder;
use crate::models::neural::NeuralModel;
use crate::models::scaler::FeatureScaler;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Reserved support files that are not model artifacts.
const LABEL_ENCODER_FILE: &str = "label_encoder.json";
const SCALER_FILE: &str = "nn_scaler.json";

/// Broad model family, driving the dispatch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classical,
    Neural,
}

/// Static metadata for one registered model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub kind: ModelKind,
    pub expected_dimension: usize,
    pub requires_scaling: bool,
    pub supports_probability: bool,
}

/// A loaded model artifact.
#[derive(Debug)]
pub enum ModelArtifact {
    Classical(ClassicalModel),
    Neural(NeuralModel),
}

/// Descriptor plus the artifact it describes.
#[derive(Debug)]
pub struct RegisteredModel {
    pub descriptor: ModelDescriptor,
    pub artifact: ModelArtifact,
}

/// Process-wide, read-only model store.
pub struct ModelRegistry {
    models: HashMap<String, RegisteredModel>,
    names: Vec<String>,
    labels: LabelEncoder,
    nn_scaler: FeatureScaler,
    feature_dimension: usize,
}

impl ModelRegistry {
    /// Load all artifacts from the model directory.
    ///
    /// ## Directory layout:
    /// - `label_encoder.json`, `nn_scaler.json`: shared support files
    /// - `<Name>.json` with an `algorithm` tag: classical model
    /// - `<Name>.json` with a `weights` field: neural manifest (its
    ///   safetensors file sits next to it)
    ///
    /// Model names are file stems with spaces replaced by underscores, the
    /// same normalization the training side used when exporting.
    pub fn load(model_dir: &Path, feature_dimension: usize) -> Result<Self> {
        if !model_dir.is_dir() {
            anyhow::bail!("model directory not found at {}", model_dir.display());
        }

        let labels = LabelEncoder::load(&model_dir.join(LABEL_ENCODER_FILE))?;
        let nn_scaler = FeatureScaler::load(&model_dir.join(SCALER_FILE))?;

        if nn_scaler.dimension() != feature_dimension {
            anyhow::bail!(
                "scaler dimension {} does not match feature dimension {}",
                nn_scaler.dimension(),
                feature_dimension
            );
        }

        let mut models = HashMap::new();
        for entry in std::fs::read_dir(model_dir)
            .with_context(|| format!("listing model directory {}", model_dir.display()))?
        {
            let path = entry?.path();
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };

            // Skip support files and non-manifest files (weights, notes, ...)
            if file_name == LABEL_ENCODER_FILE || file_name == SCALER_FILE {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let name = stem.replace(' ', "_");

            let registered = load_model_artifact(&path, &name, feature_dimension, &labels)?;
            info!(
                model = %name,
                kind = ?registered.descriptor.kind,
                supports_probability = registered.descriptor.supports_probability,
                "Registered model"
            );
            models.insert(name, registered);
        }

        if models.is_empty() {
            anyhow::bail!("no model artifacts found in {}", model_dir.display());
        }

        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();

        info!(
            count = names.len(),
            labels = labels.num_classes(),
            "Model registry initialized"
        );

        Ok(Self {
            models,
            names,
            labels,
            nn_scaler,
            feature_dimension,
        })
    }

    /// Resolve a model by name. This is the fail-fast entry point for every
    /// prediction request.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredModel, PredictionError> {
        self.models
            .get(name)
            .ok_or_else(|| PredictionError::UnknownModel(name.to_string()))
    }

    /// Sorted names of all registered models.
    pub fn list_names(&self) -> &[String] {
        &self.names
    }

    /// Number of loaded models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The shared label encoder.
    pub fn labels(&self) -> &LabelEncoder {
        &self.labels
    }

    /// The shared neural-net feature scaler.
    pub fn nn_scaler(&self) -> &FeatureScaler {
        &self.nn_scaler
    }

    /// K: the dimension every feature vector and model must agree on.
    pub fn feature_dimension(&self) -> usize {
        self.feature_dimension
    }

    /// Descriptors of all registered models, in name order.
    pub fn descriptors(&self) -> Vec<&ModelDescriptor> {
        self.names
            .iter()
            .map(|n| &self.models[n].descriptor)
            .collect()
    }

    #[cfg(test)]
    pub fn from_parts(
        models: HashMap<String, RegisteredModel>,
        labels: LabelEncoder,
        nn_scaler: FeatureScaler,
        feature_dimension: usize,
    ) -> Self {
        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();
        Self {
            models,
            names,
            labels,
            nn_scaler,
            feature_dimension,
        }
    }
}

/// Load one model manifest and build its descriptor.
fn load_model_artifact(
    path: &Path,
    name: &str,
    feature_dimension: usize,
    labels: &LabelEncoder,
) -> Result<RegisteredModel> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading model artifact {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing model artifact {}", path.display()))?;

    if value.get("algorithm").is_some() {
        let model: ClassicalModel = serde_json::from_value(value)
            .with_context(|| format!("decoding classical artifact {}", path.display()))?;
        model
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid artifact {}: {}", path.display(), e))?;

        if model.expected_dimension() != feature_dimension {
            anyhow::bail!(
                "model '{}' expects {} features, registry is configured for {}",
                name,
                model.expected_dimension(),
                feature_dimension
            );
        }
        if model.num_classes() > labels.num_classes() {
            anyhow::bail!(
                "model '{}' predicts {} classes but the label encoder only knows {}",
                name,
                model.num_classes(),
                labels.num_classes()
            );
        }

        let descriptor = ModelDescriptor {
            name: name.to_string(),
            kind: ModelKind::Classical,
            expected_dimension: model.expected_dimension(),
            requires_scaling: false,
            supports_probability: model.supports_probability(),
        };
        Ok(RegisteredModel {
            descriptor,
            artifact: ModelArtifact::Classical(model),
        })
    } else if value.get("weights").is_some() {
        let model = NeuralModel::load(path)?;

        if model.input_dim() != feature_dimension {
            anyhow::bail!(
                "neural model '{}' expects {} features, registry is configured for {}",
                name,
                model.input_dim(),
                feature_dimension
            );
        }
        if model.num_classes() != labels.num_classes() {
            anyhow::bail!(
                "neural model '{}' outputs {} classes but the label encoder knows {}",
                name,
                model.num_classes(),
                labels.num_classes()
            );
        }

        let descriptor = ModelDescriptor {
            name: name.to_string(),
            kind: ModelKind::Neural,
            expected_dimension: model.input_dim(),
            // The network was trained on standardized features
            requires_scaling: true,
            supports_probability: true,
        };
        Ok(RegisteredModel {
            descriptor,
            artifact: ModelArtifact::Neural(model),
        })
    } else {
        anyhow::bail!(
            "artifact {} is neither a classical model (algorithm tag) nor a neural manifest (weights field)",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};
    use std::path::PathBuf;

    /// Write a complete artifact directory: encoder + scaler + two classical
    /// models + one neural model, all with feature dimension 2 and 3 classes.
    fn write_artifact_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("registry-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(
            dir.join("label_encoder.json"),
            r#"{"classes": ["angry", "happy", "sad"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("nn_scaler.json"),
            r#"{"mean": [0.0, 0.0], "scale": [1.0, 1.0]}"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("KNN.json"),
            r#"{
                "algorithm": "k_nearest_neighbors",
                "k": 1,
                "train_features": [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]],
                "train_labels": [0, 1, 2]
            }"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("SVM.json"),
            r#"{
                "algorithm": "linear_svm",
                "coef": [[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]],
                "intercept": [0.0, 0.0, 0.0]
            }"#,
        )
        .unwrap();

        let device = Device::Cpu;
        let mut tensors = std::collections::HashMap::new();
        tensors.insert(
            "layer0.weight".to_string(),
            Tensor::from_slice(&[1.0f32, 0.0, 0.0, 1.0, 0.5, 0.5], (3, 2), &device).unwrap(),
        );
        tensors.insert(
            "layer0.bias".to_string(),
            Tensor::from_slice(&[0.0f32, 0.0, 0.0], 3, &device).unwrap(),
        );
        candle_core::safetensors::save(&tensors, dir.join("Neural_Network.safetensors")).unwrap();
        std::fs::write(
            dir.join("Neural_Network.json"),
            r#"{
                "weights": "Neural_Network.safetensors",
                "input_dim": 2,
                "hidden": [],
                "num_classes": 3
            }"#,
        )
        .unwrap();

        dir
    }

    #[test]
    fn test_load_registry_and_lookup() {
        let dir = write_artifact_dir();
        let registry = ModelRegistry::load(&dir, 2).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.list_names(), &["KNN", "Neural_Network", "SVM"]);
        assert_eq!(registry.labels().num_classes(), 3);
        assert_eq!(registry.feature_dimension(), 2);

        let knn = registry.lookup("KNN").unwrap();
        assert_eq!(knn.descriptor.kind, ModelKind::Classical);
        assert!(knn.descriptor.supports_probability);
        assert!(!knn.descriptor.requires_scaling);

        let svm = registry.lookup("SVM").unwrap();
        assert!(!svm.descriptor.supports_probability);

        let nn = registry.lookup("Neural_Network").unwrap();
        assert_eq!(nn.descriptor.kind, ModelKind::Neural);
        assert!(nn.descriptor.requires_scaling);
        assert!(nn.descriptor.supports_probability);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_lookup_unknown_model() {
        let dir = write_artifact_dir();
        let registry = ModelRegistry::load(&dir, 2).unwrap();

        let err = registry.lookup("DoesNotExist").unwrap_err();
        assert!(matches!(err, PredictionError::UnknownModel(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dimension_mismatch_refuses_to_load() {
        let dir = write_artifact_dir();
        // Registry configured for K=5, artifacts are 2-dimensional
        assert!(ModelRegistry::load(&dir, 5).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_directory_refuses_to_load() {
        let missing = std::env::temp_dir().join("registry-test-does-not-exist");
        assert!(ModelRegistry::load(&missing, 2).is_err());
    }
}
