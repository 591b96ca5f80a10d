//! # Label Encoder
//!
//! The shared bidirectional mapping between emotion names and integer class
//! indices. One instance is loaded at startup from `label_encoder.json` and
//! shared read-only by every model; classical and neural predictions both
//! resolve through it.

use crate::error::PredictionError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// On-disk artifact: the ordered class list.
///
/// Index position in `classes` *is* the class index, matching how the
/// training pipeline encoded labels.
#[derive(Debug, Deserialize)]
struct LabelEncoderArtifact {
    classes: Vec<String>,
}

/// Emotion-name ↔ class-index mapping.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading label encoder from {}", path.display()))?;
        let artifact: LabelEncoderArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parsing label encoder {}", path.display()))?;

        if artifact.classes.is_empty() {
            anyhow::bail!("label encoder {} has no classes", path.display());
        }

        Ok(Self {
            classes: artifact.classes,
        })
    }

    #[cfg(test)]
    pub fn from_classes(classes: Vec<String>) -> Self {
        Self { classes }
    }

    /// Decode a predicted class index into its emotion name.
    ///
    /// An out-of-range index means a model produced a class the encoder does
    /// not know: a registry/model inconsistency, not a user error.
    pub fn decode(&self, index: usize) -> Result<&str, PredictionError> {
        self.classes
            .get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                PredictionError::Internal(format!(
                    "predicted class index {} out of range (encoder knows {} labels)",
                    index,
                    self.classes.len()
                ))
            })
    }

    /// Class index for an emotion name, if known.
    pub fn encode(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == name)
    }

    /// Number of known classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// The full ordered label set.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}
