//! # Feature Scaler
//!
//! Per-feature standardization for the neural network: `(x - mean) / scale`
//! with the mean/scale arrays the network was trained against. One shared
//! instance is loaded at startup from `nn_scaler.json`; models whose
//! descriptor sets `requires_scaling` run their input through it, everything
//! else sees the raw feature vector.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

/// Stored StandardScaler parameters.
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl FeatureScaler {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scaler from {}", path.display()))?;
        let artifact: ScalerArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parsing scaler {}", path.display()))?;
        Self::from_parts(artifact.mean, artifact.scale)
    }

    pub fn from_parts(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self> {
        if mean.len() != scale.len() {
            anyhow::bail!(
                "scaler mean/scale length mismatch: {} vs {}",
                mean.len(),
                scale.len()
            );
        }
        if mean.is_empty() {
            anyhow::bail!("scaler artifact is empty");
        }
        if scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            anyhow::bail!("scaler contains zero or non-finite scale entries");
        }
        Ok(Self { mean, scale })
    }

    /// Number of features this scaler was fitted on.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a feature vector.
    ///
    /// Callers must have verified the dimension already (the dispatcher's
    /// length check runs before any preprocessing), so a mismatch here is a
    /// programming error.
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        debug_assert_eq!(features.len(), self.mean.len());
        features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&x, (&m, &s))| (x - m) / s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_standardizes() {
        let scaler = FeatureScaler::from_parts(vec![1.0, 2.0], vec![2.0, 0.5]).unwrap();
        let out = scaler.transform(&[3.0, 2.0]);
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn test_rejects_mismatched_and_degenerate_artifacts() {
        assert!(FeatureScaler::from_parts(vec![1.0], vec![1.0, 2.0]).is_err());
        assert!(FeatureScaler::from_parts(vec![], vec![]).is_err());
        assert!(FeatureScaler::from_parts(vec![1.0], vec![0.0]).is_err());
    }
}
