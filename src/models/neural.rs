//! # Neural Network Model
//!
//! Candle-based inference for the pretrained dense emotion classifier. The
//! artifact is a JSON manifest describing the layer stack next to a
//! safetensors file with the weights. The network is a plain
//! linear → ReLU → ... → linear → softmax stack; its input must be
//! standardized with the shared feature scaler, which is why the registry
//! marks the neural descriptor `requires_scaling`.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};
use serde::Deserialize;
use std::path::Path;

/// On-disk manifest for the neural artifact.
///
/// `weights` is resolved relative to the manifest's directory. Tensor names
/// follow `layer{i}.weight` / `layer{i}.bias`.
#[derive(Debug, Deserialize)]
pub struct NeuralManifest {
    pub weights: String,
    pub input_dim: usize,
    #[serde(default)]
    pub hidden: Vec<usize>,
    pub num_classes: usize,
}

/// A loaded dense softmax classifier.
pub struct NeuralModel {
    layers: Vec<Linear>,
    input_dim: usize,
    num_classes: usize,
}

impl NeuralModel {
    /// Load the network described by a manifest file.
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(manifest_path)
            .with_context(|| format!("reading neural manifest {}", manifest_path.display()))?;
        let manifest: NeuralManifest = serde_json::from_str(&raw)
            .with_context(|| format!("parsing neural manifest {}", manifest_path.display()))?;

        if manifest.input_dim == 0 || manifest.num_classes == 0 {
            anyhow::bail!(
                "neural manifest {} has zero input_dim or num_classes",
                manifest_path.display()
            );
        }

        let weights_path = manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&manifest.weights);

        // Inference is CPU-only; the artifacts are small dense layers
        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
        }
        .with_context(|| format!("mapping weights {}", weights_path.display()))?;

        // Layer sizes: input_dim -> hidden... -> num_classes
        let mut dims = Vec::with_capacity(manifest.hidden.len() + 2);
        dims.push(manifest.input_dim);
        dims.extend(manifest.hidden.iter().copied());
        dims.push(manifest.num_classes);

        let mut layers = Vec::with_capacity(dims.len() - 1);
        for i in 0..dims.len() - 1 {
            let layer = candle_nn::linear(dims[i], dims[i + 1], vb.pp(format!("layer{}", i)))
                .with_context(|| format!("loading layer{} ({}x{})", i, dims[i + 1], dims[i]))?;
            layers.push(layer);
        }

        Ok(Self {
            layers,
            input_dim: manifest.input_dim,
            num_classes: manifest.num_classes,
        })
    }

    /// Build a model from already-constructed layers (used by tests).
    pub fn from_layers(layers: Vec<Linear>, input_dim: usize, num_classes: usize) -> Self {
        Self {
            layers,
            input_dim,
            num_classes,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Forward pass over one (already scaled) feature vector.
    ///
    /// Returns the softmax output, one probability-like value per class.
    pub fn forward(&self, features: &[f32]) -> candle_core::Result<Vec<f32>> {
        let device = Device::Cpu;
        let mut x = Tensor::from_slice(features, (1, features.len()), &device)?;

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i != last {
                x = x.relu()?;
            }
        }

        let probs = ops::softmax(&x, 1)?;
        let row: Vec<f32> = probs.squeeze(0)?.to_vec1()?;
        Ok(row)
    }
}

impl std::fmt::Debug for NeuralModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeuralModel")
            .field("layers", &self.layers.len())
            .field("input_dim", &self.input_dim)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2-in/3-out single layer that strongly favors the class matching the
    /// hotter input feature.
    fn tiny_model() -> NeuralModel {
        let device = Device::Cpu;
        let weight = Tensor::from_slice(
            &[10.0f32, 0.0, 0.0, 10.0, -10.0, -10.0],
            (3, 2),
            &device,
        )
        .unwrap();
        let bias = Tensor::from_slice(&[0.0f32, 0.0, 0.0], 3, &device).unwrap();
        NeuralModel::from_layers(vec![Linear::new(weight, Some(bias))], 2, 3)
    }

    #[test]
    fn test_forward_produces_distribution() {
        let model = tiny_model();
        let probs = model.forward(&[1.0, 0.0]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[0] > probs[2]);
    }

    #[test]
    fn test_forward_is_deterministic() {
        let model = tiny_model();
        let a = model.forward(&[0.3, 0.7]).unwrap();
        let b = model.forward(&[0.3, 0.7]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_from_safetensors() {
        let dir = std::env::temp_dir().join(format!("neural-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

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
        candle_core::safetensors::save(&tensors, dir.join("net.safetensors")).unwrap();

        let manifest = r#"{
            "weights": "net.safetensors",
            "input_dim": 2,
            "hidden": [],
            "num_classes": 3
        }"#;
        std::fs::write(dir.join("Neural_Network.json"), manifest).unwrap();

        let model = NeuralModel::load(&dir.join("Neural_Network.json")).unwrap();
        assert_eq!(model.input_dim(), 2);
        assert_eq!(model.num_classes(), 3);
        let probs = model.forward(&[1.0, 0.0]).unwrap();
        assert_eq!(probs.len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
