//! # Model Layer
//!
//! Everything that lives for the whole process: the pretrained model
//! artifacts, the shared label encoder and the shared neural-net scaler,
//! plus the dispatch step that routes a feature vector through the right
//! preprocessing/inference strategy.
//!
//! ## Key Components:
//! - **Registry**: loads all artifacts once at startup, precomputes
//!   descriptors, immutable afterwards
//! - **Classical models**: pure-Rust inference for the sklearn-style family
//! - **Neural model**: candle-based dense softmax network
//! - **Dispatcher**: dimension check → optional scaling → inference →
//!   deterministic arg-max, with inference-only timing

pub mod classical;
pub mod dispatch;
pub mod labels;
pub mod neural;
pub mod registry;
pub mod scaler;

pub use dispatch::{dispatch, Prediction};
pub use labels::LabelEncoder;
pub use registry::{ModelDescriptor, ModelKind, ModelRegistry, RegisteredModel};
pub use scaler::FeatureScaler;

/// Index of the maximum score; ties resolve to the lowest index because the
/// comparison is strictly greater.
pub(crate) fn argmax(scores: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &s) in scores.iter().enumerate() {
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&[1.0, 1.0, 1.0]), 0);
        assert_eq!(argmax(&[0.0]), 0);
    }
}
