//! # Classical Estimators
//!
//! Pure-Rust inference for the classical model family. Each pretrained
//! artifact is a JSON file tagged with its algorithm; the variants here cover
//! the full deployed set: k-nearest-neighbors, multinomial logistic
//! regression, linear SVM (one-vs-rest), decision tree, random forest and
//! Gaussian naive Bayes.
//!
//! ## Probability support:
//! Whether an algorithm can produce a per-class distribution is a static
//! property of the algorithm, not something probed per request:
//! - KNN → neighbor vote fractions
//! - logistic regression → softmax over decision scores
//! - decision tree / random forest → (averaged) leaf distributions
//! - Gaussian NB → normalized joint log-likelihood
//! - linear SVM → **none** (uncalibrated margins are not probabilities)
//!
//! Ties always resolve to the lowest class index (strictly-greater arg-max).

use crate::models::argmax;
use serde::Deserialize;

/// One node of a serialized decision tree.
///
/// `feature < 0` marks a leaf; `value` holds the training-class distribution
/// at that node. Internal nodes route `x[feature] <= threshold` left,
/// otherwise right.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    pub feature: i32,
    pub threshold: f32,
    pub left: usize,
    pub right: usize,
    pub value: Vec<f32>,
}

/// A serialized decision tree: nodes in preorder, root at index 0.
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub n_features: usize,
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk the tree and return the normalized class distribution of the
    /// reached leaf.
    fn leaf_distribution(&self, x: &[f32]) -> Vec<f32> {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.feature < 0 {
                return normalize(&node.value);
            }
            let feature = node.feature as usize;
            idx = if x[feature] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    fn num_classes(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.value.len())
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.feature >= 0 {
                if node.feature as usize >= self.n_features {
                    return Err(format!("node {} splits on feature {} >= {}", i, node.feature, self.n_features));
                }
                if node.left >= self.nodes.len() || node.right >= self.nodes.len() {
                    return Err(format!("node {} has out-of-range children", i));
                }
                // Children must point forward, otherwise traversal can loop
                if node.left <= i || node.right <= i {
                    return Err(format!("node {} has backward child links", i));
                }
            } else if node.value.is_empty() {
                return Err(format!("leaf {} has empty class distribution", i));
            }
        }
        Ok(())
    }
}

/// The classical model family, tagged by algorithm in the JSON artifact.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClassicalModel {
    /// k-nearest-neighbors over the stored training set
    KNearestNeighbors {
        k: usize,
        train_features: Vec<Vec<f32>>,
        train_labels: Vec<usize>,
    },

    /// Multinomial logistic regression (softmax over linear scores)
    LogisticRegression {
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    },

    /// One-vs-rest linear SVM; uncalibrated, so no probabilities
    LinearSvm {
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    },

    /// Single decision tree
    DecisionTree { tree: Tree },

    /// Random forest: probability-averaged decision trees
    RandomForest { trees: Vec<Tree> },

    /// Gaussian naive Bayes
    GaussianNaiveBayes {
        theta: Vec<Vec<f32>>,
        var: Vec<Vec<f32>>,
        priors: Vec<f32>,
    },
}

impl ClassicalModel {
    /// Feature dimension this model was trained on.
    pub fn expected_dimension(&self) -> usize {
        match self {
            ClassicalModel::KNearestNeighbors { train_features, .. } => {
                train_features.first().map(|v| v.len()).unwrap_or(0)
            }
            ClassicalModel::LogisticRegression { coef, .. }
            | ClassicalModel::LinearSvm { coef, .. } => {
                coef.first().map(|v| v.len()).unwrap_or(0)
            }
            ClassicalModel::DecisionTree { tree } => tree.n_features,
            ClassicalModel::RandomForest { trees } => {
                trees.first().map(|t| t.n_features).unwrap_or(0)
            }
            ClassicalModel::GaussianNaiveBayes { theta, .. } => {
                theta.first().map(|v| v.len()).unwrap_or(0)
            }
        }
    }

    /// Number of classes this model can predict.
    pub fn num_classes(&self) -> usize {
        match self {
            ClassicalModel::KNearestNeighbors { train_labels, .. } => {
                train_labels.iter().map(|&l| l + 1).max().unwrap_or(0)
            }
            ClassicalModel::LogisticRegression { coef, .. }
            | ClassicalModel::LinearSvm { coef, .. } => coef.len(),
            ClassicalModel::DecisionTree { tree } => tree.num_classes(),
            ClassicalModel::RandomForest { trees } => {
                trees.iter().map(|t| t.num_classes()).max().unwrap_or(0)
            }
            ClassicalModel::GaussianNaiveBayes { theta, .. } => theta.len(),
        }
    }

    /// Whether this algorithm produces a per-class probability distribution.
    pub fn supports_probability(&self) -> bool {
        !matches!(self, ClassicalModel::LinearSvm { .. })
    }

    /// Structural validation, run once at registry load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ClassicalModel::KNearestNeighbors {
                k,
                train_features,
                train_labels,
            } => {
                if *k == 0 {
                    return Err("knn artifact has k = 0".to_string());
                }
                if train_features.is_empty() {
                    return Err("knn artifact has no training vectors".to_string());
                }
                if train_features.len() != train_labels.len() {
                    return Err(format!(
                        "knn artifact has {} vectors but {} labels",
                        train_features.len(),
                        train_labels.len()
                    ));
                }
                let dim = train_features[0].len();
                if train_features.iter().any(|v| v.len() != dim) {
                    return Err("knn training vectors have inconsistent dimensions".to_string());
                }
                Ok(())
            }
            ClassicalModel::LogisticRegression { coef, intercept }
            | ClassicalModel::LinearSvm { coef, intercept } => {
                if coef.is_empty() {
                    return Err("linear artifact has no coefficient rows".to_string());
                }
                if coef.len() != intercept.len() {
                    return Err(format!(
                        "linear artifact has {} coefficient rows but {} intercepts",
                        coef.len(),
                        intercept.len()
                    ));
                }
                let dim = coef[0].len();
                if coef.iter().any(|row| row.len() != dim) {
                    return Err("coefficient rows have inconsistent dimensions".to_string());
                }
                Ok(())
            }
            ClassicalModel::DecisionTree { tree } => tree.validate(),
            ClassicalModel::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("forest artifact has no trees".to_string());
                }
                for tree in trees {
                    tree.validate()?;
                }
                let dim = trees[0].n_features;
                if trees.iter().any(|t| t.n_features != dim) {
                    return Err("forest trees have inconsistent feature counts".to_string());
                }
                Ok(())
            }
            ClassicalModel::GaussianNaiveBayes { theta, var, priors } => {
                if theta.is_empty() {
                    return Err("gaussian nb artifact has no classes".to_string());
                }
                if theta.len() != var.len() || theta.len() != priors.len() {
                    return Err("gaussian nb theta/var/priors shapes disagree".to_string());
                }
                let dim = theta[0].len();
                if theta.iter().chain(var.iter()).any(|row| row.len() != dim) {
                    return Err("gaussian nb rows have inconsistent dimensions".to_string());
                }
                if var.iter().flatten().any(|&v| v <= 0.0 || !v.is_finite()) {
                    return Err("gaussian nb variances must be positive".to_string());
                }
                Ok(())
            }
        }
    }

    /// Per-class probability distribution, if the algorithm supports one.
    pub fn predict_proba(&self, x: &[f32]) -> Option<Vec<f32>> {
        match self {
            ClassicalModel::KNearestNeighbors {
                k,
                train_features,
                train_labels,
            } => {
                let votes = knn_votes(x, train_features, train_labels, *k, self.num_classes());
                let k_actual = (*k).min(train_features.len()) as f32;
                Some(votes.iter().map(|&v| v as f32 / k_actual).collect())
            }
            ClassicalModel::LogisticRegression { coef, intercept } => {
                Some(softmax(&linear_scores(x, coef, intercept)))
            }
            ClassicalModel::LinearSvm { .. } => None,
            ClassicalModel::DecisionTree { tree } => Some(tree.leaf_distribution(x)),
            ClassicalModel::RandomForest { trees } => {
                let num_classes = self.num_classes();
                let mut acc = vec![0.0f32; num_classes];
                for tree in trees {
                    let dist = tree.leaf_distribution(x);
                    for (a, d) in acc.iter_mut().zip(dist.iter()) {
                        *a += d;
                    }
                }
                let n = trees.len() as f32;
                for a in acc.iter_mut() {
                    *a /= n;
                }
                Some(acc)
            }
            ClassicalModel::GaussianNaiveBayes { theta, var, priors } => {
                // Joint log-likelihood, normalized with log-sum-exp
                let jll: Vec<f32> = theta
                    .iter()
                    .zip(var.iter())
                    .zip(priors.iter())
                    .map(|((means, vars), &prior)| {
                        let mut ll = prior.max(f32::MIN_POSITIVE).ln();
                        for ((&xi, &m), &v) in x.iter().zip(means.iter()).zip(vars.iter()) {
                            ll += -0.5 * ((2.0 * std::f32::consts::PI * v).ln())
                                - (xi - m).powi(2) / (2.0 * v);
                        }
                        ll
                    })
                    .collect();
                Some(softmax(&jll))
            }
        }
    }

    /// Predicted class index (lowest index wins ties).
    pub fn predict(&self, x: &[f32]) -> usize {
        match self.predict_proba(x) {
            Some(probs) => argmax(&probs),
            // Linear SVM: arg-max over uncalibrated decision scores
            None => match self {
                ClassicalModel::LinearSvm { coef, intercept } => {
                    argmax(&linear_scores(x, coef, intercept))
                }
                _ => unreachable!("only the linear SVM lacks probabilities"),
            },
        }
    }
}

fn linear_scores(x: &[f32], coef: &[Vec<f32>], intercept: &[f32]) -> Vec<f32> {
    coef.iter()
        .zip(intercept.iter())
        .map(|(row, &b)| row.iter().zip(x.iter()).map(|(&w, &xi)| w * xi).sum::<f32>() + b)
        .collect()
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

fn normalize(counts: &[f32]) -> Vec<f32> {
    let sum: f32 = counts.iter().sum();
    if sum > 0.0 {
        counts.iter().map(|&c| c / sum).collect()
    } else {
        vec![0.0; counts.len()]
    }
}

/// Per-class vote counts among the k nearest training vectors
/// (squared-euclidean distance; closer index wins distance ties).
fn knn_votes(
    x: &[f32],
    train_features: &[Vec<f32>],
    train_labels: &[usize],
    k: usize,
    num_classes: usize,
) -> Vec<usize> {
    let mut distances: Vec<(f32, usize)> = train_features
        .iter()
        .zip(train_labels.iter())
        .map(|(v, &label)| {
            let d: f32 = v.iter().zip(x.iter()).map(|(&a, &b)| (a - b).powi(2)).sum();
            (d, label)
        })
        .collect();

    let k = k.min(distances.len());
    distances
        .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut votes = vec![0usize; num_classes];
    for &(_, label) in distances.iter().take(k) {
        votes[label] += 1;
    }
    votes
}
