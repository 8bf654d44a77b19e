//! Regressor implementations
//!
//! Each ensemble member evaluates one of these on its selected, scaled
//! features. All of them are plain serde data so a model trained elsewhere
//! can be exported to the JSON bundle.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::ModelType;

/// A fitted single-output regressor
pub trait Regressor: Send + Sync {
    fn model_type(&self) -> ModelType;

    /// Number of inputs the regressor was fitted on
    fn n_features(&self) -> usize;

    fn predict_row(&self, features: &[f64]) -> Result<f64>;

    fn check_width(&self, features: &[f64]) -> Result<()> {
        if features.len() != self.n_features() {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                self.n_features(),
                features.len()
            );
        }
        Ok(())
    }
}

/// Serialized regressor as stored in the model bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearRegressionModel),
    Mlp(MlpModel),
    TreeEnsemble(TreeEnsembleModel),
    /// smartcore forest serialized with bincode, path relative to the bundle
    #[cfg(feature = "ml")]
    RandomForest { path: std::path::PathBuf },
}

impl ModelSpec {
    /// Check the structure against `n_features` inputs and build the regressor.
    #[cfg_attr(not(feature = "ml"), allow(unused_variables))]
    pub fn into_regressor(self, n_features: usize, base_dir: &Path) -> Result<Box<dyn Regressor>> {
        match self {
            ModelSpec::Linear(model) => {
                model.validate(n_features)?;
                Ok(Box::new(model))
            }
            ModelSpec::Mlp(model) => {
                model.validate(n_features)?;
                Ok(Box::new(model))
            }
            ModelSpec::TreeEnsemble(mut model) => {
                model.validate(n_features)?;
                Ok(Box::new(model))
            }
            #[cfg(feature = "ml")]
            ModelSpec::RandomForest { path } => {
                let model = super::smartcore::SmartcoreRandomForest::load(
                    &base_dir.join(path),
                    n_features,
                )?;
                Ok(Box::new(model))
            }
        }
    }
}

/// Ordinary linear regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressionModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        if self.coefficients.len() != n_features {
            anyhow::bail!(
                "linear model has {} coefficients for {} features",
                self.coefficients.len(),
                n_features
            );
        }
        Ok(())
    }
}

impl Regressor for LinearRegressionModel {
    fn model_type(&self) -> ModelType {
        ModelType::Linear
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_row(&self, features: &[f64]) -> Result<f64> {
        self.check_width(features)?;
        Ok(features
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    #[default]
    Linear,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Linear => x,
        }
    }
}

/// Fully connected layer, `weights[out][in]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| {
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
                self.activation.apply(z)
            })
            .collect()
    }
}

/// Feed-forward network with a single output unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpModel {
    pub layers: Vec<DenseLayer>,
}

impl MlpModel {
    fn validate(&self, n_features: usize) -> Result<()> {
        if self.layers.is_empty() {
            anyhow::bail!("network has no layers");
        }

        let mut width = n_features;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                anyhow::bail!(
                    "layer {i}: {} weight rows but {} biases",
                    layer.weights.len(),
                    layer.bias.len()
                );
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                anyhow::bail!("layer {i}: expected {width} inputs, found a row of {}", row.len());
            }
            width = layer.weights.len();
        }

        if width != 1 {
            anyhow::bail!("network must end in a single output, last layer has {width}");
        }
        Ok(())
    }
}

impl Regressor for MlpModel {
    fn model_type(&self) -> ModelType {
        ModelType::Mlp
    }

    fn n_features(&self) -> usize {
        self.layers
            .first()
            .and_then(|l| l.weights.first())
            .map_or(0, |row| row.len())
    }

    fn predict_row(&self, features: &[f64]) -> Result<f64> {
        self.check_width(features)?;
        let output = self
            .layers
            .iter()
            .fold(features.to_vec(), |x, layer| layer.forward(&x));
        output
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("network produced no output"))
    }
}

/// Node of a binary regression tree. Children always have a larger index
/// than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("empty tree");
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature, left, right, ..
            } = *node
            {
                if feature >= n_features {
                    anyhow::bail!(
                        "node {i} splits on feature {feature}, only {n_features} available"
                    );
                }
                for child in [left, right] {
                    if child <= i || child >= self.nodes.len() {
                        anyhow::bail!("node {i} has invalid child index {child}");
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if features[feature] <= threshold { left } else { right },
            }
        }
    }
}

/// Gradient-boosted regression trees: `base_score + learning_rate * sum(trees)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsembleModel {
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
    #[serde(skip)]
    n_features: usize,
}

impl TreeEnsembleModel {
    pub fn new(
        base_score: f64,
        learning_rate: f64,
        trees: Vec<RegressionTree>,
        n_features: usize,
    ) -> Self {
        Self {
            base_score,
            learning_rate,
            trees,
            n_features,
        }
    }

    fn validate(&mut self, n_features: usize) -> Result<()> {
        if self.trees.is_empty() {
            anyhow::bail!("tree ensemble has no trees");
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|e| anyhow::anyhow!("tree {i}: {e}"))?;
        }
        self.n_features = n_features;
        Ok(())
    }
}

impl Regressor for TreeEnsembleModel {
    fn model_type(&self) -> ModelType {
        ModelType::TreeEnsemble
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, features: &[f64]) -> Result<f64> {
        self.check_width(features)?;
        let boosted: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        Ok(self.base_score + self.learning_rate * boosted)
    }
}
