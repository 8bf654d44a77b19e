//! Model adapter layer
//!
//! The forecaster only sees the [`PriceModel`] trait. Concrete regressors
//! (linear, dense network, boosted trees, and a smartcore random forest behind
//! the `ml` feature) are loaded from a JSON bundle by [`ModelAdapter`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod inference;
pub mod models;

#[cfg(feature = "ml")]
pub mod smartcore;

pub use inference::{ModelAdapter, ModelBundle, PriceModel};
pub use models::{ModelSpec, Regressor};

#[cfg(test)]
pub use inference::MockPriceModel;

/// Regressor family of an ensemble member
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelType {
    Linear,
    Mlp,
    TreeEnsemble,
    RandomForest,
}

/// Metadata of a loaded model bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub version: String,
    pub trained_at: Option<DateTime<Utc>>,
    /// Ensemble member names, in prediction order
    pub member_names: Vec<String>,
}

/// Engineered features for one target hour, in catalogue order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureVector {
    pub fn new(
        timestamp: DateTime<Utc>,
        features: Vec<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if features.len() != feature_names.len() {
            anyhow::bail!(
                "Feature count mismatch: {} features, {} names",
                features.len(),
                feature_names.len()
            );
        }
        Ok(Self {
            timestamp,
            features,
            feature_names,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.feature_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.features[i])
    }

    /// Values at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Vec<f64> {
        indices.iter().map(|&i| self.features[i]).collect()
    }
}

/// Per-feature z-score scaling fitted at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
        if self.mean.len() != features.len() || self.scale.len() != features.len() {
            anyhow::bail!(
                "Standardization parameter count mismatch: {} features, {} means, {} scales",
                features.len(),
                self.mean.len(),
                self.scale.len()
            );
        }

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(f, (mean, scale))| {
                if scale.abs() < 1e-10 {
                    0.0 // Avoid division by zero
                } else {
                    (f - mean) / scale
                }
            })
            .collect())
    }
}

/// Ensemble output for one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    /// Per-member values, in [`ModelMetadata::member_names`] order
    pub members: Vec<f64>,
}

impl Prediction {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            members: Vec::new(),
        }
    }

    pub fn with_members(value: f64, members: Vec<f64>) -> Self {
        Self { value, members }
    }
}
