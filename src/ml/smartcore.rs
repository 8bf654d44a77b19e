//! SmartCore random forest member
//!
//! The forest is stored next to the model bundle as a bincode file and
//! referenced from it as `{"type": "random_forest", "path": "forest.bin"}`.
//! The file carries the input width the forest was fitted on, so a bundle
//! member declaring a different feature count is rejected at load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::models::Regressor;
use super::ModelType;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// On-disk layout: fitted width followed by the forest
#[derive(Serialize)]
struct ForestFileRef<'a> {
    n_features: usize,
    model: &'a Forest,
}

#[derive(Deserialize)]
struct ForestFile {
    n_features: usize,
    model: Forest,
}

pub struct SmartcoreRandomForest {
    model: Forest,
    n_features: usize,
}

impl SmartcoreRandomForest {
    /// Conservative defaults: shallow trees keep the artifact small.
    pub fn default_parameters() -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(10),
            min_samples_leaf: 2,
            min_samples_split: 5,
            n_trees: 50,
            m: None,
            keep_samples: false,
            seed: 42,
        }
    }

    /// Fit a forest for a bundle. Exporters call this, then [`Self::save`]
    /// next to the bundle JSON.
    pub fn train(
        x: &[Vec<f64>],
        y: &[f64],
        params: RandomForestRegressorParameters,
    ) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }
        if x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            );
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        let mut flat = Vec::with_capacity(n_samples * n_features);
        for row in x {
            if row.len() != n_features {
                anyhow::bail!("All feature vectors must have the same length");
            }
            flat.extend_from_slice(row);
        }

        let x_matrix = DenseMatrix::new(n_samples, n_features, flat, false);
        let model = RandomForestRegressor::fit(&x_matrix, &y.to_vec(), params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        Ok(Self { model, n_features })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = ForestFileRef {
            n_features: self.n_features,
            model: &self.model,
        };
        let bytes = bincode::serialize(&file)
            .map_err(|e| anyhow::anyhow!("Failed to serialize model: {}", e))?;
        fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
    }

    /// Load a bincode forest; `n_features` is the width the bundle member declares
    pub fn load(path: &Path, n_features: usize) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let file: ForestFile = bincode::deserialize(&bytes)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize model: {}", e))?;
        if file.n_features != n_features {
            anyhow::bail!(
                "forest {} was fitted on {} features, member declares {}",
                path.display(),
                file.n_features,
                n_features
            );
        }
        Ok(Self {
            model: file.model,
            n_features,
        })
    }
}

impl Regressor for SmartcoreRandomForest {
    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, features: &[f64]) -> Result<f64> {
        self.check_width(features)?;
        let x = DenseMatrix::new(1, features.len(), features.to_vec(), false);
        let predictions = self
            .model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;

        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))
    }
}
