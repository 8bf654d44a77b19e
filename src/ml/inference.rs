//! Model bundle loading and ensemble inference

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::models::{ModelSpec, Regressor};
use super::{FeatureVector, ModelMetadata, Prediction, StandardScaler};
use crate::error::{ForecastError, Result};

/// The seam between feature engineering and the concrete model technology
#[cfg_attr(test, mockall::automock)]
pub trait PriceModel {
    fn metadata(&self) -> &ModelMetadata;

    /// Predict the price for one feature vector
    fn predict(&self, features: &FeatureVector) -> Result<Prediction>;

    fn predict_batch(&self, batch: &[FeatureVector]) -> Result<Vec<Prediction>> {
        batch.iter().map(|f| self.predict(f)).collect()
    }
}

/// On-disk model bundle (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    pub members: Vec<MemberSpec>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_weight() -> f64 {
    1.0
}

/// One ensemble member: which features it reads and how it maps them to a price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
    /// Model was trained on `ln(1 + price)`
    #[serde(default)]
    pub log_target: bool,
    pub model: ModelSpec,
}

struct EnsembleMember {
    name: String,
    weight: f64,
    feature_idx: Vec<usize>,
    scaler: Option<StandardScaler>,
    log_target: bool,
    regressor: Box<dyn Regressor>,
}

impl EnsembleMember {
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<f64> {
        let selected = features.select(&self.feature_idx);
        let input = match &self.scaler {
            Some(scaler) => scaler.transform(&selected)?,
            None => selected,
        };
        let raw = self.regressor.predict_row(&input)?;
        Ok(if self.log_target { raw.exp_m1() } else { raw })
    }
}

/// Loaded, validated ensemble; the weighted mean of its members is the forecast.
pub struct ModelAdapter {
    metadata: ModelMetadata,
    catalogue: Vec<String>,
    members: Vec<EnsembleMember>,
    total_weight: f64,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("metadata", &self.metadata)
            .field("features", &self.catalogue.len())
            .finish()
    }
}

impl ModelAdapter {
    /// Load a bundle and check it against the engineered feature catalogue.
    pub fn load(path: &Path, catalogue: &[String]) -> Result<Self> {
        let body = fs::read_to_string(path).map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                "model artifact not found".to_string()
            } else {
                format!("cannot read model artifact: {e}")
            };
            ForecastError::model_load(path, message)
        })?;

        let bundle: ModelBundle = serde_json::from_str(&body)
            .map_err(|e| ForecastError::model_load(path, format!("invalid bundle: {e}")))?;

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        Self::from_bundle(bundle, catalogue, &base_dir)
            .map_err(|e| ForecastError::model_load(path, format!("{e:#}")))
    }

    /// Validate a bundle against the catalogue; the caller wraps failures
    /// into a model load error.
    pub fn from_bundle(
        bundle: ModelBundle,
        catalogue: &[String],
        base_dir: &Path,
    ) -> anyhow::Result<Self> {
        if bundle.members.is_empty() {
            anyhow::bail!("bundle has no ensemble members");
        }

        let mut names = HashSet::new();
        let mut members = Vec::with_capacity(bundle.members.len());

        for spec in bundle.members {
            if !names.insert(spec.name.clone()) {
                anyhow::bail!("duplicate member name '{}'", spec.name);
            }
            if !spec.weight.is_finite() || spec.weight <= 0.0 {
                anyhow::bail!("member '{}' has invalid weight {}", spec.name, spec.weight);
            }
            if spec.feature_names.is_empty() {
                anyhow::bail!("member '{}' declares no features", spec.name);
            }

            let mut seen = HashSet::new();
            let mut feature_idx = Vec::with_capacity(spec.feature_names.len());
            for feature in &spec.feature_names {
                if !seen.insert(feature.as_str()) {
                    anyhow::bail!("member '{}' lists feature '{feature}' twice", spec.name);
                }
                let idx = catalogue.iter().position(|c| c == feature).ok_or_else(|| {
                    anyhow::anyhow!("member '{}' expects unknown feature '{feature}'", spec.name)
                })?;
                feature_idx.push(idx);
            }

            let n_features = feature_idx.len();
            if let Some(scaler) = &spec.scaler {
                if scaler.mean.len() != n_features || scaler.scale.len() != n_features {
                    anyhow::bail!(
                        "member '{}': scaler has {}/{} parameters for {n_features} features",
                        spec.name,
                        scaler.mean.len(),
                        scaler.scale.len()
                    );
                }
            }

            let regressor = spec
                .model
                .into_regressor(n_features, base_dir)
                .with_context(|| format!("member '{}'", spec.name))?;

            let unused: Vec<&str> = catalogue
                .iter()
                .filter(|c| !seen.contains(c.as_str()))
                .map(String::as_str)
                .collect();
            debug!(
                member = %spec.name,
                model_type = %regressor.model_type(),
                features = n_features,
                unused = ?unused,
                "feature compatibility"
            );

            members.push(EnsembleMember {
                name: spec.name,
                weight: spec.weight,
                feature_idx,
                scaler: spec.scaler,
                log_target: spec.log_target,
                regressor,
            });
        }

        let total_weight = members.iter().map(|m| m.weight).sum::<f64>();
        let metadata = ModelMetadata {
            model_id: bundle.model_id,
            version: bundle.version,
            trained_at: bundle.trained_at,
            member_names: members.iter().map(|m| m.name.clone()).collect(),
        };

        info!(
            model_id = %metadata.model_id,
            version = %metadata.version,
            members = members.len(),
            "loaded price model"
        );

        Ok(Self {
            metadata,
            catalogue: catalogue.to_vec(),
            members,
            total_weight,
        })
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl PriceModel for ModelAdapter {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        if features.feature_names != self.catalogue {
            return Err(ForecastError::Prediction(format!(
                "feature vector for {} does not match the catalogue the model was loaded with",
                features.timestamp
            )));
        }

        let mut values = Vec::with_capacity(self.members.len());
        let mut weighted = 0.0;
        for member in &self.members {
            let value = member.predict(features).map_err(|e| {
                ForecastError::Prediction(format!(
                    "member '{}' at {}: {e}",
                    member.name, features.timestamp
                ))
            })?;
            if !value.is_finite() {
                return Err(ForecastError::Prediction(format!(
                    "member '{}' produced non-finite price at {}",
                    member.name, features.timestamp
                )));
            }
            weighted += value * member.weight;
            values.push(value);
        }

        Ok(Prediction::with_members(weighted / self.total_weight, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn catalogue() -> Vec<String> {
        ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
    }

    fn vector(values: [f64; 3]) -> FeatureVector {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        FeatureVector::new(ts, values.to_vec(), catalogue()).unwrap()
    }

    fn bundle(value: serde_json::Value) -> ModelBundle {
        serde_json::from_value(value).unwrap()
    }

    fn two_member_bundle() -> ModelBundle {
        bundle(json!({
            "model_id": "test-ensemble",
            "members": [
                {
                    "name": "lin",
                    "weight": 0.5,
                    "feature_names": ["c", "a"],
                    "model": {"type": "linear", "coefficients": [1.0, 2.0], "intercept": 1.0}
                },
                {
                    "name": "net",
                    "weight": 0.5,
                    "feature_names": ["b"],
                    "scaler": {"mean": [10.0], "scale": [2.0]},
                    "log_target": true,
                    "model": {"type": "mlp", "layers": [
                        {"weights": [[1.0]], "bias": [0.0], "activation": "linear"}
                    ]}
                }
            ]
        }))
    }

    #[test]
    fn test_ensemble_selects_features_by_name() {
        let adapter =
            ModelAdapter::from_bundle(two_member_bundle(), &catalogue(), Path::new(".")).unwrap();
        assert_eq!(adapter.member_count(), 2);
        assert_eq!(adapter.metadata().member_names, vec!["lin", "net"]);

        // lin: 1*c + 2*a + 1 = 3 + 2 + 1 = 6; net: exp((10 - 10) / 2) - 1 = 0
        let prediction = adapter.predict(&vector([1.0, 10.0, 3.0])).unwrap();
        assert_eq!(prediction.members, vec![6.0, 0.0]);
        assert_eq!(prediction.value, 3.0);
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let b = bundle(json!({
            "model_id": "m",
            "members": [{
                "name": "lin",
                "feature_names": ["a", "zzz"],
                "model": {"type": "linear", "coefficients": [1.0, 1.0], "intercept": 0.0}
            }]
        }));
        let err = ModelAdapter::from_bundle(b, &catalogue(), Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn test_feature_count_mismatch_rejected() {
        let b = bundle(json!({
            "model_id": "m",
            "members": [{
                "name": "lin",
                "feature_names": ["a", "b"],
                "model": {"type": "linear", "coefficients": [1.0, 1.0, 1.0], "intercept": 0.0}
            }]
        }));
        let err = ModelAdapter::from_bundle(b, &catalogue(), Path::new(".")).unwrap_err();
        assert!(format!("{err:#}").starts_with("member 'lin': "));
    }

    #[test]
    fn test_invalid_weight_and_empty_bundle_rejected() {
        let zero_weight = bundle(json!({
            "model_id": "m",
            "members": [{
                "name": "lin",
                "weight": 0.0,
                "feature_names": ["a"],
                "model": {"type": "linear", "coefficients": [1.0], "intercept": 0.0}
            }]
        }));
        assert!(ModelAdapter::from_bundle(zero_weight, &catalogue(), Path::new(".")).is_err());

        let empty = bundle(json!({"model_id": "m", "members": []}));
        assert!(ModelAdapter::from_bundle(empty, &catalogue(), Path::new(".")).is_err());
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempdir().unwrap();
        let err = ModelAdapter::load(&dir.path().join("nope.json"), &catalogue()).unwrap_err();
        assert!(matches!(err, ForecastError::ModelLoad { .. }));
    }

    #[test]
    fn test_load_garbage_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "not json").unwrap();
        let err = ModelAdapter::load(&path, &catalogue()).unwrap_err();
        assert!(matches!(err, ForecastError::ModelLoad { .. }));
    }

    #[test]
    fn test_non_finite_prediction_is_error() {
        let b = bundle(json!({
            "model_id": "m",
            "members": [{
                "name": "explode",
                "feature_names": ["a"],
                "log_target": true,
                "model": {"type": "linear", "coefficients": [1000.0], "intercept": 0.0}
            }]
        }));
        let adapter = ModelAdapter::from_bundle(b, &catalogue(), Path::new(".")).unwrap();
        let err = adapter.predict(&vector([10.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, ForecastError::Prediction(_)));
    }

    #[test]
    fn test_predict_batch() {
        let adapter =
            ModelAdapter::from_bundle(two_member_bundle(), &catalogue(), Path::new(".")).unwrap();
        let batch = vec![vector([0.0, 10.0, 0.0]), vector([1.0, 10.0, 1.0])];
        let predictions = adapter.predict_batch(&batch).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].value, 0.5);
    }
}
