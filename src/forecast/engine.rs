use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use validator::Validate;

use super::{FeatureEngineer, ForecastWriter, HORIZON_HOURS};
use crate::config::Config;
use crate::data::{align, AlignedTable, DataLoader};
use crate::domain::ForecastRow;
use crate::error::{ForecastError, Result};
use crate::ml::{ModelAdapter, PriceModel};

/// Progress of a single forecast run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum RunStage {
    Idle,
    Loading,
    Featurizing,
    Predicting,
    Writing,
    Done,
    Failed,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    /// Last observed price hour (`H`)
    pub history_end: DateTime<Utc>,
    pub rows: Vec<ForecastRow>,
    pub output_path: PathBuf,
    pub model_id: String,
}

/// Runs the pipeline once: load, featurize, predict, write.
pub struct ForecastRunner {
    config: Config,
    engineer: FeatureEngineer,
    stage: RunStage,
}

impl ForecastRunner {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        config.validate_forecast()?;
        let engineer = FeatureEngineer::from_config(&config);
        Ok(Self {
            config,
            engineer,
            stage: RunStage::Idle,
        })
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        self.engineer.feature_names()
    }

    /// Run with the model bundle at `model_dir/model_file`
    pub fn run(&mut self) -> Result<ForecastReport> {
        let outcome = self.execute(None);
        self.finish(outcome)
    }

    /// Run with an already constructed model
    pub fn run_with_model(&mut self, model: &dyn PriceModel) -> Result<ForecastReport> {
        let outcome = self.execute(Some(model));
        self.finish(outcome)
    }

    fn execute(&mut self, model: Option<&dyn PriceModel>) -> Result<ForecastReport> {
        self.advance(RunStage::Loading);
        let aligned = self.load_inputs()?;

        let loaded;
        let model: &dyn PriceModel = match model {
            Some(model) => model,
            None => {
                loaded =
                    ModelAdapter::load(&self.config.model_path(), self.engineer.feature_names())?;
                &loaded
            }
        };

        self.advance(RunStage::Featurizing);
        let vectors = self.engineer.build_horizon(&aligned)?;
        debug!(
            vectors = vectors.len(),
            features = self.engineer.feature_names().len(),
            "built feature vectors"
        );

        self.advance(RunStage::Predicting);
        let mut rows = Vec::with_capacity(HORIZON_HOURS);
        for vector in &vectors {
            let prediction = model.predict(vector)?;
            rows.push(ForecastRow::new(vector.timestamp, prediction.value, prediction.members));
        }
        if rows.len() != HORIZON_HOURS {
            return Err(ForecastError::Prediction(format!(
                "expected {HORIZON_HOURS} predictions, got {}",
                rows.len()
            )));
        }

        self.advance(RunStage::Writing);
        let mut writer = ForecastWriter::new(&self.config.output_path);
        if self.config.include_member_predictions {
            writer = writer.with_member_columns(model.metadata().member_names.clone());
        }
        writer.write(&rows)?;

        Ok(ForecastReport {
            history_end: aligned.history_end(),
            rows,
            output_path: self.config.output_path.clone(),
            model_id: model.metadata().model_id.clone(),
        })
    }

    fn load_inputs(&self) -> Result<AlignedTable> {
        let sources = DataLoader::new(&self.config).load()?;
        let aligned = align(&sources, self.config.lookback_hours, self.config.fill_limit_hours)?;

        let history_end = aligned.history_end();
        let age = Utc::now() - history_end;
        if age > Duration::hours(self.config.stale_after_hours as i64) {
            warn!(
                %history_end,
                age_hours = age.num_hours(),
                "latest price is older than {}h",
                self.config.stale_after_hours
            );
        }
        Ok(aligned)
    }

    fn advance(&mut self, stage: RunStage) {
        info!(from = %self.stage, to = %stage, "forecast stage");
        self.stage = stage;
    }

    fn finish(&mut self, outcome: Result<ForecastReport>) -> Result<ForecastReport> {
        match outcome {
            Ok(report) => {
                self.advance(RunStage::Done);
                info!(
                    history_end = %report.history_end,
                    rows = report.rows.len(),
                    model_id = %report.model_id,
                    output = %report.output_path.display(),
                    "forecast written"
                );
                Ok(report)
            }
            Err(e) => {
                error!(stage = %self.stage, kind = e.kind(), error = %e, "forecast run failed");
                self.stage = RunStage::Failed;
                Err(e)
            }
        }
    }
}
