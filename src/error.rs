use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Fatal error kinds for a forecast run. None of them are retried.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Schema error in {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("Model load error ({path}): {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Write error ({path}): {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;

impl ForecastError {
    pub fn schema(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ForecastError::Schema {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ForecastError::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForecastError::Write {
            path: path.into(),
            source,
        }
    }

    /// Short error kind string used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::MissingData(_) => "MissingDataError",
            ForecastError::Schema { .. } => "SchemaError",
            ForecastError::ModelLoad { .. } => "ModelLoadError",
            ForecastError::Prediction(_) => "PredictionError",
            ForecastError::Write { .. } => "WriteError",
            ForecastError::Config(_) => "ConfigError",
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            ForecastError::MissingData(_) => 2,
            ForecastError::Schema { .. } => 3,
            ForecastError::ModelLoad { .. } => 4,
            ForecastError::Prediction(_) => 5,
            ForecastError::Write { .. } => 6,
            ForecastError::Config(_) => 7,
        }
    }
}

impl From<ForecastError> for ExitCode {
    fn from(error: ForecastError) -> Self {
        ExitCode::from(error.exit_code())
    }
}

impl From<figment::Error> for ForecastError {
    fn from(error: figment::Error) -> Self {
        ForecastError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ForecastError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ForecastError::Config(errors.to_string())
    }
}
