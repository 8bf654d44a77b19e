use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ForecastError, Result};
use crate::forecast::{required_lookback, HORIZON_HOURS};

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "PRICE_FORECAST__";

/// Run configuration, passed explicitly into the forecast runner.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    /// Model bundle file name inside `model_dir`
    #[validate(length(min = 1))]
    pub model_file: String,
    pub output_path: PathBuf,
    /// Hours of price history kept in the aligned table, ending at the last observed price
    #[validate(range(min = 1, max = 8760))]
    pub lookback_hours: u32,
    #[validate(length(min = 1))]
    pub price_lags: Vec<u32>,
    #[validate(range(min = 1, max = 168))]
    pub rolling_window_hours: u32,
    /// Maximum hours a value is carried forward after its last observation
    #[validate(range(max = 168))]
    pub fill_limit_hours: u32,
    #[validate(range(min = 1))]
    pub stale_after_hours: u32,
    pub include_member_predictions: bool,
    #[validate(nested)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchemaConfig {
    #[validate(length(min = 1))]
    pub timestamp_column: String,
    #[validate(nested)]
    pub prices: TableSchema,
    #[validate(nested)]
    pub weather: TableSchema,
    #[validate(nested)]
    pub grid: TableSchema,
}

/// Declared layout of one input CSV
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TableSchema {
    #[validate(length(min = 1))]
    pub file: String,
    #[validate(length(min = 1))]
    pub columns: Vec<String>,
}

impl TableSchema {
    fn new(file: &str, columns: &[&str]) -> Self {
        Self {
            file: file.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            timestamp_column: "timestamp_utc".to_string(),
            prices: TableSchema::new("prices.csv", &["price_ct_per_kwh"]),
            weather: TableSchema::new("weather.csv", &["temperature_C", "windspeed_ms", "rain_mm"]),
            grid: TableSchema::new(
                "fingrid.csv",
                &["gen_total_mw", "gen_wind_mw", "cons_total_mw"],
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("models"),
            model_file: "price_model.json".to_string(),
            output_path: PathBuf::from("data/predictions_next_24h.csv"),
            lookback_hours: 72,
            price_lags: vec![24, 48],
            rolling_window_hours: 24,
            fill_limit_hours: 24,
            stale_after_hours: 12,
            include_member_predictions: false,
            schema: SchemaConfig::default(),
        }
    }
}

impl Config {
    /// Load defaults, then `config/default.toml`, then `PRICE_FORECAST__*` env vars.
    pub fn load() -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        cfg.validate_forecast()?;
        Ok(cfg)
    }

    /// Cross-field rules the derive cannot express.
    pub fn validate_forecast(&self) -> Result<()> {
        if let Some(lag) = self.price_lags.iter().find(|lag| (**lag as usize) < HORIZON_HOURS) {
            return Err(ForecastError::Config(format!(
                "price lag {lag}h is shorter than the {HORIZON_HOURS}h horizon"
            )));
        }

        let needed = required_lookback(&self.price_lags, self.rolling_window_hours);
        if self.lookback_hours < needed {
            return Err(ForecastError::Config(format!(
                "lookback_hours = {} does not cover the feature window of {needed}h",
                self.lookback_hours
            )));
        }

        if self.schema.prices.columns.len() != 1 {
            return Err(ForecastError::Config(format!(
                "prices table must declare exactly one value column, got {}",
                self.schema.prices.columns.len()
            )));
        }

        let mut seen = HashSet::new();
        for column in self.value_columns() {
            if column == &self.schema.timestamp_column || !seen.insert(column.as_str()) {
                return Err(ForecastError::Config(format!(
                    "column '{column}' is declared more than once"
                )));
            }
        }

        Ok(())
    }

    /// All declared value columns in aligned-table order: price, weather, grid.
    pub fn value_columns(&self) -> impl Iterator<Item = &String> {
        self.schema
            .prices
            .columns
            .iter()
            .chain(self.schema.weather.columns.iter())
            .chain(self.schema.grid.columns.iter())
    }

    pub fn price_column(&self) -> &str {
        &self.schema.prices.columns[0]
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join(&self.schema.prices.file)
    }

    pub fn weather_path(&self) -> PathBuf {
        self.data_dir.join(&self.schema.weather.file)
    }

    pub fn grid_path(&self) -> PathBuf {
        self.data_dir.join(&self.schema.grid.file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    /// Configuration rooted at `root`: data, models and output all live below it.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            model_dir: root.join("models"),
            output_path: root.join("data").join("predictions_next_24h.csv"),
            ..Self::default()
        }
    }
}
