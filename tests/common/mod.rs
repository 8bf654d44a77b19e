#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use spot_price_forecast::config::Config;
use tempfile::TempDir;

/// First hour of every generated history
pub fn history_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()
}

/// Temporary run root with `data/` and `models/` below it
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::create_dir_all(dir.path().join("models")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> Config {
        Config::rooted_at(self.root())
    }

    pub fn data_path(&self, file: &str) -> PathBuf {
        self.root().join("data").join(file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.config().output_path
    }

    /// Hourly prices, weather and grid rows for `hours` hours
    pub fn write_history(&self, hours: i64) -> &Self {
        self.write_history_with(hours, |h| {
            4.0 + 3.0 * ((h % 24) as f64 / 24.0 * std::f64::consts::PI).sin()
        })
    }

    pub fn write_history_with(&self, hours: i64, price: impl Fn(i64) -> f64) -> &Self {
        let mut prices = String::from("timestamp_utc,price_ct_per_kwh\n");
        let mut weather = String::from("timestamp_utc,temperature_C,windspeed_ms,rain_mm\n");
        let mut grid = String::from("timestamp_utc,gen_total_mw,gen_wind_mw,cons_total_mw\n");

        for h in 0..hours {
            let ts = (history_start() + Duration::hours(h)).format("%Y-%m-%dT%H:%M:%SZ");
            prices.push_str(&format!("{ts},{:.4}\n", price(h)));
            let temperature = -2.0 + (h % 24) as f64 * 0.25;
            let wind = 3.0 + (h % 7) as f64;
            weather.push_str(&format!("{ts},{temperature:.1},{wind:.1},0.0\n"));
            let total = 9000 + h % 50;
            let wind_mw = 2000 + 10 * (h % 30);
            let load = 10000 + 5 * (h % 24);
            grid.push_str(&format!("{ts},{total},{wind_mw},{load}\n"));
        }

        fs::write(self.data_path("prices.csv"), prices).unwrap();
        fs::write(self.data_path("weather.csv"), weather).unwrap();
        fs::write(self.data_path("fingrid.csv"), grid).unwrap();
        self
    }

    /// Remove the rows for history hours in `hours` from a generated input
    pub fn drop_hours(&self, file: &str, hours: std::ops::Range<i64>) -> &Self {
        let path = self.data_path(file);
        let content = fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(line, _)| *line == 0 || !hours.contains(&(*line as i64 - 1)))
            .map(|(_, row)| row)
            .collect();
        fs::write(&path, kept.join("\n") + "\n").unwrap();
        self
    }

    pub fn write_model(&self, bundle: &Value) -> &Self {
        let path = self.config().model_path();
        fs::write(path, serde_json::to_string_pretty(bundle).unwrap()).unwrap();
        self
    }
}

/// Two-member bundle reading ten catalogue features: boosted trees on four,
/// a small log-target network on six.
pub fn ten_feature_bundle() -> Value {
    json!({
        "model_id": "spot-ensemble",
        "version": "3",
        "trained_at": "2025-03-01T00:00:00Z",
        "members": [
            {
                "name": "gbr",
                "weight": 0.5,
                "feature_names": ["price_lag_24", "hour_of_day", "temperature_C", "gen_wind_mw"],
                "model": {
                    "type": "tree_ensemble",
                    "base_score": 5.0,
                    "learning_rate": 0.1,
                    "trees": [
                        { "nodes": [
                            { "feature": 1, "threshold": 11.5, "left": 1, "right": 2 },
                            { "value": -2.0 },
                            { "feature": 0, "threshold": 5.0, "left": 3, "right": 4 },
                            { "value": 1.0 },
                            { "value": 3.0 }
                        ]},
                        { "nodes": [
                            { "feature": 2, "threshold": 0.0, "left": 1, "right": 2 },
                            { "value": 0.5 },
                            { "value": -0.5 }
                        ]}
                    ]
                }
            },
            {
                "name": "nn",
                "weight": 0.5,
                "log_target": true,
                "feature_names": [
                    "price_lag_48", "price_roll_24h_mean", "price_roll_24h_std",
                    "hour_sin", "hour_cos", "cons_total_mw"
                ],
                "scaler": {
                    "mean": [5.0, 5.0, 1.0, 0.0, 0.0, 10000.0],
                    "scale": [2.0, 2.0, 1.0, 1.0, 1.0, 100.0]
                },
                "model": {
                    "type": "mlp",
                    "layers": [
                        {
                            "weights": [
                                [0.3, 0.2, 0.1, 0.05, -0.05, 0.1],
                                [-0.1, 0.1, 0.0, 0.2, 0.1, 0.0]
                            ],
                            "bias": [0.1, 0.0],
                            "activation": "relu"
                        },
                        {
                            "weights": [[0.4, -0.2]],
                            "bias": [1.7]
                        }
                    ]
                }
            }
        ]
    })
}
