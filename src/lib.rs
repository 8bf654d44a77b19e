//! Next-24h electricity spot price forecaster.
//!
//! Loads hourly price, weather and grid CSVs, engineers a fixed feature
//! catalogue, runs a pre-trained model bundle and writes
//! `predictions_next_24h.csv` atomically.

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod telemetry;

pub use error::{ForecastError, Result};
