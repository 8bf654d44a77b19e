use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One predicted hour of the forecast horizon. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub timestamp: DateTime<Utc>,
    pub predicted_price: f64,
    /// Per-member predictions, in ensemble member order
    pub member_predictions: Vec<f64>,
}

impl ForecastRow {
    pub fn new(
        timestamp: DateTime<Utc>,
        predicted_price: f64,
        member_predictions: Vec<f64>,
    ) -> Self {
        Self {
            timestamp,
            predicted_price,
            member_predictions,
        }
    }

    /// RFC 3339 UTC with a `Z` suffix, e.g. `2025-01-01T13:00:00Z`
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
