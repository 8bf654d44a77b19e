//! Feature engineering for the price model
//!
//! For every target hour `t` in the horizon the engineer derives, in this
//! fixed order:
//! - `price_lag_{N}`: price `N` hours before `t` (every `N >= 24`)
//! - `price_roll_{W}h_{mean,std,min,max}`: the `W` prices ending at `t - 24h`
//! - calendar features of `t` (UTC)
//! - the weather and grid columns at `t`
//!
//! Values come from the aligned table after forward fill. A feature that is
//! still missing rejects the row, which fails the run.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::HORIZON_HOURS;
use crate::config::Config;
use crate::data::AlignedTable;
use crate::error::{ForecastError, Result};
use crate::ml::FeatureVector;

/// Calendar features of one target hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Hour of day (0-23)
    pub hour_of_day: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Month (1-12)
    pub month: u32,
    pub is_weekend: bool,
    /// Finnish public holiday
    pub is_holiday: bool,
}

impl CalendarFeatures {
    pub fn extract(timestamp: DateTime<Utc>) -> Self {
        let day_of_week = timestamp.weekday().num_days_from_monday();
        Self {
            hour_of_day: timestamp.hour(),
            day_of_week,
            month: timestamp.month(),
            is_weekend: day_of_week >= 5, // Saturday (5) or Sunday (6)
            is_holiday: is_finnish_holiday(timestamp.date_naive()),
        }
    }

    /// Values in catalogue order, including the cyclic hour encoding
    fn values(&self) -> [f64; 7] {
        let angle = 2.0 * std::f64::consts::PI * self.hour_of_day as f64 / 24.0;
        [
            self.hour_of_day as f64,
            self.day_of_week as f64,
            self.month as f64,
            if self.is_weekend { 1.0 } else { 0.0 },
            if self.is_holiday { 1.0 } else { 0.0 },
            angle.sin(),
            angle.cos(),
        ]
    }
}

const CALENDAR_NAMES: [&str; 7] = [
    "hour_of_day",
    "day_of_week",
    "month",
    "is_weekend",
    "is_holiday",
    "hour_sin",
    "hour_cos",
];

/// Mean, population standard deviation, min and max of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl WindowStats {
    pub fn of(window: &[f64]) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: variance.sqrt(),
            min: window.iter().fold(f64::INFINITY, |a, &b| a.min(b)),
            max: window.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
        })
    }
}

/// Minimum history (hours up to and including `H`) the catalogue needs
pub fn required_lookback(price_lags: &[u32], rolling_window_hours: u32) -> u32 {
    let max_lag = price_lags.iter().copied().max().unwrap_or(0);
    max_lag.max(HORIZON_HOURS as u32 + rolling_window_hours.max(1) - 1)
}

/// Builds the fixed-order feature vectors for the forecast horizon
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    price_column: String,
    price_lags: Vec<u32>,
    rolling_window_hours: u32,
    exogenous: Vec<String>,
    names: Vec<String>,
}

impl FeatureEngineer {
    pub fn new(
        price_column: impl Into<String>,
        price_lags: Vec<u32>,
        rolling_window_hours: u32,
        exogenous: Vec<String>,
    ) -> Self {
        let w = rolling_window_hours;
        let mut names: Vec<String> = price_lags.iter().map(|n| format!("price_lag_{n}")).collect();
        names.extend(["mean", "std", "min", "max"].iter().map(|s| format!("price_roll_{w}h_{s}")));
        names.extend(CALENDAR_NAMES.iter().map(|s| s.to_string()));
        names.extend(exogenous.iter().cloned());

        Self {
            price_column: price_column.into(),
            price_lags,
            rolling_window_hours,
            exogenous,
            names,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let exogenous = config
            .schema
            .weather
            .columns
            .iter()
            .chain(config.schema.grid.columns.iter())
            .cloned()
            .collect();
        Self::new(
            config.price_column(),
            config.price_lags.clone(),
            config.rolling_window_hours,
            exogenous,
        )
    }

    /// Feature catalogue, in vector order
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn required_lookback(&self) -> u32 {
        required_lookback(&self.price_lags, self.rolling_window_hours)
    }

    /// One vector per horizon hour, ascending
    pub fn build_horizon(&self, table: &AlignedTable) -> Result<Vec<FeatureVector>> {
        table
            .horizon()
            .into_iter()
            .map(|target| self.build(table, target))
            .collect()
    }

    /// Feature vector for a single target hour
    pub fn build(&self, table: &AlignedTable, target: DateTime<Utc>) -> Result<FeatureVector> {
        let price_idx = self.column(table, &self.price_column)?;
        let mut values = Vec::with_capacity(self.names.len());

        for (lag, name) in self.price_lags.iter().zip(&self.names) {
            let source = target - Duration::hours(*lag as i64);
            values.push(self.require(table, price_idx, source, target, name)?);
        }

        let anchor = target - Duration::hours(HORIZON_HOURS as i64);
        let window_start = anchor - Duration::hours(self.rolling_window_hours as i64 - 1);
        let mut window = Vec::with_capacity(self.rolling_window_hours as usize);
        for h in 0..self.rolling_window_hours as i64 {
            let source = window_start + Duration::hours(h);
            let name = &self.names[self.price_lags.len()];
            window.push(self.require(table, price_idx, source, target, name)?);
        }
        let stats = WindowStats::of(&window)
            .ok_or_else(|| ForecastError::MissingData("empty rolling window".to_string()))?;
        values.extend([stats.mean, stats.std, stats.min, stats.max]);

        values.extend(CalendarFeatures::extract(target).values());

        for column in &self.exogenous {
            let idx = self.column(table, column)?;
            values.push(self.require(table, idx, target, target, column)?);
        }

        FeatureVector::new(target, values, self.names.clone())
            .map_err(|e| ForecastError::MissingData(e.to_string()))
    }

    fn column(&self, table: &AlignedTable, column: &str) -> Result<usize> {
        table.column_index(column).ok_or_else(|| {
            ForecastError::MissingData(format!(
                "column '{column}' is absent from the aligned table"
            ))
        })
    }

    fn require(
        &self,
        table: &AlignedTable,
        column: usize,
        source: DateTime<Utc>,
        target: DateTime<Utc>,
        feature: &str,
    ) -> Result<f64> {
        table.value(source, column).ok_or_else(|| {
            ForecastError::MissingData(format!(
                "feature '{feature}' for {target} needs a value at {source}, none after forward fill"
            ))
        })
    }
}

/// Easter Sunday (Gregorian), anonymous computus
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Check if a date is a Finnish public holiday
pub fn is_finnish_holiday(date: NaiveDate) -> bool {
    let (month, day) = (date.month(), date.day());

    let fixed = matches!(
        (month, day),
        (1, 1)     // New Year's Day
        | (1, 6)   // Epiphany
        | (5, 1)   // May Day
        | (12, 6)  // Independence Day
        | (12, 24) // Christmas Eve
        | (12, 25) // Christmas Day
        | (12, 26) // Boxing Day
    );
    if fixed {
        return true;
    }

    // Midsummer Eve/Day and All Saints' Day move with the weekday
    let weekday = date.weekday();
    if month == 6 && ((19..=25).contains(&day) && weekday == Weekday::Fri
        || (20..=26).contains(&day) && weekday == Weekday::Sat)
    {
        return true;
    }
    if weekday == Weekday::Sat && (month == 10 && day == 31 || month == 11 && day <= 6) {
        return true;
    }

    easter_sunday(date.year()).is_some_and(|easter| {
        // Good Friday, Easter Sunday/Monday, Ascension, Pentecost
        [-2, 0, 1, 39, 49].contains(&(date - easter).num_days())
    })
}
