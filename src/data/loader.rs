//! CSV loading for the three input tables
//!
//! Each file is checked against its declared schema (timestamp column plus
//! value columns), parsed, and resampled to hourly resolution by averaging
//! every observation that falls into the same hour.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::config::{Config, TableSchema};
use crate::domain::{floor_to_hour, TimeSeriesRecord, TimeSeriesTable};
use crate::error::{ForecastError, Result};

const MISSING_MARKERS: &[&str] = &["", "nan", "NaN", "NAN", "null", "NULL", "NA", "N/A"];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// The three raw sources after hourly resampling
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub prices: TimeSeriesTable,
    pub weather: TimeSeriesTable,
    pub grid: TimeSeriesTable,
}

/// Reads the input CSVs named by the run configuration
pub struct DataLoader {
    timestamp_column: String,
    tables: [(String, PathBuf, Vec<String>); 3],
}

impl DataLoader {
    pub fn new(config: &Config) -> Self {
        let entry = |name: &str, path: PathBuf, schema: &TableSchema| {
            (name.to_string(), path, schema.columns.clone())
        };
        Self {
            timestamp_column: config.schema.timestamp_column.clone(),
            tables: [
                entry("prices", config.prices_path(), &config.schema.prices),
                entry("weather", config.weather_path(), &config.schema.weather),
                entry("grid", config.grid_path(), &config.schema.grid),
            ],
        }
    }

    /// Load all three tables. Every file must exist before any is parsed.
    pub fn load(&self) -> Result<SourceTables> {
        for (name, path, _) in &self.tables {
            if !path.is_file() {
                return Err(ForecastError::MissingData(format!(
                    "{name} input file {} not found",
                    path.display()
                )));
            }
        }

        let [prices, weather, grid] = &self.tables;
        Ok(SourceTables {
            prices: load_table(&prices.0, &prices.1, &self.timestamp_column, &prices.2)?,
            weather: load_table(&weather.0, &weather.1, &self.timestamp_column, &weather.2)?,
            grid: load_table(&grid.0, &grid.1, &self.timestamp_column, &grid.2)?,
        })
    }
}

/// Load one CSV into an hourly table holding exactly the declared `columns`.
pub fn load_table(
    name: &str,
    path: &Path,
    timestamp_column: &str,
    columns: &[String],
) -> Result<TimeSeriesTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| open_error(name, path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| ForecastError::schema(path, format!("unreadable header: {e}")))?
        .clone();

    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| ForecastError::schema(path, format!("missing column '{column}'")))
    };
    let ts_idx = find(timestamp_column)?;
    let value_idx = columns.iter().map(|c| find(c.as_str())).collect::<Result<Vec<_>>>()?;

    // hour -> per-column (sum, count)
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<(f64, usize)>> = BTreeMap::new();
    let mut rows = 0usize;

    for result in reader.records() {
        let record =
            result.map_err(|e| ForecastError::schema(path, format!("malformed CSV: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            ForecastError::schema(path, format!("line {line}: unrecognised timestamp '{raw_ts}'"))
        })?;

        let bucket = buckets
            .entry(floor_to_hour(timestamp))
            .or_insert_with(|| vec![(0.0, 0); columns.len()]);

        for (slot, (&idx, column)) in bucket.iter_mut().zip(value_idx.iter().zip(columns)) {
            let raw = record.get(idx).unwrap_or_default();
            match parse_value(raw) {
                Ok(Some(v)) => {
                    slot.0 += v;
                    slot.1 += 1;
                }
                Ok(None) => {}
                Err(()) => {
                    return Err(ForecastError::schema(
                        path,
                        format!("line {line}: column '{column}' has non-numeric value '{raw}'"),
                    ))
                }
            }
        }
        rows += 1;
    }

    let records = buckets
        .into_iter()
        .map(|(timestamp, sums)| TimeSeriesRecord {
            timestamp,
            values: sums
                .into_iter()
                .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
                .collect(),
        })
        .collect::<Vec<_>>();

    debug!(table = name, path = %path.display(), rows, hours = records.len(), "loaded table");

    Ok(TimeSeriesTable::new(name, columns.to_vec(), records))
}

fn open_error(name: &str, path: &Path, error: csv::Error) -> ForecastError {
    if let csv::ErrorKind::Io(io) = error.kind() {
        if io.kind() == std::io::ErrorKind::NotFound {
            return ForecastError::MissingData(format!(
                "{name} input file {} not found",
                path.display()
            ));
        }
    }
    ForecastError::schema(path, format!("cannot open: {error}"))
}

/// Parse a timestamp in RFC 3339, pandas (`2025-01-01 00:00:00+00:00`) or
/// naive form. Naive timestamps are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    None
}

/// `Ok(None)` for a missing marker, `Err` for anything non-numeric
fn parse_value(raw: &str) -> std::result::Result<Option<f64>, ()> {
    if MISSING_MARKERS.contains(&raw) {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(()),
    }
}
