//! Alignment of the source tables onto one hourly index
//!
//! The aligned window ends `HORIZON_HOURS` after the last observed price and
//! starts `lookback_hours - 1` hours before it. Prices are left-joined with
//! the weather and grid tables, whose rows past the history end (forecast
//! rows) are kept when present.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::loader::SourceTables;
use crate::domain::{hourly_range, TimeSeriesTable};
use crate::error::{ForecastError, Result};
use crate::forecast::HORIZON_HOURS;

/// Hourly table covering lookback window plus forecast horizon
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    start: DateTime<Utc>,
    history_end: DateTime<Utc>,
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl AlignedTable {
    pub fn new(
        start: DateTime<Utc>,
        history_end: DateTime<Utc>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Self {
        Self {
            start,
            history_end,
            columns,
            rows,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Last hour with an observed price (`H`)
    pub fn history_end(&self) -> DateTime<Utc> {
        self.history_end
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn timestamp(&self, row: usize) -> DateTime<Utc> {
        self.start + Duration::hours(row as i64)
    }

    pub fn row_index(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let offset = (timestamp - self.start).num_hours();
        (offset >= 0
            && (offset as usize) < self.rows.len()
            && self.timestamp(offset as usize) == timestamp)
            .then_some(offset as usize)
    }

    pub fn value(&self, timestamp: DateTime<Utc>, column: usize) -> Option<f64> {
        self.row_index(timestamp)
            .and_then(|row| self.rows[row].get(column).copied().flatten())
    }

    /// The forecast horizon `H+1 ..= H+24`
    pub fn horizon(&self) -> Vec<DateTime<Utc>> {
        hourly_range(self.history_end + Duration::hours(1), HORIZON_HOURS).collect()
    }

    /// Forward fill each column, carrying a value at most `limit_hours` past
    /// its last observation. Returns the number of filled cells per column.
    pub fn forward_fill(&mut self, limit_hours: u32) -> Vec<usize> {
        let limit = limit_hours as usize;
        let mut filled = vec![0usize; self.columns.len()];

        for (col, count) in filled.iter_mut().enumerate() {
            let mut last: Option<(usize, f64)> = None;
            for (i, row) in self.rows.iter_mut().enumerate() {
                match row[col] {
                    Some(v) => last = Some((i, v)),
                    None => {
                        if let Some((at, v)) = last {
                            if i - at <= limit {
                                row[col] = Some(v);
                                *count += 1;
                            }
                        }
                    }
                }
            }
        }

        filled
    }
}

/// Join the three sources on the hourly window ending at the last observed
/// price plus the forecast horizon, then apply the forward-fill policy.
pub fn align(
    sources: &SourceTables,
    lookback_hours: u32,
    fill_limit_hours: u32,
) -> Result<AlignedTable> {
    let prices = &sources.prices;
    let history_end = prices.last_observed(0).ok_or_else(|| {
        ForecastError::MissingData(format!("{} table holds no observed prices", prices.name))
    })?;

    let lookback = lookback_hours.max(1) as usize;
    let start = history_end - Duration::hours(lookback as i64 - 1);

    // first_observed is Some whenever last_observed is
    if let Some(first) = prices.first_observed(0) {
        if first > start {
            let available = (history_end - first).num_hours() + 1;
            return Err(ForecastError::MissingData(format!(
                "insufficient history: {lookback}h of prices required up to {history_end}, \
                 only {available}h available from {first}"
            )));
        }
    }

    let sources_in_order: [&TimeSeriesTable; 3] = [prices, &sources.weather, &sources.grid];
    let columns: Vec<String> = sources_in_order
        .iter()
        .flat_map(|t| t.columns.iter().cloned())
        .collect();

    let rows: Vec<Vec<Option<f64>>> = hourly_range(start, lookback + HORIZON_HOURS)
        .map(|ts| {
            sources_in_order
                .iter()
                .flat_map(|table| (0..table.columns.len()).map(move |c| table.value_at(ts, c)))
                .collect()
        })
        .collect();

    let mut table = AlignedTable::new(start, history_end, columns, rows);
    let filled = table.forward_fill(fill_limit_hours);

    for (column, count) in table.columns().iter().zip(&filled) {
        if *count > 0 {
            debug!(column = %column, filled = count, "forward-filled missing hours");
        }
    }
    if sources.weather.last_observed(0).map_or(true, |t| t < history_end)
        || sources.grid.last_observed(0).map_or(true, |t| t < history_end)
    {
        warn!(%history_end, "weather or grid data ends before the last price hour");
    }

    debug!(%start, %history_end, rows = table.len(), "aligned input tables");
    Ok(table)
}
