//! Hourly time series tables
//!
//! A [`TimeSeriesTable`] holds one loaded source (prices, weather or grid)
//! after resampling to hourly resolution. Timestamps are unique and strictly
//! increasing; missing observations are `None`.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One hour of observations for a table's declared columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesTable {
    pub name: String,
    pub columns: Vec<String>,
    records: Vec<TimeSeriesRecord>,
}

impl TimeSeriesTable {
    /// Build a table from records. Records are sorted; a later record with the
    /// same timestamp replaces an earlier one.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        mut records: Vec<TimeSeriesRecord>,
    ) -> Self {
        records.sort_by_key(|r| r.timestamp);
        let mut deduped: Vec<TimeSeriesRecord> = Vec::with_capacity(records.len());
        for record in records {
            match deduped.last_mut() {
                Some(last) if last.timestamp == record.timestamp => *last = record,
                _ => deduped.push(record),
            }
        }

        Self {
            name: name.into(),
            columns,
            records: deduped,
        }
    }

    pub fn records(&self) -> &[TimeSeriesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Observation for `column` at exactly `timestamp`
    pub fn value_at(&self, timestamp: DateTime<Utc>, column: usize) -> Option<f64> {
        self.records
            .binary_search_by_key(&timestamp, |r| r.timestamp)
            .ok()
            .and_then(|i| self.records[i].values.get(column).copied().flatten())
    }

    /// Earliest hour with an observed value in `column`
    pub fn first_observed(&self, column: usize) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .find(|r| r.values.get(column).copied().flatten().is_some())
            .map(|r| r.timestamp)
    }

    /// Latest hour with an observed value in `column`
    pub fn last_observed(&self, column: usize) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .rev()
            .find(|r| r.values.get(column).copied().flatten().is_some())
            .map(|r| r.timestamp)
    }
}

/// Truncate a timestamp to the start of its hour
pub fn floor_to_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

/// Contiguous hourly index `start, start+1h, ..., start+(count-1)h`
pub fn hourly_range(start: DateTime<Utc>, count: usize) -> impl Iterator<Item = DateTime<Utc>> {
    (0..count as i64).map(move |i| start + Duration::hours(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, 0, 0).unwrap()
    }

    fn record(h: u32, v: Option<f64>) -> TimeSeriesRecord {
        TimeSeriesRecord {
            timestamp: hour(h),
            values: vec![v],
        }
    }

    #[test]
    fn test_records_sorted_and_unique() {
        let table = TimeSeriesTable::new(
            "prices",
            vec!["price".to_string()],
            vec![record(3, Some(3.0)), record(1, Some(1.0)), record(3, Some(30.0))],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].timestamp, hour(1));
        assert_eq!(table.value_at(hour(3), 0), Some(30.0));
    }

    #[test]
    fn test_first_and_last_observed_skip_missing() {
        let table = TimeSeriesTable::new(
            "prices",
            vec!["price".to_string()],
            vec![record(0, None), record(1, Some(1.0)), record(2, Some(2.0)), record(3, None)],
        );

        assert_eq!(table.first_observed(0), Some(hour(1)));
        assert_eq!(table.last_observed(0), Some(hour(2)));
        assert_eq!(table.value_at(hour(3), 0), None);
        assert_eq!(table.value_at(hour(9), 0), None);
    }

    #[test]
    fn test_floor_to_hour() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 10, 7, 45, 12).unwrap();
        assert_eq!(floor_to_hour(ts), hour(7));
    }

    #[test]
    fn test_hourly_range() {
        let hours: Vec<_> = hourly_range(hour(22), 3).collect();
        assert_eq!(hours.len(), 3);
        assert_eq!(hours[2], Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
    }
}
