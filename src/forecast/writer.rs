//! Atomic CSV output of the forecast horizon
//!
//! Rows are written to a temporary file in the destination directory, synced
//! and renamed over the destination. Readers see either the previous file or
//! the complete new one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::ForecastRow;
use crate::error::{ForecastError, Result};

pub struct ForecastWriter {
    path: PathBuf,
    /// Names of per-member columns, written as `{name}_pred`
    member_columns: Vec<String>,
}

impl ForecastWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            member_columns: Vec::new(),
        }
    }

    pub fn with_member_columns(mut self, names: Vec<String>) -> Self {
        self.member_columns = names;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["timestamp".to_string(), "predicted_price".to_string()];
        header.extend(self.member_columns.iter().map(|n| format!("{n}_pred")));
        header
    }

    pub fn write(&self, rows: &[ForecastRow]) -> Result<()> {
        for row in rows {
            let members = if self.member_columns.is_empty() {
                &[][..]
            } else {
                &row.member_predictions[..]
            };
            if !row.predicted_price.is_finite() || members.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::Prediction(format!(
                    "refusing to write non-finite prediction for {}",
                    row.timestamp_string()
                )));
            }
            if !self.member_columns.is_empty() && members.len() != self.member_columns.len() {
                return Err(ForecastError::Prediction(format!(
                    "{} member predictions for {}, expected {}",
                    members.len(),
                    row.timestamp_string(),
                    self.member_columns.len()
                )));
            }
        }

        self.write_atomic(rows)
            .map_err(|e| ForecastError::write(&self.path, e))?;
        debug!(path = %self.path.display(), rows = rows.len(), "forecast file replaced");
        Ok(())
    }

    fn write_atomic(&self, rows: &[ForecastRow]) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".predictions")
            .suffix(".tmp")
            .tempfile_in(parent)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(self.header())?;
            for row in rows {
                let mut record = vec![
                    row.timestamp_string(),
                    format!("{:.6}", row.predicted_price),
                ];
                if !self.member_columns.is_empty() {
                    record.extend(row.member_predictions.iter().map(|v| format!("{v:.6}")));
                }
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }

        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn rows(n: usize) -> Vec<ForecastRow> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                ForecastRow::new(
                    start + Duration::hours(i as i64),
                    1.5 + i as f64,
                    vec![1.0, 2.0 + i as f64],
                )
            })
            .collect()
    }

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("predictions_next_24h.csv");

        ForecastWriter::new(&path).write(&rows(24)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 25);
        assert_eq!(lines[0], "timestamp,predicted_price");
        assert_eq!(lines[1], "2025-01-01T00:00:00Z,1.500000");
        assert_eq!(lines[24], "2025-01-01T23:00:00Z,24.500000");
    }

    #[test]
    fn test_member_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.csv");

        ForecastWriter::new(&path)
            .with_member_columns(vec!["gbr".to_string(), "nn".to_string()])
            .write(&rows(2))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("timestamp,predicted_price,gbr_pred,nn_pred"));
        assert_eq!(lines.next(), Some("2025-01-01T00:00:00Z,1.500000,1.000000,2.000000"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let writer = ForecastWriter::new(&path);

        writer.write(&rows(24)).unwrap();
        writer.write(&rows(3)).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_non_finite_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.csv");
        let writer = ForecastWriter::new(&path);
        writer.write(&rows(24)).unwrap();
        let before = fs::read(&path).unwrap();

        let mut bad = rows(24);
        bad[5].predicted_price = f64::NAN;
        assert!(matches!(writer.write(&bad), Err(ForecastError::Prediction(_))));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();

        let err = ForecastWriter::new(blocker.join("p.csv")).write(&rows(1)).unwrap_err();
        assert!(matches!(err, ForecastError::Write { .. }));
    }
}
