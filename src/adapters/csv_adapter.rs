//! CSV file data adapter.
//!
//! Bars live in `<CODE>.csv` with a `date,open,high,low,close,volume`
//! header; auxiliary datasets live in `<dataset>.csv` with named columns.

use crate::domain::auxiliary::{DatasetId, FieldValue, RawRecord};
use crate::domain::error::SamallocError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, stem: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", stem))
    }

    fn read(&self, stem: &str) -> Result<String, SamallocError> {
        let path = self.csv_path(stem);
        fs::read_to_string(&path).map_err(|e| SamallocError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }

    /// Codes with a bar file in the base directory.
    pub fn list_codes(&self) -> Result<Vec<String>, SamallocError> {
        let mut codes = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".csv") {
                if stem.parse::<DatasetId>().is_err() {
                    codes.push(stem.to_string());
                }
            }
        }
        codes.sort();
        Ok(codes)
    }
}

fn column(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, SamallocError> {
    record
        .get(index)
        .ok_or_else(|| SamallocError::Data {
            reason: format!("missing {} column", name),
        })?
        .trim()
        .parse()
        .map_err(|e| SamallocError::Data {
            reason: format!("invalid {} value: {}", name, e),
        })
}

fn field_value(raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match trimmed.parse::<f64>() {
        Ok(v) => FieldValue::Number(v),
        Err(_) => FieldValue::Text(trimmed.to_string()),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, code: &str) -> Result<Vec<OhlcvBar>, SamallocError> {
        let content = self.read(code)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| SamallocError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(0).ok_or_else(|| SamallocError::Data {
                reason: "missing date column".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
                SamallocError::Data {
                    reason: format!("invalid date format: {}", e),
                }
            })?;

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: column(&record, 1, "open")?,
                high: column(&record, 2, "high")?,
                low: column(&record, 3, "low")?,
                close: column(&record, 4, "close")?,
                volume: column(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn fetch_auxiliary(&self, dataset: DatasetId) -> Result<Vec<RawRecord>, SamallocError> {
        let content = self.read(dataset.name())?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| SamallocError::Data {
                reason: format!("CSV header error: {}", e),
            })?
            .clone();

        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| SamallocError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let raw: RawRecord = headers
                .iter()
                .zip(record.iter())
                .filter_map(|(name, value)| {
                    field_value(value).map(|v| (name.trim().to_string(), v))
                })
                .collect();
            records.push(raw);
        }
        Ok(records)
    }
}
