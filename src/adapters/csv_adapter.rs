//! Wide CSV dataset adapter.
//!
//! Layout: `date,<column>,<column>...` with ISO dates, one row per date. Empty,
//! `NA` and `.` cells are gaps.

use crate::domain::dataset::{Dataset, Series};
use crate::domain::error::EngineError;
use crate::ports::dataset_port::DatasetPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const DATE_COLUMN: &str = "date";
const MISSING_MARKERS: [&str; 3] = ["", "NA", "."];

pub struct CsvDatasetAdapter {
    path: PathBuf,
}

impl CsvDatasetAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn integrity(reason: String) -> EngineError {
    EngineError::DatasetIntegrity { reason }
}

fn parse_cell(raw: &str, column: &str, line: usize) -> Result<Option<f64>, EngineError> {
    let raw = raw.trim();
    if MISSING_MARKERS.contains(&raw) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|e| integrity(format!("line {line}, column {column}: invalid value {raw:?}: {e}")))
}

/// Parse wide CSV text into a dataset.
pub fn parse_dataset(content: &str) -> Result<Dataset, EngineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| integrity(format!("CSV header error: {e}")))?
        .clone();
    match headers.get(0) {
        Some(first) if first == DATE_COLUMN => {}
        other => {
            return Err(integrity(format!(
                "first column must be {DATE_COLUMN:?}, found {:?}",
                other.unwrap_or("")
            )));
        }
    }

    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut columns: Vec<Series> = vec![Vec::new(); names.len()];
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(integrity(format!("duplicate column {name}")));
        }
    }

    let mut dates = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = record.map_err(|e| integrity(format!("CSV parse error: {e}")))?;

        let date_str = record.get(0).unwrap_or("").trim();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| integrity(format!("line {line}: invalid date {date_str:?}: {e}")))?;
        dates.push(date);

        for (i, name) in names.iter().enumerate() {
            let raw = record.get(i + 1).unwrap_or("");
            columns[i].push(parse_cell(raw, name, line)?);
        }
    }

    let columns: BTreeMap<String, Series> = names.into_iter().zip(columns).collect();
    Dataset::new(dates, columns)
}

impl DatasetPort for CsvDatasetAdapter {
    fn load_dataset(&self) -> Result<Dataset, EngineError> {
        let content = fs::read_to_string(&self.path)?;
        let dataset = parse_dataset(&content)?;
        match dataset.date_range() {
            Some((first, last, count)) => tracing::info!(
                path = %self.path.display(),
                %first,
                %last,
                dates = count,
                columns = dataset.column_names().count(),
                "dataset loaded"
            ),
            None => tracing::warn!(path = %self.path.display(), "dataset has no rows"),
        }
        Ok(dataset)
    }
}
