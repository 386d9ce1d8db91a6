//! Date-indexed source dataset.
//!
//! Every column shares one master sequence of dates. Gaps are stored as `None`,
//! never as omitted dates.

use crate::domain::error::EngineError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone)]
pub struct Dataset {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Series>,
    date_index: HashMap<NaiveDate, usize>,
}

impl Dataset {
    /// Build a dataset, enforcing strictly increasing dates and equal column lengths.
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Series>,
    ) -> Result<Self, EngineError> {
        for pair in dates.windows(2) {
            if pair[1] == pair[0] {
                return Err(EngineError::DatasetIntegrity {
                    reason: format!("duplicate date {}", pair[1]),
                });
            }
            if pair[1] < pair[0] {
                return Err(EngineError::DatasetIntegrity {
                    reason: format!("date {} follows {}", pair[1], pair[0]),
                });
            }
        }

        for (name, series) in &columns {
            if series.len() != dates.len() {
                return Err(EngineError::DatasetIntegrity {
                    reason: format!(
                        "column {} has {} values for {} dates",
                        name,
                        series.len(),
                        dates.len()
                    ),
                });
            }
        }

        // Non-finite inputs are treated as gaps.
        let columns = columns
            .into_iter()
            .map(|(name, series)| {
                let cleaned = series
                    .into_iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect();
                (name, cleaned)
            })
            .collect();

        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        Ok(Self {
            dates,
            columns,
            date_index,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|s| s.as_slice())
    }

    /// Like [`Dataset::column`] but a missing column is an error.
    pub fn require(&self, name: &str) -> Result<&[Option<f64>], EngineError> {
        self.column(name).ok_or_else(|| EngineError::MissingColumn {
            column: name.to_string(),
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// First and last date, plus the number of dates.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate, usize)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last, self.dates.len())),
            _ => None,
        }
    }

    /// ISO-8601 labels for the master date sequence.
    pub fn date_labels(&self) -> Vec<Option<String>> {
        self.dates
            .iter()
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn columns(pairs: &[(&str, Series)]) -> BTreeMap<String, Series> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn new_accepts_increasing_dates() {
        let ds = Dataset::new(
            vec![d(1), d(2), d(3)],
            columns(&[("vix", vec![Some(12.0), None, Some(14.0)])]),
        )
        .unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.column("vix").unwrap()[1], None);
        assert_eq!(ds.index_of(d(2)), Some(1));
        assert_eq!(ds.date_range(), Some((d(1), d(3), 3)));
    }

    #[test]
    fn new_rejects_duplicate_dates() {
        let err = Dataset::new(vec![d(1), d(1)], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::DatasetIntegrity { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn new_rejects_decreasing_dates() {
        let err = Dataset::new(vec![d(2), d(1)], BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::DatasetIntegrity { .. }));
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = Dataset::new(
            vec![d(1), d(2)],
            columns(&[("vix", vec![Some(1.0)])]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("column vix"));
    }

    #[test]
    fn non_finite_inputs_become_gaps() {
        let ds = Dataset::new(
            vec![d(1), d(2)],
            columns(&[("vix", vec![Some(f64::NAN), Some(f64::INFINITY)])]),
        )
        .unwrap();
        assert_eq!(ds.column("vix").unwrap(), &[None, None]);
    }

    #[test]
    fn require_reports_missing_column() {
        let ds = Dataset::new(vec![d(1)], BTreeMap::new()).unwrap();
        let err = ds.require("tga").unwrap_err();
        assert_eq!(err.to_string(), "dataset has no column tga");
    }

    #[test]
    fn date_labels_are_iso() {
        let ds = Dataset::new(vec![d(5)], BTreeMap::new()).unwrap();
        assert_eq!(ds.date_labels(), vec![Some("2024-01-05".to_string())]);
    }

    #[test]
    fn empty_dataset_has_no_range() {
        let ds = Dataset::new(vec![], BTreeMap::new()).unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.date_range(), None);
    }
}
