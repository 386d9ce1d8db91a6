//! Domain results, shared references and the append-only results map.

use crate::domain::dataset::Series;
use crate::domain::error::EngineError;
use crate::domain::timeseries::normalize_for_serialization;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Suffix every reference-valued field name carries.
pub const REF_SUFFIX: &str = "_ref";

/// Dotted pointer `"<domain>.<field>"` into an earlier domain's result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedRef {
    pub domain: Cow<'static, str>,
    pub field: Cow<'static, str>,
}

impl SharedRef {
    pub const fn of(domain: &'static str, field: &'static str) -> Self {
        Self {
            domain: Cow::Borrowed(domain),
            field: Cow::Borrowed(field),
        }
    }
}

impl fmt::Display for SharedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.field)
    }
}

impl FromStr for SharedRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, field))
                if !domain.is_empty() && !field.is_empty() && !field.contains('.') =>
            {
                Ok(Self {
                    domain: Cow::Owned(domain.to_string()),
                    field: Cow::Owned(field.to_string()),
                })
            }
            _ => Err(EngineError::InvalidReference {
                path: s.to_string(),
            }),
        }
    }
}

/// One value in a domain result.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Numeric series aligned with the master dates.
    Series(Series),
    /// Text series aligned with the master dates.
    Labels(Vec<Option<String>>),
    /// Scalar or summary object.
    Scalar(Value),
    Reference(SharedRef),
    Null,
}

impl Field {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Field::Series(_) => "series",
            Field::Labels(_) => "labels",
            Field::Scalar(Value::Object(_)) => "object",
            Field::Scalar(Value::Number(_)) => "number",
            Field::Scalar(Value::String(_)) => "text",
            Field::Scalar(_) => "scalar",
            Field::Reference(_) => "reference",
            Field::Null => "null",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Field::Series(s) => Value::Array(
                s.iter()
                    .map(|v| v.and_then(serde_json::Number::from_f64).map_or(Value::Null, Value::Number))
                    .collect(),
            ),
            Field::Labels(l) => Value::Array(
                l.iter()
                    .map(|v| v.clone().map_or(Value::Null, Value::String))
                    .collect(),
            ),
            Field::Scalar(v) => v.clone(),
            Field::Reference(r) => Value::String(r.to_string()),
            Field::Null => Value::Null,
        }
    }
}

/// Named structured output of one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainResult {
    domain: &'static str,
    fields: BTreeMap<String, Field>,
}

impl DomainResult {
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            fields: BTreeMap::new(),
        }
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        self.fields.insert(name.into(), field);
    }

    pub fn insert_series(&mut self, name: impl Into<String>, series: Series) {
        self.insert(name, Field::Series(series));
    }

    pub fn insert_labels(&mut self, name: impl Into<String>, labels: Vec<Option<String>>) {
        self.insert(name, Field::Labels(labels));
    }

    /// Insert a JSON-safe scalar or summary object.
    pub fn insert_scalar<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<(), EngineError> {
        let value = normalize_for_serialization(value)?;
        self.insert(name, Field::Scalar(value));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn series(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.fields.get(name) {
            Some(Field::Series(s)) => Some(s.as_slice()),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The per-domain output document. Keys are sorted, so output is deterministic.
    pub fn to_document(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// What a domain left in the results map for this run.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainOutcome {
    Computed(DomainResult),
    /// Placeholder for a domain that raised or failed validation.
    Failed { reason: String },
}

/// Append-only map of domain name to outcome; each key is written once.
#[derive(Debug, Clone, Default)]
pub struct ResultsMap {
    entries: BTreeMap<&'static str, DomainOutcome>,
}

impl ResultsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: &'static str, outcome: DomainOutcome) -> Result<(), EngineError> {
        if self.entries.contains_key(domain) {
            return Err(EngineError::DuplicateResult {
                domain: domain.to_string(),
            });
        }
        self.entries.insert(domain, outcome);
        Ok(())
    }

    pub fn get(&self, domain: &str) -> Option<&DomainOutcome> {
        self.entries.get(domain)
    }

    pub fn computed(&self, domain: &str) -> Option<&DomainResult> {
        match self.entries.get(domain) {
            Some(DomainOutcome::Computed(r)) => Some(r),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DomainOutcome)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dereference `reference` against computed results.
///
/// Returns `None` when the domain is absent or failed, or the field is
/// missing or null.
pub fn resolve<'a>(reference: &SharedRef, results: &'a ResultsMap) -> Option<&'a Field> {
    results
        .computed(&reference.domain)?
        .get(&reference.field)
        .filter(|f| !matches!(f, Field::Null))
}

/// Read-only view of prior results restricted to a domain's declared upstream fields.
pub struct UpstreamView<'a> {
    domain: &'static str,
    results: &'a ResultsMap,
    declared: &'static [SharedRef],
    missing: RefCell<BTreeSet<String>>,
}

impl<'a> UpstreamView<'a> {
    pub fn new(domain: &'static str, results: &'a ResultsMap, declared: &'static [SharedRef]) -> Self {
        Self {
            domain,
            results,
            declared,
            missing: RefCell::new(BTreeSet::new()),
        }
    }

    fn lookup(&self, reference: &SharedRef) -> Result<Option<&'a Field>, EngineError> {
        if !self.declared.contains(reference) {
            return Err(EngineError::UndeclaredUpstream {
                domain: self.domain.to_string(),
                reference: reference.to_string(),
            });
        }
        let found = resolve(reference, self.results);
        if found.is_none() {
            tracing::warn!(
                domain = self.domain,
                reference = %reference,
                "upstream field missing, substituting null"
            );
            self.missing.borrow_mut().insert(reference.to_string());
        }
        Ok(found)
    }

    /// Numeric series behind `reference`, or `None` if it is missing upstream.
    pub fn series(&self, reference: &SharedRef) -> Result<Option<&'a [Option<f64>]>, EngineError> {
        match self.lookup(reference)? {
            Some(Field::Series(s)) => Ok(Some(s.as_slice())),
            Some(_) => {
                self.missing.borrow_mut().insert(reference.to_string());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Like [`UpstreamView::series`], but a missing field becomes an all-null series.
    pub fn series_or_null(&self, reference: &SharedRef, len: usize) -> Result<Series, EngineError> {
        Ok(self
            .series(reference)?
            .map(|s| s.to_vec())
            .unwrap_or_else(|| vec![None; len]))
    }

    /// A `_ref` field pointing at `reference`, or `Field::Null` if it cannot be resolved.
    pub fn reference(&self, reference: &SharedRef) -> Result<Field, EngineError> {
        Ok(match self.lookup(reference)? {
            Some(_) => Field::Reference(reference.clone()),
            None => Field::Null,
        })
    }

    /// References that could not be resolved during this call.
    pub fn missing(&self) -> Vec<String> {
        self.missing.borrow().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BTC: SharedRef = SharedRef::of("shared", "btc_price");
    const TOTAL: SharedRef = SharedRef::of("gli", "total");

    fn shared_result() -> DomainResult {
        let mut r = DomainResult::new("shared");
        r.insert_series("btc_price", vec![Some(1.0), None]);
        r.insert("empty", Field::Null);
        r
    }

    #[test]
    fn shared_ref_round_trips_through_display() {
        let parsed: SharedRef = "shared.btc_price".parse().unwrap();
        assert_eq!(parsed, BTC);
        assert_eq!(parsed.to_string(), "shared.btc_price");
    }

    #[test]
    fn shared_ref_rejects_bad_paths() {
        for path in ["shared", ".x", "shared.", "a.b.c"] {
            assert!(path.parse::<SharedRef>().is_err(), "{path}");
        }
    }

    #[test]
    fn document_serializes_fields() {
        let mut r = DomainResult::new("gli");
        r.insert_series("total", vec![Some(1.5), None]);
        r.insert("btc_price_ref", Field::Reference(BTC));
        r.insert_scalar("note", "constant composition").unwrap();

        assert_eq!(
            r.to_document(),
            json!({
                "btc_price_ref": "shared.btc_price",
                "note": "constant composition",
                "total": [1.5, null],
            })
        );
    }

    #[test]
    fn results_map_is_write_once() {
        let mut map = ResultsMap::new();
        map.insert("shared", DomainOutcome::Computed(shared_result()))
            .unwrap();
        let err = map
            .insert("shared", DomainOutcome::Failed { reason: "x".into() })
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateResult { .. }));
        assert!(map.computed("shared").is_some());
    }

    #[test]
    fn resolve_handles_missing_and_failed() {
        let mut map = ResultsMap::new();
        map.insert("shared", DomainOutcome::Computed(shared_result()))
            .unwrap();
        map.insert("gli", DomainOutcome::Failed { reason: "boom".into() })
            .unwrap();

        assert!(resolve(&BTC, &map).is_some());
        assert!(resolve(&TOTAL, &map).is_none());
        assert!(resolve(&SharedRef::of("shared", "empty"), &map).is_none());
        assert!(resolve(&SharedRef::of("m2", "total"), &map).is_none());
    }

    #[test]
    fn upstream_view_rejects_undeclared() {
        static DECLARED: [SharedRef; 1] = [BTC];
        let map = ResultsMap::new();
        let view = UpstreamView::new("crypto", &map, &DECLARED);

        let err = view.series(&TOTAL).unwrap_err();
        assert!(matches!(err, EngineError::UndeclaredUpstream { .. }));
    }

    #[test]
    fn upstream_view_records_missing() {
        static DECLARED: [SharedRef; 1] = [BTC];
        let map = ResultsMap::new();
        let view = UpstreamView::new("crypto", &map, &DECLARED);

        assert_eq!(view.series(&BTC).unwrap(), None);
        assert_eq!(view.reference(&BTC).unwrap(), Field::Null);
        assert_eq!(view.series_or_null(&BTC, 3).unwrap(), vec![None; 3]);
        assert_eq!(view.missing(), vec!["shared.btc_price".to_string()]);
    }

    #[test]
    fn upstream_view_serves_declared_series() {
        static DECLARED: [SharedRef; 1] = [BTC];
        let mut map = ResultsMap::new();
        map.insert("shared", DomainOutcome::Computed(shared_result()))
            .unwrap();
        let view = UpstreamView::new("crypto", &map, &DECLARED);

        assert_eq!(view.series(&BTC).unwrap(), Some(&[Some(1.0), None][..]));
        assert_eq!(view.reference(&BTC).unwrap(), Field::Reference(BTC));
        assert!(view.missing().is_empty());
    }
}
