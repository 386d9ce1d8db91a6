//! Per-domain schema: structural validation, JSON description and SQL table definition.

use crate::domain::result::{DomainResult, Field, REF_SUFFIX};
use crate::domain::timeseries::ROC_WINDOWS;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Series,
    Labels,
    Number,
    Text,
    Object,
    Reference,
}

impl FieldKind {
    fn matches(self, field: &Field) -> bool {
        match (self, field) {
            (FieldKind::Series, Field::Series(_)) => true,
            (FieldKind::Labels, Field::Labels(_)) => true,
            (FieldKind::Number, Field::Scalar(Value::Number(_))) => true,
            (FieldKind::Text, Field::Scalar(Value::String(_))) => true,
            (FieldKind::Object, Field::Scalar(Value::Object(_))) => true,
            (FieldKind::Reference, Field::Reference(_)) => true,
            _ => false,
        }
    }

    /// Whether the field holds one value per date.
    pub fn is_per_date(self) -> bool {
        matches!(self, FieldKind::Series | FieldKind::Labels)
    }

    fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Series | FieldKind::Number => "REAL",
            _ => "TEXT",
        }
    }

    fn json_type(self) -> Value {
        match self {
            FieldKind::Series => json!({"type": "array", "items": {"type": ["number", "null"]}}),
            FieldKind::Labels => json!({"type": "array", "items": {"type": ["string", "null"]}}),
            FieldKind::Number => json!({"type": "number"}),
            FieldKind::Text => json!({"type": "string"}),
            FieldKind::Object => json!({"type": "object"}),
            FieldKind::Reference => json!({"type": "string", "pattern": "^[a-z0-9_]+\\.[a-z0-9_]+$"}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainSchema {
    pub domain: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl DomainSchema {
    pub fn new(domain: &'static str) -> Self {
        Self {
            domain,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            nullable: false,
        });
        self
    }

    /// A `_ref` field; null when the target could not be resolved.
    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: FieldKind::Reference,
            nullable: true,
        });
        self
    }

    /// A per-date series plus its ROC, z-score and percentile companions.
    pub fn rolling(self, prefix: &str) -> Self {
        self.field(prefix, FieldKind::Series).rolling_stats(prefix)
    }

    /// Only the companions of a series held by another domain.
    pub fn rolling_stats(mut self, prefix: &str) -> Self {
        for (suffix, _) in ROC_WINDOWS {
            self = self.field(format!("{prefix}_roc_{suffix}"), FieldKind::Series);
        }
        self.field(format!("{prefix}_zscore"), FieldKind::Series)
            .field(format!("{prefix}_percentile"), FieldKind::Series)
    }

    /// Every structural violation in `result`; empty means valid.
    pub fn validate(&self, result: &DomainResult, date_count: usize) -> Vec<String> {
        let mut errors = Vec::new();

        if result.domain() != self.domain {
            errors.push(format!(
                "result belongs to {}, schema to {}",
                result.domain(),
                self.domain
            ));
        }

        for spec in &self.fields {
            let Some(field) = result.get(&spec.name) else {
                errors.push(format!("missing field {}", spec.name));
                continue;
            };
            if matches!(field, Field::Null) {
                if !spec.nullable {
                    errors.push(format!("field {} is null", spec.name));
                }
                continue;
            }
            if !spec.kind.matches(field) {
                errors.push(format!(
                    "field {} is {}, expected {:?}",
                    spec.name,
                    field.kind_name(),
                    spec.kind
                ));
                continue;
            }
            let len = match field {
                Field::Series(s) => Some(s.len()),
                Field::Labels(l) => Some(l.len()),
                _ => None,
            };
            match len {
                Some(len) if len != date_count => errors.push(format!(
                    "field {} has {} values for {} dates",
                    spec.name, len, date_count
                )),
                _ => {}
            }
        }

        for (name, field) in result.fields() {
            let is_ref = matches!(field, Field::Reference(_));
            if is_ref != name.ends_with(REF_SUFFIX) && !matches!(field, Field::Null) {
                errors.push(format!("field {name} breaks the _ref naming rule"));
            }
        }

        errors
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut ty = f.kind.json_type();
                if f.nullable {
                    ty = json!({"anyOf": [ty, {"type": "null"}]});
                }
                (f.name.clone(), ty)
            })
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        json!({
            "title": self.domain,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Per-date fields, in declaration order.
    pub fn per_date_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind.is_per_date())
    }

    /// Table with one row per date and one column per per-date field.
    pub fn create_table_sql(&self) -> String {
        let mut columns = vec!["    date TEXT PRIMARY KEY".to_string()];
        for f in self.per_date_fields() {
            columns.push(format!("    \"{}\" {}", f.name, f.kind.sql_type()));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n{}\n);",
            self.domain,
            columns.join(",\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::SharedRef;

    fn schema() -> DomainSchema {
        DomainSchema::new("gli")
            .field("total", FieldKind::Series)
            .field("composition_note", FieldKind::Text)
            .reference("dates_ref")
    }

    fn valid_result() -> DomainResult {
        let mut r = DomainResult::new("gli");
        r.insert_series("total", vec![Some(1.0), Some(2.0)]);
        r.insert_scalar("composition_note", "constant").unwrap();
        r.insert("dates_ref", Field::Reference(SharedRef::of("shared", "dates")));
        r
    }

    #[test]
    fn valid_result_passes() {
        assert!(schema().validate(&valid_result(), 2).is_empty());
    }

    #[test]
    fn wrong_length_is_reported() {
        let errors = schema().validate(&valid_result(), 3);
        assert_eq!(errors, vec!["field total has 2 values for 3 dates"]);
    }

    #[test]
    fn missing_and_wrong_kind_are_reported() {
        let mut r = DomainResult::new("gli");
        r.insert_scalar("total", &1.0).unwrap();
        r.insert("dates_ref", Field::Null);
        let errors = schema().validate(&r, 2);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("total is number"));
        assert_eq!(errors[1], "missing field composition_note");
    }

    #[test]
    fn ref_naming_rule_is_enforced() {
        let mut r = valid_result();
        r.insert("btc_price", Field::Reference(SharedRef::of("shared", "btc_price")));
        let errors = schema().validate(&r, 2);
        assert_eq!(errors, vec!["field btc_price breaks the _ref naming rule"]);
    }

    #[test]
    fn rolling_expands_companion_fields() {
        let s = DomainSchema::new("m2").rolling("total");
        let names: Vec<&str> = s.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "total",
                "total_roc_1m",
                "total_roc_3m",
                "total_roc_6m",
                "total_roc_1y",
                "total_zscore",
                "total_percentile",
            ]
        );
    }

    #[test]
    fn create_table_sql_has_date_key_and_series_columns() {
        let sql = schema().create_table_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"gli\" (\n    date TEXT PRIMARY KEY,\n    \"total\" REAL\n);"
        );
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let js = schema().to_json_schema();
        assert_eq!(js["title"], "gli");
        assert_eq!(js["required"], json!(["total", "composition_note", "dates_ref"]));
        assert!(js["properties"]["dates_ref"]["anyOf"].is_array());
    }
}
