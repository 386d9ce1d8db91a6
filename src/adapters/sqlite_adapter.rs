//! SQLite result store.
//!
//! Each domain gets a table with one row per date and one column per per-date
//! field. Scalar, object and reference fields go to `domain_summaries` as JSON.

use crate::domain::error::EngineError;
use crate::domain::result::{DomainResult, Field};
use crate::domain::schema::DomainSchema;
use crate::ports::result_store_port::ResultStore;
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter};
use serde_json::{Map, Value};
use std::path::Path;

pub const DEFAULT_POOL_SIZE: u32 = 4;

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn query_error(e: rusqlite::Error) -> EngineError {
    EngineError::persistence(e)
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
    }
}

fn cell(field: Option<&Field>, index: usize) -> SqlValue {
    match field {
        Some(Field::Series(s)) => s.get(index).copied().flatten().map_or(SqlValue::Null, SqlValue::Real),
        Some(Field::Labels(l)) => l.get(index).cloned().flatten().map_or(SqlValue::Null, SqlValue::Text),
        _ => SqlValue::Null,
    }
}

impl SqliteStore {
    pub fn from_path(path: &Path, pool_size: u32) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::persistence(e))?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::persistence(e))?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, EngineError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| EngineError::persistence(e))
    }

    pub fn initialize_schema(&self) -> Result<(), EngineError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS domain_summaries (
                domain TEXT NOT NULL,
                field TEXT NOT NULL,
                value_json TEXT NOT NULL,
                PRIMARY KEY (domain, field)
            );
            CREATE TABLE IF NOT EXISTS merged_documents (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                document TEXT NOT NULL
            );",
        )
        .map_err(query_error)
    }

    fn table_exists(conn: &rusqlite::Connection, table: &str) -> Result<bool, EngineError> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count > 0)
    }

    /// The last merged document, if one was saved.
    pub fn load_merged(&self) -> Result<Option<Value>, EngineError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT document FROM merged_documents WHERE id = 1")
            .map_err(query_error)?;
        let mut rows = stmt.query([]).map_err(query_error)?;
        match rows.next().map_err(query_error)? {
            Some(row) => {
                let text: String = row.get(0).map_err(query_error)?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }
}

impl ResultStore for SqliteStore {
    fn save(&self, schema: &DomainSchema, dates: &[NaiveDate], result: &DomainResult) -> Result<(), EngineError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(query_error)?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", schema.domain))
            .map_err(query_error)?;
        tx.execute_batch(&schema.create_table_sql()).map_err(query_error)?;

        let columns: Vec<&str> = schema.per_date_fields().map(|f| f.name.as_str()).collect();
        let column_list: String = std::iter::once("date".to_string())
            .chain(columns.iter().map(|c| format!("\"{c}\"")))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders: String = (1..=columns.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!(
            "INSERT INTO \"{}\" ({column_list}) VALUES ({placeholders})",
            schema.domain
        );

        {
            let mut stmt = tx.prepare(&insert).map_err(query_error)?;
            for (i, date) in dates.iter().enumerate() {
                let row = std::iter::once(SqlValue::Text(date.format("%Y-%m-%d").to_string()))
                    .chain(columns.iter().map(|c| cell(result.get(c), i)));
                stmt.execute(params_from_iter(row)).map_err(query_error)?;
            }
        }

        tx.execute(
            "DELETE FROM domain_summaries WHERE domain = ?1",
            params![schema.domain],
        )
        .map_err(query_error)?;
        for (name, field) in result.fields() {
            if matches!(field, Field::Series(_) | Field::Labels(_)) {
                continue;
            }
            let value_json = serde_json::to_string(&field.to_json())?;
            tx.execute(
                "INSERT INTO domain_summaries (domain, field, value_json) VALUES (?1, ?2, ?3)",
                params![schema.domain, name, value_json],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        tracing::debug!(domain = schema.domain, rows = dates.len(), "result stored");
        Ok(())
    }

    fn load(&self, domain: &str) -> Result<Option<Value>, EngineError> {
        let conn = self.connection()?;
        let mut document = Map::new();

        let has_table = Self::table_exists(&conn, domain)?;
        if has_table {
            let mut stmt = conn
                .prepare(&format!("SELECT * FROM \"{domain}\" ORDER BY date ASC"))
                .map_err(query_error)?;
            let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

            let mut rows = stmt.query([]).map_err(query_error)?;
            while let Some(row) = rows.next().map_err(query_error)? {
                for (i, column) in columns.iter_mut().enumerate() {
                    let value: SqlValue = row.get(i).map_err(query_error)?;
                    column.push(sql_to_json(value));
                }
            }
            for (name, values) in names.into_iter().zip(columns) {
                if name != "date" {
                    document.insert(name, Value::Array(values));
                }
            }
        }

        let mut stmt = conn
            .prepare("SELECT field, value_json FROM domain_summaries WHERE domain = ?1 ORDER BY field")
            .map_err(query_error)?;
        let summaries = stmt
            .query_map(params![domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(query_error)?;
        let mut found_summary = false;
        for summary in summaries {
            let (field, value_json) = summary.map_err(query_error)?;
            document.insert(field, serde_json::from_str(&value_json)?);
            found_summary = true;
        }

        if has_table || found_summary {
            Ok(Some(Value::Object(document)))
        } else {
            Ok(None)
        }
    }

    fn save_merged(&self, document: &Value) -> Result<(), EngineError> {
        let conn = self.connection()?;
        let text = serde_json::to_string(document)?;
        conn.execute(
            "INSERT OR REPLACE INTO merged_documents (id, document) VALUES (1, ?1)",
            params![text],
        )
        .map_err(query_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::SharedRef;
    use crate::domain::schema::FieldKind;
    use serde_json::json;

    fn dates() -> Vec<NaiveDate> {
        vec![
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        ]
    }

    fn sample() -> (DomainSchema, DomainResult) {
        let schema = DomainSchema::new("offshore")
            .field("basis_avg", FieldKind::Series)
            .field("basis_alert", FieldKind::Labels)
            .field("latest", FieldKind::Object)
            .reference("dxy_ref")
            .reference("dates_ref");
        let mut r = DomainResult::new("offshore");
        r.insert_series("basis_avg", vec![Some(-12.5), None]);
        r.insert_labels("basis_alert", vec![None, Some("caution".into())]);
        r.insert_scalar("latest", &json!({"alert": "caution"})).unwrap();
        r.insert("dxy_ref", Field::Null);
        r.insert("dates_ref", Field::Reference(SharedRef::of("shared", "dates")));
        (schema, r)
    }

    #[test]
    fn save_then_load_reassembles_document() {
        let store = SqliteStore::in_memory().unwrap();
        let (schema, r) = sample();

        store.save(&schema, &dates(), &r).unwrap();

        assert_eq!(store.load("offshore").unwrap(), Some(r.to_document()));
    }

    #[test]
    fn save_replaces_previous_rows() {
        let store = SqliteStore::in_memory().unwrap();
        let (schema, mut r) = sample();
        store.save(&schema, &dates(), &r).unwrap();

        r.insert_series("basis_avg", vec![Some(1.0), Some(2.0)]);
        store.save(&schema, &dates(), &r).unwrap();

        let doc = store.load("offshore").unwrap().unwrap();
        assert_eq!(doc["basis_avg"], json!([1.0, 2.0]));
    }

    #[test]
    fn unknown_domain_loads_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.load("gli").unwrap(), None);
        assert_eq!(store.load_merged().unwrap(), None);
    }

    #[test]
    fn merged_document_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_merged(&json!({"a.b": 1})).unwrap();
        store.save_merged(&json!({"a.b": 2})).unwrap();
        assert_eq!(store.load_merged().unwrap(), Some(json!({"a.b": 2})));
    }

    #[test]
    fn file_store_persists_across_handles() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("results.db");
        let (schema, r) = sample();

        SqliteStore::from_path(&path, 2).unwrap().save(&schema, &dates(), &r).unwrap();
        let reopened = SqliteStore::from_path(&path, DEFAULT_POOL_SIZE).unwrap();

        assert_eq!(reopened.load("offshore").unwrap(), Some(r.to_document()));
    }
}
