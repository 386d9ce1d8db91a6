//! JSON file result store: one pretty-printed document per domain.

use crate::domain::error::EngineError;
use crate::domain::result::DomainResult;
use crate::domain::schema::DomainSchema;
use crate::ports::result_store_port::ResultStore;
use chrono::NaiveDate;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const MERGED_FILE: &str = "merged.json";

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// A store rooted at `dir`, created if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn domain_path(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{domain}.json"))
    }

    fn write(&self, path: &Path, document: &Value) -> Result<(), EngineError> {
        let mut text = serde_json::to_string_pretty(document)?;
        text.push('\n');
        fs::write(path, text).map_err(|e| {
            EngineError::persistence(format!("failed to write {}: {e}", path.display()))
        })
    }
}

impl ResultStore for JsonFileStore {
    fn save(&self, schema: &DomainSchema, _dates: &[NaiveDate], result: &DomainResult) -> Result<(), EngineError> {
        let path = self.domain_path(schema.domain);
        self.write(&path, &result.to_document())?;
        tracing::debug!(domain = schema.domain, path = %path.display(), "result written");
        Ok(())
    }

    fn load(&self, domain: &str) -> Result<Option<Value>, EngineError> {
        let path = self.domain_path(domain);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save_merged(&self, document: &Value) -> Result<(), EngineError> {
        self.write(&self.dir.join(MERGED_FILE), document)
    }
}
