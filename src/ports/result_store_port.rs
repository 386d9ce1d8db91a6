//! Result persistence port trait.

use crate::domain::error::EngineError;
use crate::domain::result::DomainResult;
use crate::domain::schema::DomainSchema;
use chrono::NaiveDate;
use serde_json::Value;

pub trait ResultStore {
    /// Store one validated domain result, replacing any earlier one.
    fn save(&self, schema: &DomainSchema, dates: &[NaiveDate], result: &DomainResult) -> Result<(), EngineError>;

    /// The stored document for `domain`, if any.
    fn load(&self, domain: &str) -> Result<Option<Value>, EngineError>;

    fn save_merged(&self, document: &Value) -> Result<(), EngineError>;
}
