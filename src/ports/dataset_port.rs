//! Dataset ingestion port trait.

use crate::domain::dataset::Dataset;
use crate::domain::error::EngineError;

pub trait DatasetPort {
    /// Load the full wide dataset, master dates included.
    fn load_dataset(&self) -> Result<Dataset, EngineError>;
}
