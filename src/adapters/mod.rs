//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_store_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
