//! Port traits the engine depends on; adapters implement them.

pub mod config_port;
pub mod dataset_port;
pub mod result_store_port;
